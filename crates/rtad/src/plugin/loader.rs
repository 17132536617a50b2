//! Module loading boundary.
//!
//! Everything that touches shared libraries lives behind [`ModuleLoader`]
//! and [`ModuleLibrary`]. The registry only sees resolved function pointers.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{CreateFn, DestroyFn, CREATE_SYMBOL, DESTROY_SYMBOL};

/// An opened module from which the plugin entry points can be resolved.
///
/// Dropping the value unmaps the module.
pub trait ModuleLibrary: Send + Sync {
    fn create_fn(&self) -> Option<CreateFn>;
    fn destroy_fn(&self) -> Option<DestroyFn>;
}

/// Opens modules by path.
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleLibrary>, PluginError>;
}

/// Loader backed by the platform dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLoader;

impl ModuleLoader for DynamicLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleLibrary>, PluginError> {
        // SAFETY: loading runs the module's initialisers. Modules in the
        // plugin directory are trusted to be built against this crate.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| PluginError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(library))
    }
}

impl ModuleLibrary for libloading::Library {
    fn create_fn(&self) -> Option<CreateFn> {
        // SAFETY: the symbol's signature is fixed by `declare_plugin!`.
        unsafe { self.get::<CreateFn>(CREATE_SYMBOL) }
            .ok()
            .map(|symbol| *symbol)
    }

    fn destroy_fn(&self) -> Option<DestroyFn> {
        // SAFETY: the symbol's signature is fixed by `declare_plugin!`.
        unsafe { self.get::<DestroyFn>(DESTROY_SYMBOL) }
            .ok()
            .map(|symbol| *symbol)
    }
}

/// Errors that can occur while loading plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Failed to read plugin directory {path}: {reason}")]
    ReadDir { path: PathBuf, reason: String },

    #[error("Failed to open module {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Module {path} does not export {symbol}")]
    MissingSymbol { path: PathBuf, symbol: &'static str },

    #[error("Module {path} returned no plugin instance")]
    NullInstance { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_loader_missing_file() {
        let err = DynamicLoader
            .open(Path::new("/nonexistent/libnothing.so"))
            .err()
            .unwrap();
        assert!(matches!(err, PluginError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/libnothing.so"));
    }

    #[test]
    fn test_dynamic_loader_rejects_non_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.so");
        std::fs::write(&path, b"not an elf").unwrap();

        assert!(DynamicLoader.open(&path).is_err());
    }
}
