//! Plugin registry.
//!
//! A plugin is anything that binds RPC endpoints onto the [`EndpointTable`].
//! Built-in plugins are registered directly; extra plugins can be loaded at
//! startup from shared libraries in a directory.
//!
//! # Module ABI
//!
//! A loadable module exports two `extern "C"` symbols, generated by
//! [`declare_plugin!`](crate::declare_plugin):
//!
//! ```text
//! create_plugin() -> *mut PluginBox
//! delete_plugin(*mut PluginBox)
//! ```
//!
//! `PluginBox` is `Box<dyn AdapterPlugin>`, so the pointer crossing the
//! boundary is thin. Modules must be built with the same compiler and the
//! same version of this crate as the server.
//!
//! # Teardown
//!
//! Handlers bound by a module point into its code. Drop the endpoint table
//! before the registry so no handler outlives the module that owns it.
//!
//! # Panic-Free Guarantees
//!
//! This module follows CLAUDE.md panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A module that fails to load is logged and skipped, never fatal

mod loader;

pub use loader::{DynamicLoader, ModuleLibrary, ModuleLoader, PluginError};

use std::fmt;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dispatch::EndpointTable;

// ============================================================================
// Plugin Contract
// ============================================================================

/// Capability contract implemented by every plugin.
pub trait AdapterPlugin: Send + Sync {
    /// Plugin name, used in logs.
    fn name(&self) -> &str;

    /// Binds this plugin's handlers onto the endpoint table.
    fn bind(&self, table: &mut EndpointTable);
}

/// The instance handed across the module boundary.
pub type PluginBox = Box<dyn AdapterPlugin>;

/// Factory exported by a module.
#[allow(improper_ctypes_definitions)]
pub type CreateFn = unsafe extern "C" fn() -> *mut PluginBox;

/// Destructor exported by a module.
#[allow(improper_ctypes_definitions)]
pub type DestroyFn = unsafe extern "C" fn(*mut PluginBox);

pub const CREATE_SYMBOL: &[u8] = b"create_plugin\0";
pub const DESTROY_SYMBOL: &[u8] = b"delete_plugin\0";

/// Exports `create_plugin` and `delete_plugin` for a plugin type.
///
/// ```ignore
/// struct Echo;
/// impl rtad::plugin::AdapterPlugin for Echo { /* ... */ }
/// rtad::declare_plugin!(|| Echo);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($constructor:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn create_plugin() -> *mut $crate::plugin::PluginBox {
            let constructor = $constructor;
            let plugin: $crate::plugin::PluginBox = ::std::boxed::Box::new(constructor());
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(plugin))
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn delete_plugin(plugin: *mut $crate::plugin::PluginBox) {
            if !plugin.is_null() {
                drop(::std::boxed::Box::from_raw(plugin));
            }
        }
    };
}

// ============================================================================
// Module Handle
// ============================================================================

/// A plugin instance together with the module that created it.
///
/// Dropping the handle calls the module's destructor on the instance while
/// the module is still mapped, then unmaps the module.
pub struct ModuleHandle {
    instance: NonNull<PluginBox>,
    destroy: DestroyFn,
    // Declared last: dropped after `Drop::drop` has run the destructor.
    _library: Box<dyn ModuleLibrary>,
}

// SAFETY: `AdapterPlugin` requires `Send + Sync`, and the instance is only
// reachable through shared references until the handle is dropped.
unsafe impl Send for ModuleHandle {}
unsafe impl Sync for ModuleHandle {}

impl ModuleHandle {
    pub fn plugin(&self) -> &dyn AdapterPlugin {
        // SAFETY: `instance` came from the module's factory and stays valid
        // until `destroy` runs in `Drop`.
        let boxed: &PluginBox = unsafe { self.instance.as_ref() };
        &**boxed
    }
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        debug!(plugin = self.plugin().name(), "Destroying plugin instance");
        // SAFETY: the pointer was produced by the paired factory and is
        // released exactly once.
        unsafe { (self.destroy)(self.instance.as_ptr()) };
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("plugin", &self.plugin().name())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Owns every plugin for the lifetime of the server.
pub struct PluginRegistry {
    loader: Box<dyn ModuleLoader>,
    builtins: Vec<Arc<dyn AdapterPlugin>>,
    modules: Vec<ModuleHandle>,
}

impl PluginRegistry {
    /// Creates an empty registry that loads modules with the dynamic linker.
    pub fn new() -> Self {
        Self::with_loader(Box::new(DynamicLoader))
    }

    pub fn with_loader(loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            builtins: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Registers a plugin compiled into the server.
    pub fn register(&mut self, plugin: Arc<dyn AdapterPlugin>) {
        info!(plugin = plugin.name(), "Registered built-in plugin");
        self.builtins.push(plugin);
    }

    /// Returns true if `path` carries the platform's shared-library extension.
    pub fn is_module_file(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext == std::env::consts::DLL_EXTENSION)
            .unwrap_or(false)
    }

    /// Loads every module in `dir` (non-recursive).
    ///
    /// Files without the library extension are skipped silently. Modules that
    /// fail to load are logged and skipped. Returns the number loaded.
    pub fn load_plugins(&mut self, dir: &Path) -> usize {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                let err = PluginError::ReadDir {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Plugin directory not readable");
                return 0;
            }
        };

        let mut paths: Vec<_> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && Self::is_module_file(path))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match self.load_plugin(&path) {
                Ok(name) => {
                    info!(plugin = %name, path = %path.display(), "Loaded plugin module");
                    loaded += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Skipping plugin module");
                }
            }
        }

        debug!(dir = %dir.display(), loaded, "Plugin directory scanned");
        loaded
    }

    /// Loads one module and retains it. Returns the plugin's name.
    pub fn load_plugin(&mut self, path: &Path) -> Result<String, PluginError> {
        let handle = self.open_module(path)?;
        let name = handle.plugin().name().to_string();
        self.modules.push(handle);
        Ok(name)
    }

    /// Opens a module and constructs its plugin without retaining it.
    ///
    /// Both entry points are resolved before the factory runs. On any failure
    /// the module is unmapped again.
    pub fn open_module(&self, path: &Path) -> Result<ModuleHandle, PluginError> {
        let library = self.loader.open(path)?;

        let create = library.create_fn().ok_or_else(|| PluginError::MissingSymbol {
            path: path.to_path_buf(),
            symbol: "create_plugin",
        })?;
        let destroy = library.destroy_fn().ok_or_else(|| PluginError::MissingSymbol {
            path: path.to_path_buf(),
            symbol: "delete_plugin",
        })?;

        // SAFETY: `create` is the module's exported factory.
        let raw = unsafe { create() };
        let instance = NonNull::new(raw).ok_or_else(|| PluginError::NullInstance {
            path: path.to_path_buf(),
        })?;

        Ok(ModuleHandle {
            instance,
            destroy,
            _library: library,
        })
    }

    /// Calls `f` on every plugin: built-ins first, then modules in load order.
    pub fn for_each_plugin<F>(&self, mut f: F)
    where
        F: FnMut(&dyn AdapterPlugin),
    {
        for plugin in &self.builtins {
            f(plugin.as_ref());
        }
        for module in &self.modules {
            f(module.plugin());
        }
    }

    /// Lets every plugin bind its endpoints.
    pub fn bind_all(&self, table: &mut EndpointTable) {
        self.for_each_plugin(|plugin| {
            debug!(plugin = plugin.name(), "Binding plugin endpoints");
            plugin.bind(table);
        });
    }

    pub fn plugin_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.len());
        self.for_each_plugin(|plugin| names.push(plugin.name().to_string()));
        names
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn len(&self) -> usize {
        self.builtins.len() + self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
