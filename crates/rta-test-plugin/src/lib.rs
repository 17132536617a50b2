//! Loadable module for the plugin loader tests.
//!
//! Binds `module_echo`, which answers with its first parameter. When
//! `RTA_TEST_PLUGIN_MARKER` names a file at creation time, the instance
//! writes `destroyed` to it when the module's destructor runs.
//!
//! Handlers here must not touch the async runtime: the module carries its
//! own copy of every dependency.

use std::path::PathBuf;

use rta_core::{Parameter, Response};
use rtad::{AdapterPlugin, EndpointTable};

pub const PLUGIN_NAME: &str = "ModuleEcho";
pub const ECHO_ENDPOINT: &str = "module_echo";
pub const MARKER_ENV: &str = "RTA_TEST_PLUGIN_MARKER";

pub struct EchoModule {
    marker: Option<PathBuf>,
}

impl EchoModule {
    pub fn new() -> Self {
        Self {
            marker: std::env::var_os(MARKER_ENV).map(PathBuf::from),
        }
    }
}

impl Default for EchoModule {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterPlugin for EchoModule {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn bind(&self, table: &mut EndpointTable) {
        table.bind(ECHO_ENDPOINT, |params: Vec<Parameter>| async move {
            match params.into_iter().next() {
                Some(first) => Response::success(first.value),
                None => Response::failed(rta_core::INCORRECT_PARAM_COUNT),
            }
        });
    }
}

impl Drop for EchoModule {
    fn drop(&mut self) {
        if let Some(marker) = &self.marker {
            let _ = std::fs::write(marker, "destroyed");
        }
    }
}

rtad::declare_plugin!(EchoModule::new);
