//! RPC endpoint table.
//!
//! Plugins bind named async handlers here at startup; the server looks them
//! up per request. The table is built once and then shared read-only as an
//! `Arc<EndpointTable>` by every connection.
//!
//! # Panic-Free Guarantees
//!
//! This module follows CLAUDE.md panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Unknown endpoints are reported as `None`, never as a panic

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use rta_core::{Parameter, Response};
use rta_protocol::endpoints;

/// Boxed future returned by every handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A bound endpoint handler.
pub type Handler = Arc<dyn Fn(Vec<Parameter>) -> HandlerFuture + Send + Sync>;

/// Map from endpoint name to handler.
#[derive(Default)]
pub struct EndpointTable {
    handlers: HashMap<String, Handler>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with the server's own `client_connected` endpoint bound.
    pub fn with_client_connected() -> Self {
        let mut table = Self::new();
        table.bind(endpoints::CLIENT_CONNECTED, |_params| async {
            Response::success("")
        });
        table
    }

    /// Binds `handler` to `name`, replacing any previous binding.
    pub fn bind<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Vec<Parameter>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params| Box::pin(handler(params)));
        if self.handlers.insert(name.to_string(), handler).is_some() {
            warn!(endpoint = name, "Endpoint rebound, previous handler replaced");
        } else {
            debug!(endpoint = name, "Endpoint bound");
        }
    }

    /// Starts the handler bound to `name`, if any.
    ///
    /// The returned future owns everything it needs, so callers can await it
    /// on a separate task.
    pub fn dispatch(&self, name: &str, params: Vec<Parameter>) -> Option<HandlerFuture> {
        self.handlers.get(name).map(|handler| handler(params))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Bound endpoint names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
