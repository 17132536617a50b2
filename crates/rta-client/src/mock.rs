//! Scripted connection used by the client unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rta_core::{Parameter, Response};

use crate::connection::{ConnectionState, RpcConnection};

type Script = Box<dyn Fn(&str, &[Parameter]) -> Response + Send + Sync>;

/// A connection answering every call from a closure and recording it.
pub struct MockConnection {
    script: Script,
    connected: AtomicBool,
    timeout: Mutex<Option<Duration>>,
    calls: Mutex<Vec<(String, Vec<Parameter>)>>,
}

impl MockConnection {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&str, &[Parameter]) -> Response + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            connected: AtomicBool::new(true),
            timeout: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// A connection that succeeds every call with an empty payload.
    pub fn succeeding() -> Arc<Self> {
        Self::new(|_, _| Response::success(""))
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn timeout(&self) -> Option<Duration> {
        *self.timeout.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<(String, Vec<Parameter>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(method, _)| method).collect()
    }
}

#[async_trait]
impl RpcConnection for MockConnection {
    async fn call(&self, method: &str, params: Vec<Parameter>) -> Response {
        let response = (self.script)(method, &params);
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        response
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap() = Some(timeout);
    }

    fn connection_state(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}
