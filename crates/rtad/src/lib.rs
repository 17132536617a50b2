//! RTA Daemon - Plugin registry, transport broker and RPC server
//!
//! This crate provides the server side of the remote test adapter:
//! - `plugin` - Registry of built-in and dynamically loaded plugins
//! - `dispatch` - Endpoint table the plugins bind their handlers onto
//! - `broker` - WebSocket sessions per endpoint, with a replay queue
//! - `utils` - Process, file and shell command handlers
//! - `server` - TCP server dispatching RPC calls to the endpoint table
//! - `config` - Server configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        rtad                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   RpcServer     │────▶│      EndpointTable          │   │
//! │  │ (TCP, JSON)     │     │  (name → handler)           │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │ bound by          │
//! │           │ connections                 ▼                   │
//! │           ▼              ┌─────────────────────────────┐   │
//! │  ┌─────────────────┐     │      PluginRegistry         │   │
//! │  │ConnectionHandler│     │ TransportPlugin, Utils,     │   │
//! │  │  (per client)   │     │ loaded modules              │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy from CLAUDE.md:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod plugin;
pub mod server;
pub mod utils;

pub use broker::{MessageBroker, TransportPlugin};
pub use config::ServerConfig;
pub use dispatch::EndpointTable;
pub use plugin::{AdapterPlugin, PluginError, PluginRegistry};
pub use server::{RpcServer, ServerError};
pub use utils::UtilsManager;
