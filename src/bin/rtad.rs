//! RTA Daemon - Remote test adapter server
//!
//! Accepts RPC calls from test clients and serves them through the
//! registered plugins: the WebSocket transport broker, the process/file
//! utilities, and any modules found in the plugin directory.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (5555)
//! rtad
//!
//! # Listen on a custom port
//! rtad 6000
//!
//! # Load extra modules from a directory
//! RTA_PLUGIN_DIR=/opt/rta/plugins rtad
//!
//! # Enable debug logging
//! RUST_LOG=rtad=debug rtad
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rta_core::DEFAULT_PORT;
use rtad::{
    EndpointTable, MessageBroker, PluginRegistry, RpcServer, ServerConfig, TransportPlugin,
    UtilsManager,
};

/// RTA daemon - remote test adapter server
#[derive(Parser, Debug)]
#[command(name = "rtad", version, about)]
struct Args {
    /// Port to listen on (1024-65535)
    #[arg(value_parser = clap::value_parser!(u16).range(1024..=65535))]
    port: Option<u16>,

    /// Directory scanned for plugin modules
    #[arg(long, env = "RTA_PLUGIN_DIR")]
    plugin_dir: Option<PathBuf>,

    /// Address to bind the RPC listener to
    #[arg(long = "bind")]
    bind_address: Option<IpAddr>,
}

fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            process::exit(1);
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    let mut config = ServerConfig::from_env();
    config.port = args.port.unwrap_or(DEFAULT_PORT);
    if let Some(dir) = args.plugin_dir {
        config.plugin_dir = dir;
    }
    if let Some(address) = args.bind_address {
        config.bind_address = address;
    }

    run_server(config)
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rtad=info".parse()?)
                .add_directive("rta_core=info".parse()?)
                .add_directive("rta_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "RTA daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Built-in plugins first, then whatever the plugin directory provides
    let broker = Arc::new(MessageBroker::new());
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(TransportPlugin::new(Arc::clone(&broker))));
    registry.register(Arc::new(UtilsManager::new()));
    let loaded = registry.load_plugins(&config.plugin_dir);
    info!(
        dir = %config.plugin_dir.display(),
        loaded,
        plugins = ?registry.plugin_names(),
        "Plugins ready"
    );

    let mut table = EndpointTable::with_client_connected();
    registry.bind_all(&mut table);
    let table = Arc::new(table);
    info!(endpoints = table.len(), "Endpoints bound");

    let address = config.socket_addr();
    let server = RpcServer::bind(address, Arc::clone(&table), cancel_token.clone())
        .await
        .with_context(|| format!("Failed to start server on {address}"))?;

    info!(address = %address, "Starting server");

    let result = server.run().await;

    // Handlers may live in module code: the table goes before the registry
    broker.close_all().await;
    drop(server);
    drop(table);
    drop(registry);

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("RTA daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
