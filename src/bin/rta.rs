//! RTA - Command-line client for the remote test adapter
//!
//! Issues a single call against a running `rtad` and prints the reply.
//!
//! # Usage
//!
//! ```text
//! rta command-execute "uname -a"
//! rta --host 10.0.0.7 file-content /var/log app.log
//! rta app-check-status my_app
//! rta open 127.0.0.1 7070
//! ```
//!
//! The payload is printed first, then the code and its name. The exit
//! status is 0 when the code is SUCCESS and 1 otherwise.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rta_client::{AdapterClient, ClientConfig, RemoteClient, RpcConnection, TcpRpcConnection};
use rta_core::{describe_code, Response, DEFAULT_PORT};

// ============================================================================
// CLI Arguments
// ============================================================================

/// RTA - remote test adapter client
#[derive(Parser, Debug)]
#[command(name = "rta", version, about)]
struct Args {
    /// Server host
    #[arg(long, env = "RTA_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, env = "RTA_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Call timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Directory downloaded files are written to
    #[arg(long)]
    download_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a WebSocket endpoint on the server
    Open { address: String, port: u16 },
    /// Close a WebSocket endpoint
    Close { address: String, port: u16 },
    /// Send a text message to an endpoint
    Send {
        address: String,
        port: u16,
        data: String,
    },
    /// Fetch the next message waiting on an endpoint
    Receive { address: String, port: u16 },
    /// Start `path/name` on the server
    AppStart { path: String, name: String },
    /// Stop every process called `name`
    AppStop { name: String },
    /// Report whether `name` is running (1), not running (0) or crashed (-1)
    AppCheckStatus { name: String },
    /// Check that `path/name` exists
    FileExists { path: String, name: String },
    /// Overwrite `path/name` with `content`
    FileUpdate {
        path: String,
        name: String,
        content: String,
    },
    /// Download `path/name` into the download directory
    FileContent { path: String, name: String },
    /// Delete `path/name`
    FileDelete { path: String, name: String },
    /// Copy `path/name` to its backup
    FileBackup { path: String, name: String },
    /// Restore `path/name` from its backup
    FileRestore { path: String, name: String },
    /// Check that a folder exists
    FolderExists { path: String },
    /// Create a folder (single level)
    FolderCreate { path: String },
    /// Delete a folder and its contents
    FolderDelete { path: String },
    /// Run a shell command and print its output
    CommandExecute { command: String },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so the payload on stdout stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rta_client=warn".parse()?),
        )
        .init();

    let mut config = ClientConfig {
        host: args.host,
        port: args.port,
        ..Default::default()
    };
    if let Some(dir) = args.download_dir {
        config.download_dir = dir;
    }

    let connection = Arc::new(
        TcpRpcConnection::connect(&config)
            .await
            .context("Failed to connect to rtad")?,
    );
    let remote = RemoteClient::with_download_dir(connection.clone(), &config.download_dir).await;
    if let Some(ms) = args.timeout_ms {
        connection.set_timeout(Duration::from_millis(ms));
    }
    let client = AdapterClient::new(Arc::new(remote));

    let response = execute(&client, args.command).await;
    println!("{}", response.payload);
    println!("{}", describe_code(response.code));

    if !response.is_success() {
        process::exit(1);
    }
    Ok(())
}

async fn execute(client: &AdapterClient, command: Command) -> Response {
    match command {
        Command::Open { address, port } => client.open(&address, port).await,
        Command::Close { address, port } => client.close(&address, port).await,
        Command::Send {
            address,
            port,
            data,
        } => client.send(&address, port, &data).await,
        Command::Receive { address, port } => client.receive(&address, port).await,
        Command::AppStart { path, name } => client.app_start(&path, &name).await,
        Command::AppStop { name } => client.app_stop(&name).await,
        Command::AppCheckStatus { name } => client.app_check_status(&name).await,
        Command::FileExists { path, name } => client.file_exists(&path, &name).await,
        Command::FileUpdate {
            path,
            name,
            content,
        } => client.file_update(&path, &name, &content).await,
        Command::FileContent { path, name } => client.file_content(&path, &name).await,
        Command::FileDelete { path, name } => client.file_delete(&path, &name).await,
        Command::FileBackup { path, name } => client.file_backup(&path, &name).await,
        Command::FileRestore { path, name } => client.file_restore(&path, &name).await,
        Command::FolderExists { path } => client.folder_exists(&path).await,
        Command::FolderCreate { path } => client.folder_create(&path).await,
        Command::FolderDelete { path } => client.folder_delete(&path).await,
        Command::CommandExecute { command } => client.command_execute(&command).await,
    }
}
