//! ctxmapd — JSON-RPC server with per-request scopes
//!
//! Serves JSON-RPC 2.0 over HTTP. Each request is assigned a request handle,
//! gets a scope attached to that handle in a shared registry, and has the
//! scope removed when the request finishes.
//!
//! Usage:
//!   ctxmapd                              # Default port 7171
//!   ctxmapd --port 8080                  # Custom port
//!   ctxmapd --request-timeout-ms 2000    # Cancel requests after 2s
//!   ctxmapd --log-file                   # Log to ~/.ctxmap/logs/ctxmapd.log

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ctxmap_server::{ScopeRegistry, ScopeService, Server, TimingMiddleware};
use ctxmap_transport::{TransportConfig, TransportServer};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Parser, Debug)]
#[command(name = "ctxmapd", about = "ctxmapd — JSON-RPC server with per-request scopes")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7171")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Enable permissive CORS
    #[arg(long)]
    cors: bool,

    /// Cancel requests that run longer than this many milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Write logs to a file (defaults to ~/.ctxmap/logs/ctxmapd.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let (writer, ansi) = match cli.log_file.as_deref() {
        Some(log_file_arg) => {
            let log_path = if log_file_arg == "DEFAULT" {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
                PathBuf::from(home).join(".ctxmap/logs/ctxmapd.log")
            } else {
                PathBuf::from(log_file_arg)
            };

            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

            eprintln!("Logging to {}", log_path.display());
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    // One registry for the whole process, shared by the server (which
    // attaches scopes) and the transport (which clears them).
    let registry = Arc::new(ScopeRegistry::new());

    let mut server = Server::new(registry.clone());
    if let Some(ms) = cli.request_timeout_ms {
        server = server.with_request_timeout(Duration::from_millis(ms));
    }
    server.register_service(ScopeService::new(registry.clone()));
    server.add_middleware(TimingMiddleware::new(registry.clone()));

    server
        .initialize()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize services: {e}"))?;
    let server = Arc::new(server);

    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        enable_cors: cli.cors,
        verbose_logging: cli.verbose,
    };

    let mut transport = TransportServer::start(transport_config, server.clone(), registry.clone())
        .await
        .context("Failed to start transport")?;

    println!();
    println!("  ctxmapd ready");
    println!("  RPC:     http://{}:{}/rpc", cli.hostname, transport.port());
    println!("  Health:  http://{}:{}/health", cli.hostname, transport.port());
    if let Some(ms) = cli.request_timeout_ms {
        println!("  Timeout: {ms}ms");
    }
    println!();

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");

    transport.stop().await;
    server.shutdown().await;
    Ok(())
}
