//! relay-server: chat relay process entry point.

use clap::Parser;
use relay_core::RelayError;
use relay_server::config::{default_config_path, Overrides, ServerConfig};
use relay_server::RelayServer;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{error, info};

/// relay-server: real-time chat relay
#[derive(Parser, Debug)]
#[command(name = "relay-server", version, about = "Real-time chat relay")]
struct Cli {
    /// Listen port
    #[arg(short, long, env = "SOCKET_PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Allowed WebSocket origin (repeatable, comma separated, "*" for any)
    #[arg(long = "allowed-origin", env = "ALLOWED_ORIGIN", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Do not echo a user's message back to its sender
    #[arg(long)]
    no_echo: bool,

    /// Seconds to wait for sessions to close on shutdown
    #[arg(long)]
    shutdown_timeout: Option<u64>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting relay-server");

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match ServerConfig::load(
        Some(&config_path),
        Overrides {
            port: cli.port,
            bind: cli.bind,
            allowed_origins: cli.allowed_origins.clone(),
            no_echo: cli.no_echo,
            shutdown_timeout: cli.shutdown_timeout,
        },
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let server = match RelayServer::bind(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            report_bind_failure(&config, &e);
            std::process::exit(1);
        }
    };

    info!(
        addr = %server.local_addr(),
        url = %format!("ws://localhost:{}", server.local_addr().port()),
        "chat relay listening"
    );

    if let Err(e) = server.run(shutdown_signal()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("relay-server stopped");
}

/// Log why the endpoint could not be acquired and how to investigate.
fn report_bind_failure(config: &ServerConfig, err: &RelayError) {
    error!(addr = %config.bind_addr(), error = %err, "failed to bind listener");
    if let RelayError::AddrInUse { port } = err {
        error!(
            port,
            "port {port} is already in use: another application or another relay instance \
             may hold it; find it with `lsof -i :{port}` or `ss -ltnp 'sport = :{port}'`, \
             or start with a different --port / SOCKET_PORT"
        );
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("received shutdown signal");
}
