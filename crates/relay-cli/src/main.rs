//! relay-chat: terminal chat client for the chat relay.
//!
//! Prints every line the relay sends and sends every line typed on stdin.
//! `/quit` or end of input disconnects.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_client::{ChatClient, ClientConfig, ConnectionState, ReconnectPolicy};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// relay-chat: chat relay client
#[derive(Parser, Debug)]
#[command(name = "relay-chat", version, about = "Terminal client for the chat relay")]
struct Cli {
    /// Relay URL
    #[arg(long, default_value = "ws://localhost:3001")]
    url: String,

    /// Origin header sent with the upgrade request
    #[arg(long, default_value = "http://localhost:3000")]
    origin: String,

    /// Reconnection attempts before giving up
    #[arg(long, default_value_t = 5)]
    retries: u32,

    /// Seconds between reconnection attempts
    #[arg(long, default_value_t = 1)]
    backoff: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("relay_chat=debug,relay_client=debug")
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("relay_chat=warn,relay_client=warn")
            .with_target(false)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("relay-chat: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig {
        url: cli.url.clone(),
        origin: Some(cli.origin.clone()),
        reconnect: ReconnectPolicy {
            max_retries: cli.retries,
            backoff: Duration::from_secs(cli.backoff),
        },
        ..ClientConfig::default()
    };

    let mut client = ChatClient::connect(config)
        .await
        .with_context(|| format!("failed to connect to {}", cli.url))?;
    let mut states = client.subscribe_state();
    states.borrow_and_update();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("connected to {} (type /quit to leave)", cli.url);

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(line) if line.trim() == "/quit" => break,
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => client.send(line)?,
                    None => break,
                }
            }

            received = client.recv() => match received {
                Some(text) => println!("{text}"),
                None => break,
            },

            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                debug!(%state, "connection state");
                match state {
                    ConnectionState::Reconnecting { attempt } => {
                        eprintln!("connection lost, reconnecting (attempt {attempt})");
                    }
                    ConnectionState::Open => eprintln!("reconnected"),
                    ConnectionState::Failed => break,
                    _ => {}
                }
            }
        }
    }

    if client.state() == ConnectionState::Failed {
        anyhow::bail!("connection lost, gave up after {} reconnection attempts", cli.retries);
    }
    client.disconnect().await?;
    Ok(())
}
