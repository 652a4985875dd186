//! confchat-probe - connect to a chat server and print streamed replies.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use confchat::animation::{AnimatorHandle, BusError, ContentBus};
use confchat::bridge::StreamingMessageHandler;
use confchat::config::ClientConfig;
use confchat::connection::{
    ConnectionLifecycleManager, ConnectionPhase, CredentialSource, Credentials,
    EventHandlerCatalog, Ignore, WatchStateStore, WebSocketTransport,
};

/// Connect to a chat server and watch the socket lifecycle
#[derive(Parser, Debug)]
#[command(name = "confchat-probe")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server base URL (overrides config and CONFCHAT_SERVER_URL)
    #[arg(long)]
    url: Option<String>,

    /// Socket path on the server
    #[arg(long)]
    path: Option<String>,

    /// Auth token; omit to connect anonymously
    #[arg(long, env = "CONFCHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Send this as `send_message` once connected
    #[arg(short, long)]
    message: Option<String>,

    /// Manual reconnects to try after the connection fails (not after an
    /// auth rejection)
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Enable debug logging (equivalent to RUST_LOG=debug)
    #[arg(short = 'd', long)]
    debug: bool,

    /// Enable verbose logging (equivalent to RUST_LOG=trace)
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "trace"
    } else if args.debug {
        "debug,tungstenite=info"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = ClientConfig::load().context("Failed to load configuration")?;
    if let Some(url) = args.url {
        config.endpoint.base_url = Some(url);
    }
    if let Some(path) = args.path {
        config.endpoint.path = Some(path);
    }
    if !config.endpoint.is_configured() {
        anyhow::bail!("No server URL; pass --url or set CONFCHAT_SERVER_URL");
    }

    let bus = ContentBus::new();
    let mut content = bus.subscribe();
    let (animator, animator_task) = AnimatorHandle::spawn(config.animation.clone(), bus.sender());

    let store = Arc::new(WatchStateStore::new());
    let mut status = store.subscribe();
    let catalog = EventHandlerCatalog::new(
        store.clone(),
        Arc::new(Ignore),
        Arc::new(StreamingMessageHandler::new(animator, Arc::new(Ignore))),
    );

    let credentials = CredentialSource::new(match args.token {
        Some(token) => Credentials::signed_in(token),
        None => Credentials::anonymous(),
    });
    let (manager, manager_task) = ConnectionLifecycleManager::spawn(
        config.endpoint.clone(),
        Arc::new(WebSocketTransport::new(config.reconnect.clone())),
        catalog,
        credentials.provider(),
    );

    let mut pending_message = args.message;
    let mut retries_left = args.retries;
    let mut printed = String::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }

            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                info!(phase = %snapshot.phase, socket = ?snapshot.socket, "Connection status");
                if let Some(issue) = &snapshot.last_issue {
                    warn!(issue = %issue, "Connection issue");
                }
                if snapshot.phase == ConnectionPhase::Failed {
                    let needs_reauth = snapshot.last_issue.as_ref().is_some_and(|i| i.needs_reauth());
                    if needs_reauth {
                        warn!("Server rejected the token; pass a fresh --token");
                        break;
                    }
                    if retries_left == 0 {
                        break;
                    }
                    retries_left -= 1;
                    info!(retries_left, "Retrying connection");
                    manager.reconnect();
                    continue;
                }
                if snapshot.is_connected() {
                    if let Some(text) = pending_message.take() {
                        manager
                            .emit("send_message", json!({ "userInput": text }))
                            .await
                            .context("Failed to send message")?;
                    }
                }
            }

            update = content.recv() => match update {
                Ok(update) => {
                    // Updates are cumulative; print only the new suffix.
                    let delta = update.text.strip_prefix(printed.as_str()).unwrap_or(update.text.as_str());
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                    printed = update.text;
                }
                Err(BusError::Lagged(n)) => warn!(skipped = n, "Output lagged"),
                Err(BusError::Closed) => break,
            },
        }
    }

    println!();
    manager.unmount();
    let _ = manager_task.await;
    drop(bus);
    animator_task.abort();
    Ok(())
}
