//! Listens on a realtime channel and prints every event.
//!
//! Demonstrates:
//! - Building a channel from environment variables
//! - Supplying the token through a `SharedToken`
//! - Lifecycle events (`connected`, `reconnecting`, ...)
//! - Subscribing to a task stream
//!
//! Environment:
//!   REALTIME_WS_URL / REALTIME_API_BASE_URL / REALTIME_PAGE_ORIGIN
//!   REALTIME_TOKEN    token appended as `?token=`
//!
//! Usage:
//!   cargo run --example listen
//!   cargo run --example listen -- --task 42
//!   cargo run --example listen -- --debug

// ============================================================================
// Imports
// ============================================================================

use anyhow::Context;
use realtime_channel::{Channel, ChannelOptions, SharedToken, TaskId, names};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const ENV_TOKEN: &str = "REALTIME_TOKEN";

const PRINTED_EVENTS: &[&str] = &[
    names::CONNECTED,
    names::DISCONNECTED,
    names::RECONNECTING,
    names::ENDPOINT_ROTATED,
    names::MAX_RECONNECT_EXCEEDED,
    names::CONNECTION_ESTABLISHED,
    names::HEARTBEAT,
    names::TASK_STARTED,
    names::TASK_PROGRESS,
    names::TASK_COMPLETED,
    names::TASK_FAILED,
    names::TASK_RESULT,
    names::NOTIFICATION,
    names::INTERACTION_UPDATE,
    names::HISTORY_EVENTS,
    names::PONG,
    names::MESSAGE,
];

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    task: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            task: args
                .iter()
                .position(|a| a == "--task")
                .and_then(|i| args.get(i + 1).cloned()),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        "realtime_channel=debug"
    } else {
        "realtime_channel=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    println!("=== Realtime channel listener ===\n");

    let tokens = SharedToken::new();
    match std::env::var(ENV_TOKEN) {
        Ok(token) => tokens.set(token),
        Err(_) => println!("[Setup] {ENV_TOKEN} unset, waiting for a token"),
    }

    let channel = Channel::builder()
        .options(ChannelOptions::from_env())
        .token_provider(tokens)
        .build()
        .context("building channel")?;

    println!("[Setup] Candidates:");
    for endpoint in channel.candidates().iter() {
        println!("        {endpoint}");
    }

    let mut subscriptions = channel.subscriptions();
    for &event in PRINTED_EVENTS {
        subscriptions.subscribe(event, move |payload| println!("[{event}] {payload}"));
    }

    channel.connect();
    if let Some(task) = args.task {
        channel.subscribe_to_task(&TaskId::new(task));
    }

    println!("\nPress Ctrl+C to exit\n");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;

    channel.disconnect();
    subscriptions.clear();
    println!("\nStatus: {:?}", channel.status());
    Ok(())
}
