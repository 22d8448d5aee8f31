//! Live document feed.
//!
//! Demonstrates:
//! - Configuring the manager from `SOCKET_*` environment variables
//! - Lifecycle listeners and the transition stream
//! - Typed document events in both directions
//!
//! Usage:
//!   cargo run --example document_feed
//!   cargo run --example document_feed -- --debug
//!   cargo run --example document_feed -- --announce
//!   SOCKET_URL=https://rt.example.com cargo run --example document_feed

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::Context;
use docshare_realtime::{
    ClientEvent, ConnectionEvent, ConnectionManager, Document, ManagerConfig, ServerEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const CONNECT_WAIT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    announce: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            announce: args.iter().any(|a| a == "--announce"),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "docshare_realtime=debug"
    } else {
        "docshare_realtime=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== Document Feed ===\n");

    let config = ManagerConfig::from_env().context("reading SOCKET_* variables")?;
    println!("[Config] {} (max {} retries)", config.url, config.max_retries);

    let manager = ConnectionManager::builder()
        .config(config)
        .on_connect(|_| println!("[Live] connected"))
        .on_disconnect(|reason| println!("[Live] disconnected: {reason}"))
        .on_connect_error(|err| println!("[Live] connect error: {}", err["message"]))
        .build()?;

    manager.on_server_event(|event| match event {
        ServerEvent::DocumentCreated(doc) => println!("[Feed] + {} ({})", doc.name, doc.id),
        ServerEvent::DocumentUpdated(doc) => println!("[Feed] ~ {} v{}", doc.name, doc.version),
        ServerEvent::DocumentsDeleted(ids) => println!("[Feed] - {} document(s)", ids.len()),
        ServerEvent::Unknown { name, .. } => println!("[Feed] ? {name}"),
    });

    let mut transitions = manager.events();
    tokio::spawn(async move {
        loop {
            match transitions.recv().await {
                Ok(ConnectionEvent::RetryScheduled { attempt, delay }) => {
                    println!("[Retry] attempt {attempt} in {}ms", delay.as_millis());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => println!("[Retry] skipped {missed} transition(s)"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    manager.connect();
    let sid = manager
        .wait_connected(CONNECT_WAIT)
        .await
        .context("waiting for the first connection")?;
    println!("[Session] {sid}");

    if args.announce {
        let doc = Document::new(format!("demo-{sid}"), "Demo deck.pdf");
        let sent = manager.emit_event(&ClientEvent::NewDocument(doc));
        println!("[Emit] newDocument sent: {sent}");
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();

    manager.dispose();
    Ok(())
}
