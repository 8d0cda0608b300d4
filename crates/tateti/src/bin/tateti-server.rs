//! Runs a Tateti server backed by the in-memory document store.

use std::time::Duration;

use clap::Parser;
use tateti::prelude::*;
use tracing_subscriber::EnvFilter;

/// Tateti - two-player tic-tac-toe over WebSocket
#[derive(Parser, Debug)]
#[command(name = "tateti-server")]
#[command(about = "Tic-tac-toe match session server", long_about = None)]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Store collection holding the match documents
    #[arg(long, default_value = EngineConfig::DEFAULT_COLLECTION)]
    collection: String,

    /// Refuse moves written against an outdated snapshot instead of
    /// letting the last write win
    #[arg(long)]
    optimistic: bool,

    /// Seconds a dropped player has to resume their session
    #[arg(long, default_value_t = 30)]
    reconnect_grace_secs: u64,

    /// Seconds a connection may stay silent before it is closed
    #[arg(long, default_value_t = 15)]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), TatetiError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let concurrency = if args.optimistic {
        Concurrency::Optimistic
    } else {
        Concurrency::LastWriteWins
    };
    let engine = EngineConfig::default()
        .with_collection(args.collection)
        .with_concurrency(concurrency);

    tracing::warn!("using DevAuthenticator: handshake tokens are trusted as player ids");

    let server = TatetiServerBuilder::new()
        .bind(&args.bind)
        .engine_config(engine)
        .session_config(SessionConfig {
            reconnect_grace_secs: args.reconnect_grace_secs,
        })
        .idle_timeout(Duration::from_secs(args.idle_timeout_secs))
        .build(MemoryStore::new(), DevAuthenticator)
        .await?;

    server.run().await
}
