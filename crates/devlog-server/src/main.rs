//! devlog server binary.
//!
//! Listens for devices, stores their logs and prints the records matching
//! the current selection.

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use devlog_server::{LogHub, LogServer};
use devlog_store::LogRecord;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = cli.store_config().build();
    let hub = LogHub::with_criteria(store, cli.criteria())
        .context("failed to open record store")?;
    let hub = Arc::new(hub);

    let server = LogServer::new(cli.server_config(), Arc::clone(&hub));
    let addr = server.start().await.context("failed to start server")?;
    info!("  Devices connect via: ws://{}{}", addr, server.config().ws_path);

    let tail = (!cli.quiet)
        .then(|| tokio::spawn(print_records(Arc::clone(&hub), hub.subscribe_records())));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    server.stop().await;
    if let Some(tail) = tail {
        tail.abort();
    }
    Ok(())
}

/// Print each new record that matches the current selection.
async fn print_records(hub: Arc<LogHub>, mut records: Receiver<LogRecord>) {
    loop {
        match records.recv().await {
            Ok(record) => {
                if hub.criteria().to_predicate().matches(&record) {
                    println!("{record}");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Record printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
