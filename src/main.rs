//! smsac-inspect - command-line view of a running game's live objects.
//!
//! Without arguments it prints every manager and its managees. With
//! `<ADDR> <TYPE>` it streams the fields of one object until Ctrl-C.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smsac_client::config::ClientConfig;
use smsac_client::graph::ObjectGraph;
use smsac_client::models::{format_addr, FieldDescriptor};
use smsac_client::watch::{FieldWatcher, WatchState, WatchTarget};
use smsac_client::{IpcClient, MemoryApi};

const USAGE: &str = "usage: smsac-inspect [<ADDR> <TYPE>]";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "smsac=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    tracing::info!("Starting smsac-inspect v{}", env!("CARGO_PKG_VERSION"));

    let target = parse_target(std::env::args().skip(1).collect())?;
    let config = ClientConfig::from_env().context("Invalid configuration")?;

    let (closed_tx, mut closed_rx) = watch::channel(false);
    let client = IpcClient::with_close_handler(move || {
        let _ = closed_tx.send(true);
    });
    let api = Arc::new(MemoryApi::new(client));

    api.client()
        .connect(config.url.as_str(), config.protocol.as_deref())
        .await
        .with_context(|| format!("Failed to connect to {}", config.url))?;

    match api.init().await.context("init failed")? {
        Some(pid) => info!("Attached to process {}", pid),
        None => warn!("No game process attached"),
    }
    let version = api.get_version().await.context("getVersion failed")?;
    println!("Game version: {} ({})", version, version.region());

    let Some(target) = target else {
        return print_graph(&api).await;
    };

    let mut watcher = FieldWatcher::with_interval(Arc::clone(&api), config.refresh_interval);
    let handle = watcher
        .view(target)
        .await
        .context("Failed to load fields")?;
    let fields = handle.fields().to_vec();
    if fields.is_empty() {
        println!("{} has no fields", handle.target().type_name);
        return Ok(());
    }

    let mut updates = handle.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                watcher.cancel();
                return Ok(());
            }
            _ = closed_rx.changed() => {
                bail!("Disconnected from server");
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = updates.borrow_and_update().clone();
                match state {
                    WatchState::Pending => {}
                    WatchState::Values(values) => print_values(&fields, &values),
                    WatchState::Unresolved => println!("(address unresolved)"),
                    WatchState::Failed(e) => bail!("Read failed: {}", e),
                }
            }
        }
    }
}

/// Parse the optional `<ADDR> <TYPE>` arguments.
fn parse_target(args: Vec<String>) -> Result<Option<WatchTarget>> {
    match args.as_slice() {
        [] => Ok(None),
        [addr, type_name] => {
            let digits = addr
                .trim_start_matches("0x")
                .trim_start_matches("0X");
            let addr = u32::from_str_radix(digits, 16)
                .with_context(|| format!("Invalid address {:?}", addr))?;
            Ok(Some(WatchTarget::new(addr, type_name.as_str())))
        }
        _ => bail!(USAGE),
    }
}

/// Print every manager with its managees.
async fn print_graph(api: &MemoryApi) -> Result<()> {
    let mut graph = ObjectGraph::load(api).await.context("getManagers failed")?;
    if graph.is_empty() {
        println!("No managers found");
        return Ok(());
    }

    for index in 0..graph.len() {
        if let Err(e) = graph.expand(index, api).await {
            warn!("Failed to load managees: {}", e);
        }
    }

    for node in graph.nodes() {
        let manager = &node.manager;
        println!(
            "{:<40} {:<28} {}",
            manager.label(),
            manager.type_name,
            format_addr(manager.addr)
        );
        for managee in node.visible_managees() {
            println!(
                "  {:<38} {:<28} {}",
                managee.label(),
                managee.type_name.as_deref().unwrap_or("?"),
                format_addr(managee.addr)
            );
        }
    }
    Ok(())
}

fn print_values(fields: &[FieldDescriptor], values: &[Option<String>]) {
    println!("----");
    for (field, value) in fields.iter().zip(values) {
        println!(
            "{:>12} {:<28} {:<16} {}",
            field.offset,
            field.name,
            value.as_deref().unwrap_or("-"),
            field.type_name
        );
    }
}
