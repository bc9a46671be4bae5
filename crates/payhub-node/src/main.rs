//! Payhub node.
//!
//! Wires the ledger, routing, and settlement components together and runs
//! the worker passes on timers against a provider. Ships with a dev chain
//! so the whole pipeline can run without external infrastructure.

mod dev_provider;
mod hub;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use payhub_core::config::HubConfig;
use payhub_core::types::{NetworkKind, Token};
use payhub_routing::{DepositKind, RouteDescriptor};
use payhub_settlement::{sync, NetworkProvider};

use dev_provider::DevProvider;
use hub::Hub;

#[derive(Parser)]
#[command(name = "payhub", version, about = "Payment hub settlement node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node against the built-in dev chain.
    Start {
        /// Path to a TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Seed a demo user, deposit, and inbound payment.
        #[arg(long)]
        demo: bool,
        /// Emit logs as JSON.
        #[arg(long)]
        json_logs: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Start {
            config,
            demo,
            json_logs,
        } => {
            init_tracing(json_logs);
            let config = match config {
                Some(path) => HubConfig::load(&path)
                    .with_context(|| format!("loading config from {}", path.display()))?,
                None => HubConfig::default(),
            };
            run(config, demo).await
        }
    }
}

async fn run(config: HubConfig, demo: bool) -> anyhow::Result<()> {
    let hub = Arc::new(Hub::new(config));
    let chain = Arc::new(DevProvider::new(1, "dev-chain"));
    tracing::info!(chain_id = chain.chain_id(), "payhub node starting");

    spawn_event_logger(&hub);
    spawn_block_sealer(chain.clone());

    if demo {
        seed_demo(&hub, &chain).await?;
    }

    let provider: Arc<dyn NetworkProvider> = chain.clone();
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                run_worker_pass(&hub, &provider, chain.as_ref()).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// One tick of every background worker against one provider.
async fn run_worker_pass(hub: &Hub, provider: &Arc<dyn NetworkProvider>, chain: &DevProvider) {
    hub.providers.check(provider).await;
    if !hub.providers.status(provider.network()).synced {
        return;
    }
    if let Err(e) = sync::check_reorg(chain, &hub.tracker).await {
        tracing::warn!(error = %e, "reorg check failed");
    }
    if let Err(e) = sync::sync_blocks(chain, &hub.tracker, &hub.locks, &hub.config).await {
        tracing::warn!(error = %e, "block sync failed");
    }
    sync::expire_routes(&hub.allocator, &hub.bus, hub.tracker.cursor(chain.chain_id()));
    if let Err(e) = sync::execute_pending(&hub.transfers, chain).await {
        tracing::warn!(error = %e, "transfer execution failed");
    }
}

fn spawn_event_logger(hub: &Arc<Hub>) {
    let mut rx = hub.bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(?event, "hub event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_block_sealer(chain: Arc<DevProvider>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(500));
        loop {
            tick.tick().await;
            chain.seal_block();
        }
    });
}

/// Seed enough state to watch a deposit confirm in the logs.
async fn seed_demo(hub: &Hub, chain: &DevProvider) -> anyhow::Result<()> {
    let eth = Token::native(chain.chain_id(), "ETH", 18);
    let alice = hub.accounts.create_user("alice")?;
    hub.accounts.create_user("bob")?;

    let operator = hub.wallets.generate();
    chain.fund(&operator, &eth, 1_000_000_000);
    chain.seal_block();

    let height = chain.current_height().await?;
    let (deposit, route) = hub.request_deposit(
        alice,
        eth.clone(),
        DepositKind::Order { value: 250_000 },
        NetworkKind::Blockchain,
        Some(height),
    )?;
    if let RouteDescriptor::Blockchain { address, .. } = &route.descriptor {
        chain.inject_payment(address, &eth, 250_000);
        tracing::info!(
            deposit_id = %deposit.id,
            address = %address,
            "demo deposit paid, watch for confirmation"
        );
    }
    Ok(())
}
