//! Mineral Mining Agent Binary
//!
//! Usage:
//!   mineral-mine --config mineral.toml --signer http://127.0.0.1:9100 --rounds 10

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use mineral_miner::{
    EventSink, MineEvent, Miner, MinerConfig, RemoteSigner, RpcLedger, SystemClock,
    TransactionSigner,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Mineral mining agent
#[derive(Debug, Parser)]
#[command(name = "mineral-mine")]
#[command(about = "Proof-of-work miner for on-chain reward buses")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, short = 'c', default_value = "mineral.toml")]
    config: PathBuf,

    /// Ledger JSON-RPC endpoint, overrides the config file
    #[arg(long, env = "RPC")]
    rpc: Option<String>,

    /// Signing service JSON-RPC endpoint
    #[arg(long, env = "SIGNER_URL")]
    signer: String,

    /// Number of rounds to run (0 = unlimited)
    #[arg(long, short = 'n', default_value = "0")]
    rounds: u64,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut config = MinerConfig::load(&args.config)?;
    if let Some(rpc) = args.rpc {
        config.rpc_url = rpc;
    }

    let ledger = Arc::new(RpcLedger::new(&config.rpc_url, config.package_id)?);
    let signer = Arc::new(RemoteSigner::connect(&args.signer).await?);

    info!(
        target: "mineral::mine",
        rpc = %config.rpc_url,
        signer = %signer.address(),
        buses = config.buses.len(),
        difficulty = %config.difficulty,
        rounds = args.rounds,
        "Starting Mineral miner"
    );

    let (events, mut event_rx) = EventSink::channel(64);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                MineEvent::Success => info!(target: "mineral::mine", "✓ Proof accepted"),
                other => debug!(target: "mineral::mine", event = ?other),
            }
        }
    });

    let miner = Miner::new(ledger, signer, SystemClock, config).with_events(events);
    let max_rounds = (args.rounds > 0).then_some(args.rounds);

    tokio::select! {
        result = miner.run(max_rounds) => {
            let summary = result?;
            info!(
                target: "mineral::mine",
                rounds = summary.rounds,
                mined = summary.mined,
                retries = summary.retries,
                "Mining complete!"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            miner.worker().cancel();
            info!(target: "mineral::mine", "Interrupted, shutting down");
        }
    }

    Ok(())
}
