use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ethers::prelude::{Http, Provider};
use eyre::{eyre, Result};
use fs2::FileExt;
use tokio_util::sync::CancellationToken;

use compute_node::chain::{ChainListener, EthersChainRpc, Reconciler, RuleChainGuardian, SubscriptionReader};
use compute_node::config::{NodeConfig, RawConfigInputs};
use compute_node::logging;
use compute_node::supervisor::TaskSupervisor;

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "compute-node", version, about = "Off-chain worker node core")]
struct Args {
    /// JSON-RPC endpoint of the chain this node reads from.
    #[arg(long)]
    rpc_url: Option<String>,

    /// Address of the Coordinator contract.
    #[arg(long)]
    coordinator_address: Option<String>,

    /// Address of the Reader view contract.
    #[arg(long)]
    reader_address: Option<String>,

    /// Block safety margin against chain reorganizations.
    #[arg(long)]
    trail_head_blocks: Option<u64>,

    /// Sleep between subscription-sync batches, in seconds.
    #[arg(long)]
    snapshot_sync_sleep_secs: Option<f64>,

    /// Number of subscription ids considered per sync batch.
    #[arg(long)]
    snapshot_sync_batch_size: Option<u64>,

    /// Path to the container name -> port config file.
    #[arg(long)]
    container_manager_config_path: Option<PathBuf>,

    /// Directory for rotated log files.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// tracing-subscriber EnvFilter directive string.
    #[arg(long)]
    log_level: Option<String>,

    /// Run setup() followed by a single run_forever iteration, then exit.
    #[arg(long)]
    once: bool,
}

impl From<Args> for RawConfigInputs {
    fn from(args: Args) -> Self {
        RawConfigInputs {
            rpc_url: args.rpc_url,
            coordinator_address: args.coordinator_address,
            reader_address: args.reader_address,
            trail_head_blocks: args.trail_head_blocks,
            snapshot_sync_sleep_secs: args.snapshot_sync_sleep_secs,
            snapshot_sync_batch_size: args.snapshot_sync_batch_size,
            container_manager_config_path: args.container_manager_config_path,
            log_dir: args.log_dir,
            log_level: args.log_level,
            once: args.once,
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = NodeConfig::from_raw(args.into()).map_err(|e| eyre!(e))?;

    // Keep the ops directory alive and lock it, so two copies of the node never
    // fight over the same log files. The listener itself persists nothing.
    std::fs::create_dir_all(&config.log_dir)
        .map_err(|e| eyre!("failed to create log directory {}: {e}", config.log_dir.display()))?;
    let lock_path = config.log_dir.join("compute-node.lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| eyre!("failed to open lock file {}: {e}", lock_path.display()))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|e| eyre!("compute-node already running or lock unavailable ({}): {e}", lock_path.display()))?;
    let _lock_guard = lock_file;

    let _log_guard = logging::init(&config.log_dir, &config.log_level);

    tracing::info!(
        rpc_url = config.rpc_url,
        coordinator = ?config.coordinator_address,
        reader = ?config.reader_address,
        trail_head_blocks = config.trail_head_blocks,
        once = config.once,
        "compute node starting"
    );

    let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
        .map_err(|e| eyre!("invalid rpc url {}: {e}", config.rpc_url))?
        .interval(Duration::from_millis(800));
    let provider_arc = Arc::new(provider.clone());

    let rpc = Arc::new(EthersChainRpc::new(provider.clone(), config.coordinator_address));
    let reader = Arc::new(SubscriptionReader::new(config.reader_address, provider_arc));
    let guardian = Arc::new(RuleChainGuardian::accept_all());
    let processor = Arc::new(compute_node::chain::InMemoryChainProcessor::new());

    let cancellation = CancellationToken::new();

    let reconciler = Arc::new(Reconciler::new(
        rpc.clone(),
        reader,
        guardian,
        processor,
        cancellation.clone(),
        config.snapshot_sync_batch_size,
        config.snapshot_sync_sleep,
    ));

    let listener = ChainListener::new(rpc, reconciler.clone(), cancellation.clone(), config.trail_head_blocks);

    listener.setup().await.map_err(|e| eyre!(e))?;

    if config.once {
        listener.run_forever(true).await.map_err(|e| eyre!(e))?;
        listener.cleanup();
        reconciler.drain(SHUTDOWN_GRACE_PERIOD).await;
        return Ok(());
    }

    let mut supervisor = TaskSupervisor::new();
    let run_cancellation = cancellation.clone();
    supervisor.spawn(async move {
        if let Err(err) = listener.run_forever(false).await {
            tracing::error!(%err, "chain listener loop exited with error");
        }
        listener.cleanup();
        run_cancellation.cancel();
    });

    wait_for_shutdown_signal().await;
    cancellation.cancel();

    supervisor.drain(SHUTDOWN_GRACE_PERIOD).await;
    reconciler.drain(SHUTDOWN_GRACE_PERIOD).await;

    tracing::info!("compute node shut down cleanly");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
