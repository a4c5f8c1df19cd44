use std::path::PathBuf;
use std::time::Duration;

use ethers::types::Address;

use crate::error::{NodeError, Result};

/// Subscription-loop batch ceiling: the maximum number of subscription ids the
/// `ChainListener` will ask the `Reconciler` to consider advancing per iteration.
pub const SUBSCRIPTION_SYNC_BATCH_SIZE: u64 = 20;

/// Block-step ceiling: the maximum number of blocks the `ChainListener` advances
/// `last_synced_block` by per iteration, to bound RPC load.
pub const BLOCK_STEP_CEILING: u64 = 100;

const DEFAULT_SNAPSHOT_SYNC_SLEEP_SECS: f64 = 1.0;
const DEFAULT_SNAPSHOT_SYNC_BATCH_SIZE: u64 = 200;

/// Assembled, validated configuration for the worker node core.
///
/// Built by layering explicit CLI flags over environment variables over an
/// optional config file over built-in defaults, in that order of precedence —
/// the same layering the reference keeper CLI uses for its RPC URL.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub rpc_url: String,
    pub coordinator_address: Address,
    pub reader_address: Address,

    pub trail_head_blocks: u64,
    pub snapshot_sync_sleep: Duration,
    pub snapshot_sync_batch_size: u64,

    pub container_manager_config_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,

    /// Run setup() followed by a single run_forever iteration, then exit.
    pub once: bool,
}

/// Raw, unvalidated inputs collected from CLI flags before defaults/env layering
/// is applied. Mirrors the shape of `Args` in `main.rs`.
#[derive(Debug, Clone, Default)]
pub struct RawConfigInputs {
    pub rpc_url: Option<String>,
    pub coordinator_address: Option<String>,
    pub reader_address: Option<String>,
    pub trail_head_blocks: Option<u64>,
    pub snapshot_sync_sleep_secs: Option<f64>,
    pub snapshot_sync_batch_size: Option<u64>,
    pub container_manager_config_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub once: bool,
}

impl NodeConfig {
    pub fn from_raw(raw: RawConfigInputs) -> Result<Self> {
        let rpc_url = raw
            .rpc_url
            .or_else(|| std::env::var("COMPUTE_NODE_RPC_URL").ok())
            .ok_or_else(|| {
                NodeError::Config(
                    "no rpc url provided; pass --rpc-url or set COMPUTE_NODE_RPC_URL".to_string(),
                )
            })?;

        let coordinator_address = parse_address(
            raw.coordinator_address
                .or_else(|| std::env::var("COMPUTE_NODE_COORDINATOR_ADDRESS").ok()),
            "coordinator address",
        )?;

        let reader_address = parse_address(
            raw.reader_address
                .or_else(|| std::env::var("COMPUTE_NODE_READER_ADDRESS").ok()),
            "reader address",
        )?;

        let trail_head_blocks = raw.trail_head_blocks.unwrap_or(0);

        let snapshot_sync_sleep_secs = raw
            .snapshot_sync_sleep_secs
            .unwrap_or(DEFAULT_SNAPSHOT_SYNC_SLEEP_SECS);
        if snapshot_sync_sleep_secs < 0.0 {
            return Err(NodeError::Config("snapshot sync sleep must be >= 0".to_string()));
        }

        let snapshot_sync_batch_size = raw
            .snapshot_sync_batch_size
            .unwrap_or(DEFAULT_SNAPSHOT_SYNC_BATCH_SIZE);
        if snapshot_sync_batch_size == 0 {
            return Err(NodeError::Config("snapshot sync batch size must be > 0".to_string()));
        }

        let container_manager_config_path = raw
            .container_manager_config_path
            .unwrap_or_else(|| PathBuf::from("config/containers.json"));

        let log_dir = raw.log_dir.unwrap_or_else(|| PathBuf::from("logs"));
        let log_level = raw
            .log_level
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            rpc_url,
            coordinator_address,
            reader_address,
            trail_head_blocks,
            snapshot_sync_sleep: Duration::from_secs_f64(snapshot_sync_sleep_secs),
            snapshot_sync_batch_size,
            container_manager_config_path,
            log_dir,
            log_level,
            once: raw.once,
        })
    }
}

fn parse_address(value: Option<String>, what: &str) -> Result<Address> {
    let raw = value.ok_or_else(|| NodeError::Config(format!("no {what} provided")))?;
    raw.parse::<Address>()
        .map_err(|e| NodeError::Config(format!("invalid {what} '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_raw() -> RawConfigInputs {
        RawConfigInputs {
            rpc_url: Some("http://localhost:8545".to_string()),
            coordinator_address: Some("0x0000000000000000000000000000000000000001".to_string()),
            reader_address: Some("0x0000000000000000000000000000000000000002".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn applies_defaults() {
        let cfg = NodeConfig::from_raw(valid_raw()).unwrap();
        assert_eq!(cfg.snapshot_sync_batch_size, DEFAULT_SNAPSHOT_SYNC_BATCH_SIZE);
        assert_eq!(cfg.snapshot_sync_sleep, Duration::from_secs(1));
        assert!(!cfg.once);
    }

    #[test]
    fn rejects_missing_rpc_url() {
        let mut raw = valid_raw();
        raw.rpc_url = None;
        std::env::remove_var("COMPUTE_NODE_RPC_URL");
        assert!(NodeConfig::from_raw(raw).is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut raw = valid_raw();
        raw.snapshot_sync_batch_size = Some(0);
        assert!(NodeConfig::from_raw(raw).is_err());
    }
}
