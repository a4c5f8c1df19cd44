use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::chain::reconciler::Reconciler;
use crate::chain::rpc::ChainRpc;
use crate::config::BLOCK_STEP_CEILING;
use crate::error::Result;

const IDLE_SLEEP: Duration = Duration::from_millis(500);

/// Long-running driver loop: advances a "synced head" pointer, delegating the
/// actual subscription discovery work to a [`Reconciler`], and idles when caught
/// up. Lifecycle is `setup` then `run_forever` then `cleanup`.
pub struct ChainListener {
    rpc: Arc<dyn ChainRpc>,
    reconciler: Arc<Reconciler>,
    cancellation: CancellationToken,
    trail_head_blocks: u64,
    last_synced_block: AtomicU64,
}

impl ChainListener {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        reconciler: Arc<Reconciler>,
        cancellation: CancellationToken,
        trail_head_blocks: u64,
    ) -> Self {
        Self {
            rpc,
            reconciler,
            cancellation,
            trail_head_blocks,
            last_synced_block: AtomicU64::new(0),
        }
    }

    async fn trailing_head(&self) -> Result<u64> {
        let head = self.rpc.head_block_number().await?;
        Ok(head.saturating_sub(self.trail_head_blocks))
    }

    /// Establishes the starting sync point and performs the first reconciliation
    /// pass. Must be called before `run_forever`.
    pub async fn setup(&self) -> Result<()> {
        let head = self.trailing_head().await?;
        self.last_synced_block.store(head, Ordering::SeqCst);
        info!(head, "chain listener starting from trailing head");
        self.reconciler.snapshot_sync(head).await
    }

    /// Runs one loop iteration: advances `last_synced_block` towards the current
    /// trailing head (bounded by [`BLOCK_STEP_CEILING`]) and reconciles, or idles
    /// briefly if already caught up. Returns `true` if it advanced.
    async fn run_once(&self) -> Result<bool> {
        let head = self.trailing_head().await?;
        let last_synced = self.last_synced_block.load(Ordering::SeqCst);

        if head > last_synced {
            let step = (head - last_synced).min(BLOCK_STEP_CEILING);
            let target = last_synced + step;

            let head_sub_id = self.rpc.head_subscription_id_at(target).await?;
            self.reconciler.snapshot_sync(head).await?;

            self.last_synced_block.store(target, Ordering::SeqCst);
            debug!(target, head_sub_id, "advanced synced head");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Drives the loop until the cancellation token fires. `once` runs a single
    /// iteration's worth of work and returns immediately afterwards, regardless
    /// of whether it advanced — intended for scripted/test invocations.
    pub async fn run_forever(&self, once: bool) -> Result<()> {
        loop {
            if self.cancellation.is_cancelled() {
                return Ok(());
            }

            let advanced = self.run_once().await?;

            if once {
                return Ok(());
            }

            if !advanced {
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_SLEEP) => {}
                    _ = self.cancellation.cancelled() => return Ok(()),
                }
            }
        }
    }

    /// No-op, kept for lifecycle symmetry with `setup`/`run_forever`.
    pub fn cleanup(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64 as TestAtomicU64;

    use crate::chain::guardian::RuleChainGuardian;
    use crate::chain::processor::InMemoryChainProcessor;
    use crate::chain::reader::SubscriptionSource;
    use crate::model::Subscription;

    struct FixedRpc {
        head_block: TestAtomicU64,
        head_sub_id: TestAtomicU64,
    }

    #[async_trait]
    impl ChainRpc for FixedRpc {
        async fn head_block_number(&self) -> Result<u64> {
            Ok(self.head_block.load(Ordering::SeqCst))
        }

        async fn head_subscription_id_at(&self, _block: u64) -> Result<u64> {
            Ok(self.head_sub_id.load(Ordering::SeqCst))
        }
    }

    struct EmptyReader;

    #[async_trait]
    impl SubscriptionSource for EmptyReader {
        async fn read_subscription_batch(
            &self,
            _start_id: u64,
            _end_id_exclusive: u64,
            _block: u64,
        ) -> Result<Vec<Subscription>> {
            Ok(Vec::new())
        }

        async fn read_redundancy_count_batch(
            &self,
            _ids: &[u64],
            _intervals: &[u64],
            _block: u64,
        ) -> Result<Vec<u64>> {
            Ok(Vec::new())
        }
    }

    fn make_listener(head_block: u64, head_sub_id: u64, trail: u64) -> ChainListener {
        let rpc: Arc<dyn ChainRpc> = Arc::new(FixedRpc {
            head_block: TestAtomicU64::new(head_block),
            head_sub_id: TestAtomicU64::new(head_sub_id),
        });
        let reconciler = Arc::new(Reconciler::new(
            rpc.clone(),
            Arc::new(EmptyReader),
            Arc::new(RuleChainGuardian::accept_all()),
            Arc::new(InMemoryChainProcessor::new()),
            CancellationToken::new(),
            20,
            Duration::from_millis(1),
        ));
        ChainListener::new(rpc, reconciler, CancellationToken::new(), trail)
    }

    #[tokio::test]
    async fn setup_trails_head_by_configured_margin() {
        let listener = make_listener(110, 0, 10);
        listener.setup().await.unwrap();
        assert_eq!(listener.last_synced_block.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn run_once_caps_progress_at_block_step_ceiling() {
        let listener = make_listener(10_110, 0, 10);
        listener.setup().await.unwrap();
        assert_eq!(listener.last_synced_block.load(Ordering::SeqCst), 10_100);

        let advanced = listener.run_once().await.unwrap();
        assert!(advanced);
        assert_eq!(
            listener.last_synced_block.load(Ordering::SeqCst),
            10_100 + BLOCK_STEP_CEILING
        );
    }

    #[tokio::test]
    async fn run_once_is_noop_when_caught_up() {
        let listener = make_listener(100, 0, 10);
        listener.setup().await.unwrap();
        let advanced = listener.run_once().await.unwrap();
        assert!(!advanced);
    }

    #[tokio::test]
    async fn once_mode_runs_a_single_iteration_and_returns() {
        let listener = make_listener(200, 0, 10);
        listener.run_forever(true).await.unwrap();
        assert_eq!(listener.last_synced_block.load(Ordering::SeqCst), 190);
    }
}
