use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::batch;
use crate::chain::guardian::Guardian;
use crate::chain::processor::ChainProcessor;
use crate::chain::reader::SubscriptionSource;
use crate::chain::rpc::ChainRpc;
use crate::error::Result;
use crate::model::SubscriptionCreatedMessage;
use crate::retry::retry_with_backoff;
use crate::supervisor::TaskSupervisor;

/// Drives subscription discovery forward: reads newly-visible subscription ids at
/// a pinned block, admits them through the Guardian, and hands accepted work to
/// the ChainProcessor. Owns no chain-mutating capability — every RPC it issues is
/// a view call.
pub struct Reconciler {
    rpc: Arc<dyn ChainRpc>,
    reader: Arc<dyn SubscriptionSource>,
    guardian: Arc<dyn Guardian>,
    processor: Arc<dyn ChainProcessor>,
    supervisor: tokio::sync::Mutex<TaskSupervisor>,
    cancellation: CancellationToken,
    batch_size: u64,
    sync_sleep: Duration,
    last_subscription_id: AtomicU64,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        reader: Arc<dyn SubscriptionSource>,
        guardian: Arc<dyn Guardian>,
        processor: Arc<dyn ChainProcessor>,
        cancellation: CancellationToken,
        batch_size: u64,
        sync_sleep: Duration,
    ) -> Self {
        Self {
            rpc,
            reader,
            guardian,
            processor,
            supervisor: tokio::sync::Mutex::new(TaskSupervisor::default()),
            cancellation,
            batch_size,
            sync_sleep,
            last_subscription_id: AtomicU64::new(0),
        }
    }

    pub fn last_subscription_id(&self) -> u64 {
        self.last_subscription_id.load(Ordering::SeqCst)
    }

    /// Drains and (past a grace period) aborts any tracking tasks still in
    /// flight. Intended to be called once, at shutdown. Takes the supervisor
    /// out of its mutex rather than requiring exclusive `Arc` ownership, since
    /// callers (e.g. `ChainListener`) routinely hold their own clone of the
    /// surrounding `Arc<Reconciler>`.
    pub async fn drain(&self, grace_period: Duration) {
        let supervisor = std::mem::take(&mut *self.supervisor.lock().await);
        supervisor.drain(grace_period).await;
    }

    /// Syncs every subscription id visible at `head_block` that has not yet been
    /// synced. Safe to call repeatedly over overlapping ranges: `ChainProcessor`
    /// dedupes by subscription id.
    pub async fn snapshot_sync(&self, head_block: u64) -> Result<()> {
        let head_sub_id = self.rpc.head_subscription_id_at(head_block).await?;
        let start = self.last_subscription_id.load(Ordering::SeqCst) + 1;

        if start > head_sub_id {
            debug!(start, head_sub_id, "no new subscriptions to sync");
            return Ok(());
        }

        let batches = batch::plan(start, head_sub_id, self.batch_size);
        for (lo, hi_exclusive) in batches {
            if self.cancellation.is_cancelled() {
                return Ok(());
            }

            if self.sync_batch_with_retry(lo, hi_exclusive, head_block).await {
                self.last_subscription_id.store(hi_exclusive - 1, Ordering::SeqCst);
            } else {
                // Cancelled mid-batch (or retry gave up): nothing in [lo, hi_exclusive)
                // was read/admitted, so leave the counter untouched and let the next
                // snapshot_sync pass retry this same range.
                return Ok(());
            }

            tokio::select! {
                _ = tokio::time::sleep(self.sync_sleep) => {}
                _ = self.cancellation.cancelled() => return Ok(()),
            }
        }

        Ok(())
    }

    /// Returns `true` only when the batch was confirmed synced (subscriptions
    /// read, Guardian-checked, and handed off). `false` means shutdown was
    /// observed before or during the retry loop and the batch's id range must
    /// not be marked as synced.
    async fn sync_batch_with_retry(&self, start_id: u64, end_id_exclusive: u64, block: u64) -> bool {
        let label = format!("sync_batch[{start_id}, {end_id_exclusive})@{block}");
        let outcome = retry_with_backoff(self.sync_sleep, None, &self.cancellation, &label, || {
            self.sync_batch(start_id, end_id_exclusive, block)
        })
        .await;

        match outcome {
            Some(Ok(())) => true,
            Some(Err(err)) => {
                warn!(%err, start_id, end_id_exclusive, block, "batch sync failed permanently");
                false
            }
            None => {
                debug!(start_id, end_id_exclusive, block, "batch sync abandoned on shutdown");
                false
            }
        }
    }

    async fn sync_batch(&self, start_id: u64, end_id_exclusive: u64, block: u64) -> Result<()> {
        let mut subscriptions = self.reader.read_subscription_batch(start_id, end_id_exclusive, block).await?;

        let last_interval_ids: Vec<u64> = subscriptions.iter().filter(|s| s.last_interval).map(|s| s.id).collect();
        let last_interval_values: Vec<u64> = subscriptions.iter().filter(|s| s.last_interval).map(|s| s.interval).collect();

        if !last_interval_ids.is_empty() {
            let counts = self
                .reader
                .read_redundancy_count_batch(&last_interval_ids, &last_interval_values, block)
                .await?;
            for (id, count) in last_interval_ids.iter().zip(counts) {
                if let Some(subscription) = subscriptions.iter_mut().find(|s| s.id == *id) {
                    subscription.set_response_count(subscription.interval, count);
                }
            }
        }

        for subscription in subscriptions {
            let id = subscription.id;
            let message = SubscriptionCreatedMessage::new(subscription);

            match self.guardian.process_message(&message).await {
                Ok(()) => {
                    let processor = self.processor.clone();
                    let mut supervisor = self.supervisor.lock().await;
                    supervisor.spawn(async move {
                        processor.track(message).await;
                    });
                }
                Err(err) => info!(subscription_id = id, %err, "subscription rejected by guardian"),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;

    use crate::chain::guardian::RuleChainGuardian;
    use crate::chain::processor::InMemoryChainProcessor;
    use crate::model::subscription::test_subscription;
    use crate::model::Subscription;

    struct FixedRpc {
        head_sub_id: u64,
    }

    #[async_trait]
    impl ChainRpc for FixedRpc {
        async fn head_block_number(&self) -> Result<u64> {
            Ok(0)
        }

        async fn head_subscription_id_at(&self, _block: u64) -> Result<u64> {
            Ok(self.head_sub_id)
        }
    }

    /// Serves subscriptions out of a fixed in-memory set, keyed by id, so tests
    /// can assert on exactly what `snapshot_sync` discovers without needing a
    /// real `abigen!` contract.
    struct FakeReader {
        subscriptions: Vec<Subscription>,
    }

    impl FakeReader {
        fn new(ids: impl IntoIterator<Item = u64>) -> Self {
            Self { subscriptions: ids.into_iter().map(|id| test_subscription(id, 1)).collect() }
        }
    }

    #[async_trait]
    impl SubscriptionSource for FakeReader {
        async fn read_subscription_batch(
            &self,
            start_id: u64,
            end_id_exclusive: u64,
            _block: u64,
        ) -> Result<Vec<Subscription>> {
            Ok(self
                .subscriptions
                .iter()
                .filter(|s| s.id >= start_id && s.id < end_id_exclusive)
                .cloned()
                .collect())
        }

        async fn read_redundancy_count_batch(
            &self,
            ids: &[u64],
            _intervals: &[u64],
            _block: u64,
        ) -> Result<Vec<u64>> {
            Ok(vec![0; ids.len()])
        }
    }

    /// Rejects a fixed set of subscription ids, accepting everything else.
    struct RejectingGuardian {
        rejected: HashSet<u64>,
    }

    #[async_trait]
    impl Guardian for RejectingGuardian {
        async fn process_message(
            &self,
            message: &SubscriptionCreatedMessage,
        ) -> std::result::Result<(), crate::model::GuardianError> {
            if self.rejected.contains(&message.subscription.id) {
                Err(crate::model::GuardianError::new("rejected by test policy"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn cold_start_sync_splits_into_batches_and_tracks_everything() {
        let reader = FakeReader::new(1..=5);
        let rpc = Arc::new(FixedRpc { head_sub_id: 5 });
        let processor = Arc::new(InMemoryChainProcessor::new());
        let reconciler = Reconciler::new(
            rpc,
            Arc::new(reader),
            Arc::new(RuleChainGuardian::accept_all()),
            processor.clone(),
            CancellationToken::new(),
            3,
            Duration::from_millis(1),
        );

        reconciler.snapshot_sync(0).await.unwrap();
        reconciler.drain(Duration::from_millis(50)).await;

        assert_eq!(processor.tracked_ids(), vec![1, 2, 3, 4, 5]);
        assert_eq!(reconciler.last_subscription_id(), 5);
    }

    #[tokio::test]
    async fn guardian_rejection_of_one_id_does_not_block_its_siblings() {
        let reader = FakeReader::new([7, 8, 9]);
        let processor = Arc::new(InMemoryChainProcessor::new());
        let guardian: Arc<dyn Guardian> = Arc::new(RejectingGuardian { rejected: HashSet::from([8]) });

        let rpc = Arc::new(FixedRpc { head_sub_id: 9 });
        let reconciler = Reconciler::new(
            rpc,
            Arc::new(reader),
            guardian,
            processor.clone(),
            CancellationToken::new(),
            10,
            Duration::from_millis(1),
        );
        reconciler.last_subscription_id.store(6, Ordering::SeqCst);

        reconciler.snapshot_sync(0).await.unwrap();
        reconciler.drain(Duration::from_millis(50)).await;

        assert_eq!(processor.tracked_ids(), vec![7, 9]);
        assert_eq!(reconciler.last_subscription_id(), 9);
    }

    #[tokio::test]
    async fn snapshot_sync_is_a_noop_when_already_caught_up() {
        let reader = FakeReader::new(1..=3);
        let processor = Arc::new(InMemoryChainProcessor::new());
        let rpc = Arc::new(FixedRpc { head_sub_id: 3 });
        let reconciler = Reconciler::new(
            rpc,
            Arc::new(reader),
            Arc::new(RuleChainGuardian::accept_all()),
            processor.clone(),
            CancellationToken::new(),
            10,
            Duration::from_millis(1),
        );
        reconciler.last_subscription_id.store(3, Ordering::SeqCst);

        reconciler.snapshot_sync(0).await.unwrap();

        assert!(processor.tracked_ids().is_empty());
        assert_eq!(reconciler.last_subscription_id(), 3);
    }
}
