use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::SubscriptionCreatedMessage;

/// Downstream state machine that owns accepted subscriptions and schedules their
/// execution. Keyed by subscription id, so re-submitting an already-known id is a
/// no-op — this is what makes `Reconciler::snapshot_sync` idempotent across
/// overlapping ranges.
#[async_trait]
pub trait ChainProcessor: Send + Sync {
    async fn track(&self, message: SubscriptionCreatedMessage);
}

/// Minimal in-memory `ChainProcessor` used as the crate's concrete default and in
/// tests: records which subscription ids have been tracked, deduplicating repeats.
#[derive(Default)]
pub struct InMemoryChainProcessor {
    tracked: Mutex<HashSet<u64>>,
}

impl InMemoryChainProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.tracked.lock().expect("tracked mutex poisoned").iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl ChainProcessor for InMemoryChainProcessor {
    async fn track(&self, message: SubscriptionCreatedMessage) {
        self.tracked
            .lock()
            .expect("tracked mutex poisoned")
            .insert(message.subscription.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::subscription::test_subscription;

    fn message(id: u64) -> SubscriptionCreatedMessage {
        SubscriptionCreatedMessage::new(test_subscription(id, 1))
    }

    #[tokio::test]
    async fn tracking_is_idempotent() {
        let processor = InMemoryChainProcessor::new();
        processor.track(message(7)).await;
        processor.track(message(7)).await;
        processor.track(message(9)).await;
        assert_eq!(processor.tracked_ids(), vec![7, 9]);
    }
}
