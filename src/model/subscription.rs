use std::collections::HashMap;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// Authoritative subscription record as read from the chain.
///
/// Invariants: `id` is unique and densely assigned starting at 1; `frequency >= 1`;
/// `redundancy >= 1`. Every field is immutable once constructed except
/// `response_count_by_interval`, which is lazily populated for subscriptions on
/// their last interval (see [`Subscription::set_response_count`]).
///
/// `interval` and `last_interval` are computed on-chain by the Reader view
/// contract (which has access to the block timestamp at query time) and returned
/// as part of the row, rather than recomputed locally against a wall-clock "now" —
/// this keeps every related read pinned to the same block (see TOCTTOU note in
/// `SubscriptionReader`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: u64,
    pub owner: Address,
    pub active_at: u64,
    /// Interval length; `0` means one-shot (a single, non-recurring execution).
    pub period: u64,
    pub frequency: u64,
    pub redundancy: u64,
    pub containers: Vec<String>,
    pub lazy: bool,
    pub payment_token: Address,
    pub payment_amount: u64,
    /// Current interval index at the block the subscription was read at.
    pub interval: u64,
    /// Whether `interval` is this subscription's terminal interval.
    pub last_interval: bool,
    #[serde(default)]
    pub response_count_by_interval: HashMap<u64, u64>,
}

impl Subscription {
    /// Assembles a subscription from the raw tuple a `readSubscriptionBatch` row
    /// decodes into, assigning `id` densely by the row's position in the batch
    /// rather than trusting an on-chain id field (the reader contract does not
    /// echo it back).
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        id: u64,
        owner: Address,
        active_at: u64,
        period: u64,
        frequency: u64,
        redundancy: u64,
        containers: Vec<String>,
        lazy: bool,
        payment_token: Address,
        payment_amount: u64,
        interval: u64,
        last_interval: bool,
    ) -> Self {
        Self {
            id,
            owner,
            active_at,
            period,
            frequency,
            redundancy,
            containers,
            lazy,
            payment_token,
            payment_amount,
            interval,
            last_interval,
            response_count_by_interval: HashMap::new(),
        }
    }

    /// Records the observed redundancy response count for `interval`. Only ever
    /// called for subscriptions where `last_interval` is true, so downstream
    /// consumers can filter out subscriptions that have already received their
    /// full redundancy quota on their final interval.
    pub fn set_response_count(&mut self, interval: u64, count: u64) {
        self.response_count_by_interval.insert(interval, count);
    }

    pub fn response_count(&self, interval: u64) -> Option<u64> {
        self.response_count_by_interval.get(&interval).copied()
    }
}

/// Wraps a [`Subscription`] for Guardian evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionCreatedMessage {
    pub subscription: Subscription,
}

impl SubscriptionCreatedMessage {
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }
}

/// Opaque rejection reason returned by the Guardian policy layer.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{error}")]
pub struct GuardianError {
    pub error: String,
}

impl GuardianError {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[cfg(test)]
pub(crate) fn test_subscription(id: u64, redundancy: u64) -> Subscription {
    Subscription::from_raw(
        id,
        Address::zero(),
        0,
        0,
        1,
        redundancy,
        vec!["a".to_string()],
        false,
        Address::zero(),
        0,
        0,
        true,
    )
}
