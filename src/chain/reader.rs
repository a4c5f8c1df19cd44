use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::providers::Middleware;
use ethers::types::{Address, U256};

use crate::error::{NodeError, Result};
use crate::model::Subscription;

/// Abstract view onto the Reader contract's two batch calls, so the `Reconciler`
/// does not need to be generic over an `ethers` middleware type.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn read_subscription_batch(
        &self,
        start_id: u64,
        end_id_exclusive: u64,
        block: u64,
    ) -> Result<Vec<Subscription>>;

    async fn read_redundancy_count_batch(
        &self,
        ids: &[u64],
        intervals: &[u64],
        block: u64,
    ) -> Result<Vec<u64>>;
}

abigen!(
    Reader,
    r#"[
        function readSubscriptionBatch(uint256 startId, uint256 endIdExclusive) view returns ((address owner, uint256 activeAt, uint256 period, uint256 frequency, uint256 redundancy, string[] containers, bool lazy, address paymentToken, uint256 paymentAmount, uint256 interval, bool lastInterval)[])
        function readRedundancyCountBatch(uint256[] ids, uint256[] intervals) view returns (uint256[])
    ]"#
);

/// Wraps the Reader view contract's two batch calls. Both are evaluated against a
/// fixed block number to avoid TOCTTOU between the subscription read and the
/// redundancy-count read that follows it in the same reconciliation pass.
pub struct SubscriptionReader<M: Middleware> {
    reader: Reader<M>,
}

impl<M: Middleware + 'static> SubscriptionReader<M> {
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self { reader: Reader::new(address, client) }
    }
}

#[async_trait]
impl<M: Middleware + 'static> SubscriptionSource for SubscriptionReader<M> {
    /// Reads subscriptions in `[start_id, end_id_exclusive)` at `block`, assigning
    /// ids densely by row position (the reader contract does not echo ids back).
    async fn read_subscription_batch(
        &self,
        start_id: u64,
        end_id_exclusive: u64,
        block: u64,
    ) -> Result<Vec<Subscription>> {
        if end_id_exclusive <= start_id {
            return Err(NodeError::Precondition(format!(
                "end_id_exclusive ({end_id_exclusive}) must be greater than start_id ({start_id})"
            )));
        }

        let rows = self
            .reader
            .read_subscription_batch(U256::from(start_id), U256::from(end_id_exclusive))
            .block(block)
            .call()
            .await
            .map_err(|e| NodeError::Rpc(e.to_string()))?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                Subscription::from_raw(
                    start_id + i as u64,
                    row.owner,
                    row.active_at.as_u64(),
                    row.period.as_u64(),
                    row.frequency.as_u64(),
                    row.redundancy.as_u64(),
                    row.containers,
                    row.lazy,
                    row.payment_token,
                    row.payment_amount.as_u64(),
                    row.interval.as_u64(),
                    row.last_interval,
                )
            })
            .collect())
    }

    /// Reads redundancy response counts for a parallel list of `(id, interval)`
    /// pairs. `ids.len()` must equal `intervals.len()`; the response has the same
    /// length, in the same order.
    async fn read_redundancy_count_batch(
        &self,
        ids: &[u64],
        intervals: &[u64],
        block: u64,
    ) -> Result<Vec<u64>> {
        if ids.len() != intervals.len() {
            return Err(NodeError::Precondition(format!(
                "ids ({}) and intervals ({}) must have the same length",
                ids.len(),
                intervals.len()
            )));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids_u256: Vec<U256> = ids.iter().map(|id| U256::from(*id)).collect();
        let intervals_u256: Vec<U256> = intervals.iter().map(|i| U256::from(*i)).collect();

        let counts = self
            .reader
            .read_redundancy_count_batch(ids_u256, intervals_u256)
            .block(block)
            .call()
            .await
            .map_err(|e| NodeError::Rpc(e.to_string()))?;

        Ok(counts.into_iter().map(|c| c.as_u64()).collect())
    }
}
