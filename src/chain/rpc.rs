use std::sync::Arc;

use async_trait::async_trait;
use ethers::prelude::{Http, Provider};
use ethers::providers::Middleware;
use ethers::types::Address;

use crate::error::{NodeError, Result};

/// Abstract read-only capability this crate needs from the chain: head block
/// number and the Coordinator's notion of its own highest subscription id at a
/// given block. Transaction submission is out of scope for this core (see
/// Non-goals) — every method here is a view call.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn head_block_number(&self) -> Result<u64>;
    async fn head_subscription_id_at(&self, block: u64) -> Result<u64>;
}

/// Default `ChainRpc` implementation over `ethers`' HTTP provider, the same
/// transport the reference keeper uses for its own RPC calls.
pub struct EthersChainRpc {
    provider: Arc<Provider<Http>>,
    coordinator: Address,
}

impl EthersChainRpc {
    pub fn new(provider: Provider<Http>, coordinator: Address) -> Self {
        Self { provider: Arc::new(provider), coordinator }
    }
}

#[async_trait]
impl ChainRpc for EthersChainRpc {
    async fn head_block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| NodeError::Rpc(e.to_string()))
    }

    async fn head_subscription_id_at(&self, block: u64) -> Result<u64> {
        // The Coordinator exposes its running subscription counter as a single
        // view-function slot read; bound it to `block` to avoid TOCTTOU against
        // the batched subscription reads that follow in the same reconciliation
        // pass.
        abigen_coordinator::Coordinator::new(self.coordinator, self.provider.clone())
            .head_subscription_id()
            .block(block)
            .call()
            .await
            .map(|id| id.as_u64())
            .map_err(|e| NodeError::Rpc(e.to_string()))
    }
}

mod abigen_coordinator {
    use ethers::contract::abigen;

    abigen!(
        Coordinator,
        r#"[
            function headSubscriptionId() view returns (uint256)
        ]"#
    );
}
