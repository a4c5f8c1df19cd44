pub mod batch;
pub mod guardian;
pub mod listener;
pub mod processor;
pub mod reader;
pub mod reconciler;
pub mod rpc;

pub use guardian::{Guardian, GuardianRule, MaxRedundancyRule, RuleChainGuardian};
pub use listener::ChainListener;
pub use processor::{ChainProcessor, InMemoryChainProcessor};
pub use reader::{SubscriptionReader, SubscriptionSource};
pub use reconciler::Reconciler;
pub use rpc::{ChainRpc, EthersChainRpc};
