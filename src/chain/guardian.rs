use async_trait::async_trait;

use crate::model::{GuardianError, SubscriptionCreatedMessage};

/// Policy layer deciding whether a subscription is admitted into the work queue.
/// A pure function from the caller's perspective: same message in, same verdict
/// out, no side effects.
#[async_trait]
pub trait Guardian: Send + Sync {
    async fn process_message(
        &self,
        message: &SubscriptionCreatedMessage,
    ) -> Result<(), GuardianError>;
}

/// A single admission rule. Evaluated in order by [`RuleChainGuardian`]; the first
/// rule to reject a message short-circuits the chain.
pub trait GuardianRule: Send + Sync {
    fn evaluate(&self, message: &SubscriptionCreatedMessage) -> Result<(), GuardianError>;
}

/// Default `Guardian`: evaluates an ordered chain of [`GuardianRule`]s. With no
/// rules configured, every message is accepted.
pub struct RuleChainGuardian {
    rules: Vec<Box<dyn GuardianRule>>,
}

impl RuleChainGuardian {
    pub fn new(rules: Vec<Box<dyn GuardianRule>>) -> Self {
        Self { rules }
    }

    pub fn accept_all() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Guardian for RuleChainGuardian {
    async fn process_message(
        &self,
        message: &SubscriptionCreatedMessage,
    ) -> Result<(), GuardianError> {
        for rule in &self.rules {
            rule.evaluate(message)?;
        }
        Ok(())
    }
}

/// Rejects subscriptions whose `redundancy` exceeds a configured ceiling — a
/// simple, concrete example rule exercised by the unit tests below.
pub struct MaxRedundancyRule {
    pub max_redundancy: u64,
}

impl GuardianRule for MaxRedundancyRule {
    fn evaluate(&self, message: &SubscriptionCreatedMessage) -> Result<(), GuardianError> {
        if message.subscription.redundancy > self.max_redundancy {
            return Err(GuardianError::new(format!(
                "redundancy {} exceeds max {}",
                message.subscription.redundancy, self.max_redundancy
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::subscription::test_subscription;

    fn message_with_redundancy(redundancy: u64) -> SubscriptionCreatedMessage {
        SubscriptionCreatedMessage::new(test_subscription(1, redundancy))
    }

    #[tokio::test]
    async fn accept_all_admits_everything() {
        let guardian = RuleChainGuardian::accept_all();
        assert!(guardian.process_message(&message_with_redundancy(1000)).await.is_ok());
    }

    #[tokio::test]
    async fn rule_chain_rejects_on_first_failing_rule() {
        let guardian = RuleChainGuardian::new(vec![Box::new(MaxRedundancyRule { max_redundancy: 3 })]);
        assert!(guardian.process_message(&message_with_redundancy(2)).await.is_ok());
        assert!(guardian.process_message(&message_with_redundancy(4)).await.is_err());
    }
}
