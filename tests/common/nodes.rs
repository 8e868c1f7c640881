use async_trait::async_trait;
use serde_json::{json, Value};

use pregelflow::node::{Node, NodeContext, NodeError, NodePartial};
use pregelflow::state::StateSnapshot;

/// Increments an integer channel by one. Defaults to zero when absent.
pub struct Increment {
    pub key: &'static str,
}

#[async_trait]
impl Node for Increment {
    async fn run(&self, snapshot: StateSnapshot, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
        let current = snapshot.get(self.key).and_then(Value::as_i64).unwrap_or(0);
        Ok(NodePartial::new().with_update(self.key, json!(current + 1)))
    }
}

/// Fails its first `fail_times` invocations, then succeeds. Used to exercise
/// [`pregelflow::retry::RetryPolicy`].
pub struct FlakyThenSucceed {
    pub fail_times: u32,
    pub attempts: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

#[async_trait]
impl Node for FlakyThenSucceed {
    async fn run(&self, _snapshot: StateSnapshot, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
        let attempt = self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if attempt <= self.fail_times {
            return Err(NodeError::Provider {
                provider: "flaky",
                message: format!("attempt {attempt} failed"),
            });
        }
        Ok(NodePartial::new().with_update("attempts_used", json!(attempt)))
    }
}
