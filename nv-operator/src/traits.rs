use crate::types::PermissionAnswer;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Operator: Send + Sync {
    /// Identifier used in logs: "console", "scripted".
    fn operator_id(&self) -> &str;

    /// Next conversation turn. `None` once the input is exhausted.
    async fn next_turn(&self) -> Result<Option<String>>;

    /// Blocks until the human answers. There is no timeout.
    async fn ask_permission(&self, description: &str) -> Result<PermissionAnswer>;

    /// Display agent output or a system notice.
    async fn show(&self, text: &str) -> Result<()>;
}
