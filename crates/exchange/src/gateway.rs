use {anyhow::Result, async_trait::async_trait};

use crosspost_common::types::{PostContent, UserId};

/// Messaging seam the engine publishes and notifies through.
///
/// All calls are best-effort from the engine's point of view: a failure is
/// logged and surfaced as an outcome, never an engine panic. The Telegram
/// implementation lives in the `crosspost-telegram` crate; tests use a
/// recording fake.
#[async_trait]
pub trait PostGateway: Send + Sync {
    /// Direct message to a user.
    async fn send_user(&self, user: UserId, text: &str) -> Result<()>;

    /// Publish content into a channel (text or photo, selected by the
    /// content variant).
    async fn publish(&self, channel: &str, content: &PostContent) -> Result<()>;

    /// Deliver an approval request to the channel owner, with accept/decline
    /// controls referencing `requester` and `channel`.
    async fn send_approval_request(
        &self,
        owner: UserId,
        channel: &str,
        requester: UserId,
        content: &PostContent,
    ) -> Result<()>;
}
