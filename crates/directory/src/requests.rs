use {anyhow::Result, async_trait::async_trait};

use crosspost_common::types::{PostContent, UserId};

use crate::types::{ChannelStanding, PostRequest, RequestStatus};

/// Append-only log of submitted exchanges, used for auditing and /top.
///
/// The exchange engine only ever writes here (record + status updates); the
/// negotiation logic never reads it back.
#[async_trait]
pub trait RequestLog: Send + Sync {
    /// Append a new request entry.
    async fn record(
        &self,
        requester: UserId,
        channel: &str,
        content: &PostContent,
        status: RequestStatus,
    ) -> Result<()>;

    /// Update the status of the most recent request from `requester` to
    /// `channel`.
    async fn update_status(
        &self,
        requester: UserId,
        channel: &str,
        status: RequestStatus,
    ) -> Result<()>;

    /// Requests from `requester` still awaiting a decision.
    async fn pending_for(&self, requester: UserId) -> Result<Vec<PostRequest>>;

    /// Channels ranked by completed exchanges, descending.
    async fn top_channels(&self, limit: u32) -> Result<Vec<ChannelStanding>>;
}
