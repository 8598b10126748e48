use {anyhow::Result, async_trait::async_trait};

use crosspost_common::types::UserId;

use crate::types::BlockedUser;

/// Admin-maintained list of users refused service.
#[async_trait]
pub trait BlockList: Send + Sync {
    /// Block a user. Idempotent; a known username is stored for display.
    async fn block(&self, user: UserId, username: Option<&str>) -> Result<()>;

    /// Unblock a user. Returns whether the user was blocked.
    async fn unblock(&self, user: UserId) -> Result<bool>;

    async fn is_blocked(&self, user: UserId) -> Result<bool>;

    /// All blocked users, most recently blocked first.
    async fn list(&self) -> Result<Vec<BlockedUser>>;
}
