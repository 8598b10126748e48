use {anyhow::Result, async_trait::async_trait};

use crosspost_common::types::UserId;

use crate::types::RegisteredChannel;

/// The channel registry: which channels exist and who owns them.
///
/// Read-mostly from the exchange engine's perspective; `register` and
/// `unregister` are driven by the /addchannel and /removechannel commands.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Resolve the owning identity of a channel, if it is registered.
    async fn resolve_owner(&self, channel: &str) -> Result<Option<UserId>>;

    /// All registered channels, oldest first.
    async fn list_registered(&self) -> Result<Vec<RegisteredChannel>>;

    /// Channels owned by `user`, oldest first.
    async fn list_owned(&self, user: UserId) -> Result<Vec<String>>;

    /// Every identity that owns at least one channel.
    async fn list_owners(&self) -> Result<Vec<UserId>>;

    /// Register (or re-own) a channel.
    async fn register(&self, channel: &str, owner: UserId) -> Result<()>;

    /// Remove a channel registration if `owner` actually owns it.
    /// Returns whether a row was removed.
    async fn unregister(&self, channel: &str, owner: UserId) -> Result<bool>;
}
