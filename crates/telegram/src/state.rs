use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use {
    crosspost_directory::{BlockList, ChannelDirectory, RequestLog},
    crosspost_exchange::ExchangeService,
};

use crate::config::BotConfig;

/// Shared runtime state handed to every handler.
pub struct BotState {
    pub bot: teloxide::Bot,
    pub bot_username: Option<String>,
    pub config: BotConfig,
    pub directory: Arc<dyn ChannelDirectory>,
    pub requests: Arc<dyn RequestLog>,
    pub blocklist: Arc<dyn BlockList>,
    pub exchange: Arc<ExchangeService>,
    pub cancel: CancellationToken,
}
