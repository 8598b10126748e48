use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    crosspost_directory::{BlockList, ChannelDirectory, RequestLog},
    crosspost_exchange::ExchangeService,
};

use crate::{
    config::BotConfig,
    error::{Context, Result},
    handlers,
    outbound::TelegramGateway,
    state::BotState,
};

/// Start polling for updates.
///
/// Spawns the polling loop and the idle-negotiation sweeper as background
/// tasks that run until the returned `CancellationToken` is cancelled.
pub async fn start_polling(
    config: BotConfig,
    directory: Arc<dyn ChannelDirectory>,
    requests: Arc<dyn RequestLog>,
    blocklist: Arc<dyn BlockList>,
) -> Result<CancellationToken> {
    // Build bot with a client timeout longer than the long-polling timeout (30s)
    // so the HTTP client doesn't abort the request before Telegram responds.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(45))
        .build()?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    // Verify credentials and get the bot username.
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();

    // Delete any existing webhook so long polling works.
    bot.delete_webhook()
        .send()
        .await
        .context("clearing telegram webhook")?;

    // Register slash commands for autocomplete in Telegram clients.
    let commands = vec![
        BotCommand::new("createpost", "Start a mutual post exchange"),
        BotCommand::new("addchannel", "Register your channel"),
        BotCommand::new("removechannel", "Remove your channel"),
        BotCommand::new("stats", "Your channels and pending requests"),
        BotCommand::new("top", "Most active channels"),
        BotCommand::new("help", "Show available commands"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = ?bot_username, "telegram bot connected (webhook cleared)");

    let cancel = CancellationToken::new();

    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let exchange = Arc::new(ExchangeService::new(
        Arc::clone(&directory),
        Arc::clone(&requests),
        gateway,
    ));

    let state = Arc::new(BotState {
        bot: bot.clone(),
        bot_username,
        config,
        directory,
        requests,
        blocklist,
        exchange,
        cancel: cancel.clone(),
    });

    spawn_eviction_sweeper(Arc::clone(&state));

    let cancel_clone = cancel.clone();
    let poll_state = Arc::clone(&state);
    tokio::spawn(async move {
        info!("starting telegram manual polling loop");
        let mut offset: i32 = 0;

        loop {
            if cancel_clone.is_cancelled() {
                info!("telegram polling stopped");
                break;
            }

            let result = bot
                .get_updates()
                .offset(offset)
                .timeout(30)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                .await;

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                debug!(chat_id = msg.chat.id.0, "received telegram message");
                                if let Err(e) =
                                    handlers::handle_message(msg, &poll_state).await
                                {
                                    error!(error = %e, "error handling telegram message");
                                }
                            },
                            UpdateKind::CallbackQuery(query) => {
                                debug!(
                                    callback_data = ?query.data,
                                    "received telegram callback query"
                                );
                                if let Err(e) =
                                    handlers::handle_callback_query(query, &poll_state).await
                                {
                                    error!(error = %e, "error handling telegram callback query");
                                }
                            },
                            other => {
                                debug!("ignoring non-message update: {other:?}");
                            },
                        }
                    }
                },
                Err(e) => {
                    // Another instance is running with the same token.
                    let is_conflict =
                        matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates));

                    if is_conflict {
                        warn!(
                            "telegram bot disabled: another instance is already running \
                             with this token"
                        );
                        cancel_clone.cancel();
                        break;
                    }

                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                },
            }
        }
    });

    Ok(cancel)
}

/// Periodically evict negotiations that have been idle past the configured
/// TTL, so abandoned exchanges don't pin map entries forever.
fn spawn_eviction_sweeper(state: Arc<BotState>) {
    let ttl = Duration::from_secs(state.config.negotiation_ttl_secs);
    let interval = Duration::from_secs(state.config.sweep_interval_secs);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = state.cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {
                    state.exchange.evict_idle(ttl);
                },
            }
        }
    });
}
