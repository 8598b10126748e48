use std::sync::Arc;

use {
    teloxide::{
        payloads::SendMessageSetters,
        prelude::*,
        types::{
            CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MediaKind,
            MessageKind, ParseMode, Recipient,
        },
    },
    tracing::{debug, info, warn},
};

use {
    crosspost_common::types::{PostContent, UserId},
    crosspost_directory::{ChannelStanding, RegisteredChannel},
    crosspost_exchange::{ApproveOutcome, DeclineOutcome, SelectOutcome, SubmitOutcome},
};

use crate::{
    access::{self, AccessDenied},
    admin,
    callback::CallbackAction,
    outbound::escape_html,
    state::BotState,
};

/// How many channels the /top leaderboard shows.
const TOP_LIMIT: u32 = 10;

/// Handle a single inbound message (called from the polling loop).
///
/// Only private chats are served; everything in a DM is either a command or
/// post content for the current exchange.
pub async fn handle_message(msg: Message, state: &Arc<BotState>) -> anyhow::Result<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let user = from.id.0 as i64;
    let chat = msg.chat.id;
    let bot = state.bot.clone();

    let Some(content) = extract_content(&msg) else {
        debug!(user, "ignoring message without text or photo");
        return Ok(());
    };

    // Gate everything, commands and content alike.
    if let Err(denied) = access::check_access(state, user).await? {
        debug!(user, %denied, "access denied");
        match denied {
            AccessDenied::Blocked => {
                send_html(&bot, chat, "⛔ You are blocked and cannot use this bot.").await;
            },
            AccessDenied::NotSubscribed { channel } => {
                let text = format!(
                    "To use the bot, subscribe to <b>@{}</b> first, then press the button below.",
                    escape_html(&channel)
                );
                send_with_keyboard(&bot, chat, &text, subscription_keyboard()).await;
            },
        }
        return Ok(());
    }

    if let PostContent::Text { body } = &content
        && body.starts_with('/')
    {
        return dispatch_command(&bot, state, user, chat, body).await;
    }

    // Anything else is post content for the current negotiation.
    let outcome = state.exchange.submit_content(user, content).await?;
    send_html(&bot, chat, &render_submit_outcome(&outcome)).await;
    Ok(())
}

async fn dispatch_command(
    bot: &Bot,
    state: &Arc<BotState>,
    user: UserId,
    chat: ChatId,
    text: &str,
) -> anyhow::Result<()> {
    let (cmd, arg) = parse_command(text);
    info!(user, cmd, "handling command");

    match cmd {
        "/start" | "/help" => send_html(bot, chat, HELP_TEXT).await,
        "/createpost" => {
            let owned = state.directory.list_owned(user).await?;
            let mut targets = Vec::new();
            if !owned.is_empty() {
                for channel in state.directory.list_registered().await? {
                    let subscribers = bot
                        .get_chat_member_count(Recipient::ChannelUsername(format!(
                            "@{}",
                            channel.name
                        )))
                        .await
                        .ok();
                    targets.push((channel, subscribers));
                }
            }
            match createpost_prompt(&owned, &targets) {
                CreatePostPrompt::NeedOwnChannel => {
                    send_html(
                        bot,
                        chat,
                        "You have no registered channels, so there is nowhere for the \
                         return post to go. Add yours with /addchannel @name first.",
                    )
                    .await;
                },
                CreatePostPrompt::NoTargets => {
                    send_html(
                        bot,
                        chat,
                        "No channels are registered yet. Owners can add one with /addchannel @name.",
                    )
                    .await;
                },
                CreatePostPrompt::Picker(keyboard) => {
                    send_with_keyboard(
                        bot,
                        chat,
                        "Choose a channel for your mutual post:",
                        keyboard,
                    )
                    .await;
                },
            }
        },
        "/addchannel" => add_channel(bot, state, user, chat, arg).await?,
        "/removechannel" => remove_channel(bot, state, user, chat, arg).await?,
        "/stats" => {
            let owned = state.directory.list_owned(user).await?;
            let pending = state.requests.pending_for(user).await?;
            send_html(bot, chat, &stats_card(&owned, pending.len())).await;
        },
        "/top" => {
            let standings = state.requests.top_channels(TOP_LIMIT).await?;
            let mut rows = Vec::with_capacity(standings.len());
            for standing in standings {
                let subscribers = bot
                    .get_chat_member_count(Recipient::ChannelUsername(format!(
                        "@{}",
                        standing.channel
                    )))
                    .await
                    .ok();
                rows.push((standing, subscribers));
            }
            send_html(bot, chat, &top_card(&rows)).await;
        },
        "/admin" => {
            if state.config.is_admin(user) {
                send_with_keyboard(bot, chat, "Admin panel:", admin::panel_keyboard()).await;
            } else {
                send_html(bot, chat, "You do not have access to this function.").await;
            }
        },
        _ => send_html(bot, chat, "Unknown command. See /help.").await,
    }
    Ok(())
}

async fn add_channel(
    bot: &Bot,
    state: &Arc<BotState>,
    user: UserId,
    chat: ChatId,
    arg: Option<&str>,
) -> anyhow::Result<()> {
    let Some(name) = arg.map(normalize_channel).filter(|n| !n.is_empty()) else {
        send_html(bot, chat, "Usage: <code>/addchannel @channelname</code>").await;
        return Ok(());
    };

    match state.directory.resolve_owner(&name).await? {
        Some(owner) if owner == user => {
            send_html(
                bot,
                chat,
                &format!("@{} is already registered to you.", escape_html(&name)),
            )
            .await;
            return Ok(());
        },
        Some(_) => {
            send_html(
                bot,
                chat,
                &format!(
                    "@{} is already registered by another user.",
                    escape_html(&name)
                ),
            )
            .await;
            return Ok(());
        },
        None => {},
    }

    if !access::bot_can_post(bot, &name).await? {
        send_html(
            bot,
            chat,
            &format!(
                "I can't post in <b>@{}</b>. Add me to the channel as an administrator \
                 with permission to post messages, then try again.",
                escape_html(&name)
            ),
        )
        .await;
        return Ok(());
    }

    state.directory.register(&name, user).await?;
    info!(user, channel = %name, "channel registered");
    send_html(
        bot,
        chat,
        &format!(
            "✅ <b>@{}</b> registered. Start an exchange with /createpost.",
            escape_html(&name)
        ),
    )
    .await;
    Ok(())
}

async fn remove_channel(
    bot: &Bot,
    state: &Arc<BotState>,
    user: UserId,
    chat: ChatId,
    arg: Option<&str>,
) -> anyhow::Result<()> {
    let Some(name) = arg.map(normalize_channel).filter(|n| !n.is_empty()) else {
        send_html(bot, chat, "Usage: <code>/removechannel @channelname</code>").await;
        return Ok(());
    };

    if state.directory.unregister(&name, user).await? {
        info!(user, channel = %name, "channel unregistered");
        send_html(
            bot,
            chat,
            &format!("<b>@{}</b> removed.", escape_html(&name)),
        )
        .await;
    } else {
        send_html(
            bot,
            chat,
            &format!(
                "@{} is not registered to you.",
                escape_html(&name)
            ),
        )
        .await;
    }
    Ok(())
}

/// Handle a callback query from any inline keyboard the bot has sent.
pub async fn handle_callback_query(
    query: CallbackQuery,
    state: &Arc<BotState>,
) -> anyhow::Result<()> {
    let bot = state.bot.clone();
    let Some(action) = query.data.as_deref().and_then(CallbackAction::parse) else {
        debug!(data = ?query.data, "ignoring unknown callback token");
        let _ = bot.answer_callback_query(&query.id).await;
        return Ok(());
    };
    let user = query.from.id.0 as i64;
    // Where the pressed keyboard lives, for prompt deletion.
    let origin = query.message.as_ref().map(|m| (m.chat().id, m.id()));

    if state.blocklist.is_blocked(user).await? {
        let _ = bot
            .answer_callback_query(&query.id)
            .text("You are blocked.")
            .await;
        return Ok(());
    }

    match action {
        CallbackAction::SelectChannel { channel } => {
            let outcome = state.exchange.select_channel(user, &channel).await?;
            let _ = bot.answer_callback_query(&query.id).await;
            if matches!(outcome, SelectOutcome::Selected { .. })
                && let Some((chat, msg_id)) = origin
            {
                // The picker is stale once a channel is chosen.
                let _ = bot.delete_message(chat, msg_id).await;
            }
            send_html(&bot, ChatId(user), &render_select_outcome(&outcome)).await;
        },
        CallbackAction::Confirm { channel, requester } => {
            let outcome = state.exchange.approve(user, requester, &channel).await?;
            let _ = bot.answer_callback_query(&query.id).await;
            // A decided (or vanished) request makes the prompt stale; a
            // failed publish keeps it so the owner can press Accept again.
            if !matches!(outcome, ApproveOutcome::PublishFailed { .. })
                && let Some((chat, msg_id)) = origin
            {
                let _ = bot.delete_message(chat, msg_id).await;
            }
            send_html(&bot, ChatId(user), &render_approve_outcome(&outcome)).await;
        },
        CallbackAction::Decline { channel, requester } => {
            let DeclineOutcome::Declined { channel } =
                state.exchange.decline(user, requester, &channel).await?;
            let _ = bot.answer_callback_query(&query.id).await;
            if let Some((chat, msg_id)) = origin {
                let _ = bot.delete_message(chat, msg_id).await;
            }
            send_html(
                &bot,
                ChatId(user),
                &format!(
                    "Declined the request for <b>@{}</b>.",
                    escape_html(&channel)
                ),
            )
            .await;
        },
        CallbackAction::CheckSubscription => {
            let Some(channel) = state.config.required_channel.clone() else {
                let _ = bot
                    .answer_callback_query(&query.id)
                    .text("No subscription required.")
                    .await;
                return Ok(());
            };
            if access::is_subscribed(&bot, &channel, user).await {
                let _ = bot
                    .answer_callback_query(&query.id)
                    .text("Subscription confirmed ✅")
                    .await;
                if let Some((chat, msg_id)) = origin {
                    let _ = bot.delete_message(chat, msg_id).await;
                }
                send_html(&bot, ChatId(user), "You're all set. See /help to get started.").await;
            } else {
                let _ = bot
                    .answer_callback_query(&query.id)
                    .text("You are not subscribed yet.")
                    .await;
            }
        },
        CallbackAction::ShowUserList => {
            if !require_admin(&bot, &query, state, user).await {
                return Ok(());
            }
            let users = state.directory.list_owners().await?;
            let _ = bot.answer_callback_query(&query.id).await;
            if users.is_empty() {
                send_html(&bot, ChatId(user), "No known users to block.").await;
            } else {
                send_with_keyboard(
                    &bot,
                    ChatId(user),
                    "Select a user to block:",
                    admin::user_list_keyboard(&users),
                )
                .await;
            }
        },
        CallbackAction::ShowBlockedList => {
            if !require_admin(&bot, &query, state, user).await {
                return Ok(());
            }
            let blocked = state.blocklist.list().await?;
            let _ = bot.answer_callback_query(&query.id).await;
            if blocked.is_empty() {
                send_html(&bot, ChatId(user), "No blocked users.").await;
            } else {
                send_with_keyboard(
                    &bot,
                    ChatId(user),
                    "Select a user to unblock:",
                    admin::blocked_list_keyboard(&blocked),
                )
                .await;
            }
        },
        CallbackAction::Block { user: target } => {
            if !require_admin(&bot, &query, state, user).await {
                return Ok(());
            }
            state.blocklist.block(target, None).await?;
            info!(admin = user, target, "user blocked");
            let _ = bot.answer_callback_query(&query.id).await;
            if let Some((chat, msg_id)) = origin {
                let _ = bot.delete_message(chat, msg_id).await;
            }
            let _ = bot
                .send_message(
                    ChatId(target),
                    "You have been blocked and can no longer use this bot.",
                )
                .await;
            send_html(&bot, ChatId(user), &format!("User {target} blocked.")).await;
        },
        CallbackAction::Unblock { user: target } => {
            if !require_admin(&bot, &query, state, user).await {
                return Ok(());
            }
            let was_blocked = state.blocklist.unblock(target).await?;
            info!(admin = user, target, was_blocked, "user unblocked");
            let _ = bot.answer_callback_query(&query.id).await;
            if let Some((chat, msg_id)) = origin {
                let _ = bot.delete_message(chat, msg_id).await;
            }
            if was_blocked {
                let _ = bot
                    .send_message(ChatId(target), "You can use this bot again.")
                    .await;
                send_html(&bot, ChatId(user), &format!("User {target} unblocked.")).await;
            } else {
                send_html(&bot, ChatId(user), &format!("User {target} was not blocked.")).await;
            }
        },
    }
    Ok(())
}

/// Answer with a refusal toast unless the presser is a configured admin.
async fn require_admin(
    bot: &Bot,
    query: &CallbackQuery,
    state: &Arc<BotState>,
    user: UserId,
) -> bool {
    if state.config.is_admin(user) {
        return true;
    }
    let _ = bot
        .answer_callback_query(&query.id)
        .text("You do not have access to this function.")
        .await;
    false
}

const HELP_TEXT: &str = "\
<b>🤝 Crosspost</b> arranges mutual posts between channel owners.

<b>How it works</b>
1. Pick a channel with /createpost and send your post.
2. The owner reviews it; on approval it is published.
3. The owner then sends their post back into your channel.

<b>Commands</b>
/createpost — start a mutual post
/addchannel @name — register your channel
/removechannel @name — remove your channel
/stats — your channels and pending requests
/top — most active channels";

/// Split a command message into the command word (bot-name suffix stripped)
/// and its first argument.
fn parse_command(text: &str) -> (&str, Option<&str>) {
    let mut parts = text.split_whitespace();
    let raw = parts.next().unwrap_or("");
    let cmd = raw.split('@').next().unwrap_or(raw);
    (cmd, parts.next())
}

fn normalize_channel(arg: &str) -> String {
    arg.trim_start_matches('@').to_string()
}

/// Extract exchangeable content from a message: plain text, or a photo
/// (largest size) with its caption.
fn extract_content(msg: &Message) -> Option<PostContent> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Text(t) => Some(PostContent::text(t.text.clone())),
            MediaKind::Photo(p) => p.photo.last().map(|size| {
                PostContent::photo(
                    size.file.id.clone(),
                    p.caption.clone().unwrap_or_default(),
                )
            }),
            _ => None,
        },
        _ => None,
    }
}

/// What /createpost should answer. The requester needs a channel of their own
/// for the reverse leg, and there must be at least one channel to pick.
enum CreatePostPrompt {
    NeedOwnChannel,
    NoTargets,
    Picker(InlineKeyboardMarkup),
}

fn createpost_prompt(
    owned: &[String],
    targets: &[(RegisteredChannel, Option<u32>)],
) -> CreatePostPrompt {
    if owned.is_empty() {
        return CreatePostPrompt::NeedOwnChannel;
    }
    if targets.is_empty() {
        return CreatePostPrompt::NoTargets;
    }
    CreatePostPrompt::Picker(picker_keyboard(targets))
}

/// One button per registered channel, selecting it for an exchange. The
/// subscriber count is best-effort and omitted when it could not be fetched.
fn picker_keyboard(channels: &[(RegisteredChannel, Option<u32>)]) -> InlineKeyboardMarkup {
    let buttons = channels
        .iter()
        .map(|(c, subscribers)| {
            let label = match subscribers {
                Some(count) => format!("@{} · {count} subscribers", c.name),
                None => format!("@{}", c.name),
            };
            vec![InlineKeyboardButton::callback(
                label,
                CallbackAction::SelectChannel {
                    channel: c.name.clone(),
                }
                .encode(),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(buttons)
}

fn subscription_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ I subscribed",
        CallbackAction::CheckSubscription.encode(),
    )]])
}

/// Personal stats as an HTML card.
fn stats_card(owned: &[String], pending: usize) -> String {
    let channels_section = if owned.is_empty() {
        "  <i>none registered</i>".to_string()
    } else {
        owned
            .iter()
            .enumerate()
            .map(|(i, name)| format!("  {}. @{}", i + 1, escape_html(name)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "\
<b>📊 Your channels</b>

<blockquote>{channels_section}</blockquote>

<code>Pending requests  {pending}</code>

Add a channel with /addchannel, start an exchange with /createpost."
    )
}

/// The /top leaderboard as an HTML card. `subscribers` is best-effort and
/// omitted when the count could not be fetched.
fn top_card(rows: &[(ChannelStanding, Option<u32>)]) -> String {
    if rows.is_empty() {
        return "No completed exchanges yet. Be the first: /createpost".to_string();
    }

    let mut lines = Vec::with_capacity(rows.len());
    for (i, (standing, subscribers)) in rows.iter().enumerate() {
        let rank = match i {
            0 => "🥇".to_string(),
            1 => "🥈".to_string(),
            2 => "🥉".to_string(),
            n => format!("{}.", n + 1),
        };
        let subs = match subscribers {
            Some(count) => format!(" · {count} subscribers"),
            None => String::new(),
        };
        lines.push(format!(
            "{rank} @{} — {} exchanges{subs}",
            escape_html(&standing.channel),
            standing.completed
        ));
    }

    format!("<b>🏆 Top channels</b>\n\n{}", lines.join("\n"))
}

fn render_select_outcome(outcome: &SelectOutcome) -> String {
    match outcome {
        SelectOutcome::Selected { channel } => format!(
            "Send the post you want published in <b>@{}</b> (text or a photo with a caption).",
            escape_html(channel)
        ),
        SelectOutcome::SelfTarget { channel } => format!(
            "@{} is your own channel. Pick someone else's channel to exchange with.",
            escape_html(channel)
        ),
        SelectOutcome::UnknownChannel { channel } => {
            format!("@{} is not registered.", escape_html(channel))
        },
    }
}

fn render_submit_outcome(outcome: &SubmitOutcome) -> String {
    match outcome {
        SubmitOutcome::Forwarded { channel } => format!(
            "Your post was sent to the owner of <b>@{}</b> for approval. \
             You'll hear back once they decide.",
            escape_html(channel)
        ),
        SubmitOutcome::ReverseCompleted { channel } => format!(
            "✅ Your post is published in <b>@{}</b>. The exchange is complete.",
            escape_html(channel)
        ),
        SubmitOutcome::NoActiveRequest => {
            "No exchange in progress. Use /createpost to pick a channel first.".to_string()
        },
        SubmitOutcome::OwnerNotFound { channel } => {
            format!("@{} is no longer registered.", escape_html(channel))
        },
        SubmitOutcome::DeliveryFailed { channel } => format!(
            "Couldn't deliver your post for <b>@{}</b>. Send it again to retry.",
            escape_html(channel)
        ),
    }
}

fn render_approve_outcome(outcome: &ApproveOutcome) -> String {
    match outcome {
        ApproveOutcome::Approved {
            channel,
            reverse_channel: Some(reverse),
        } => format!(
            "✅ Published in <b>@{}</b>. Now send the post you want published \
             in <b>@{}</b> — it will go out right away.",
            escape_html(channel),
            escape_html(reverse)
        ),
        ApproveOutcome::Approved {
            channel,
            reverse_channel: None,
        } => format!(
            "✅ Published in <b>@{}</b>. The requester has no registered \
             channel, so no return post is needed.",
            escape_html(channel)
        ),
        ApproveOutcome::NoPendingRequest => "This request is no longer active.".to_string(),
        ApproveOutcome::PublishFailed { channel } => format!(
            "Publishing to <b>@{}</b> failed. Press Accept again to retry.",
            escape_html(channel)
        ),
    }
}

async fn send_html(bot: &Bot, chat: ChatId, text: &str) {
    let sent = bot
        .send_message(chat, text)
        .parse_mode(ParseMode::Html)
        .await;
    if let Err(e) = sent {
        warn!(chat = chat.0, error = %e, "HTML send failed, retrying as plain text");
        if let Err(e) = bot.send_message(chat, text).await {
            warn!(chat = chat.0, error = %e, "failed to send message");
        }
    }
}

async fn send_with_keyboard(bot: &Bot, chat: ChatId, text: &str, keyboard: InlineKeyboardMarkup) {
    let sent = bot
        .send_message(chat, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard.clone())
        .await;
    if let Err(e) = sent {
        warn!(chat = chat.0, error = %e, "keyboard send failed, retrying as plain text");
        if let Err(e) = bot.send_message(chat, text).reply_markup(keyboard).await {
            warn!(chat = chat.0, error = %e, "failed to send keyboard message");
        }
    }
}
