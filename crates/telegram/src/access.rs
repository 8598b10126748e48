use teloxide::{
    prelude::*,
    types::{ChatMemberKind, Recipient},
};

use crosspost_common::types::UserId;

use crate::state::BotState;

/// Reason a user was refused service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    Blocked,
    NotSubscribed { channel: String },
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocked => write!(f, "user is blocked"),
            Self::NotSubscribed { channel } => {
                write!(f, "user is not subscribed to @{channel}")
            },
        }
    }
}

/// Determine if a user may interact with the bot: not blocked, and (when a
/// required channel is configured) subscribed to it. Admins skip the
/// subscription check.
pub async fn check_access(
    state: &BotState,
    user: UserId,
) -> anyhow::Result<Result<(), AccessDenied>> {
    if state.blocklist.is_blocked(user).await? {
        return Ok(Err(AccessDenied::Blocked));
    }
    if let Some(channel) = &state.config.required_channel
        && !state.config.is_admin(user)
        && !is_subscribed(&state.bot, channel, user).await
    {
        return Ok(Err(AccessDenied::NotSubscribed {
            channel: channel.clone(),
        }));
    }
    Ok(Ok(()))
}

/// Membership check against the required channel. API failures (bot not in
/// the channel, user never seen) count as not subscribed.
pub async fn is_subscribed(bot: &Bot, channel: &str, user: UserId) -> bool {
    let recipient = Recipient::ChannelUsername(format!("@{channel}"));
    match bot
        .get_chat_member(recipient, UserId(user as u64))
        .await
    {
        Ok(member) => matches!(
            member.kind,
            ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_) | ChatMemberKind::Member
        ),
        Err(_) => false,
    }
}

/// Whether the bot itself can post into `channel`. Used by /addchannel to
/// refuse registrations the bot could never serve.
pub async fn bot_can_post(bot: &Bot, channel: &str) -> crate::error::Result<bool> {
    let me = bot.get_me().await?;
    let recipient = Recipient::ChannelUsername(format!("@{channel}"));
    let member = match bot.get_chat_member(recipient, me.id).await {
        Ok(m) => m,
        // Unknown channel or bot not a member.
        Err(_) => return Ok(false),
    };
    Ok(match member.kind {
        ChatMemberKind::Owner(_) => true,
        ChatMemberKind::Administrator(admin) => admin.can_post_messages,
        _ => false,
    })
}
