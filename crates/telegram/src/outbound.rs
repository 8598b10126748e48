use std::{future::Future, time::Duration};

use {
    anyhow::Result,
    async_trait::async_trait,
    teloxide::{
        RequestError,
        payloads::{SendMessageSetters, SendPhotoSetters},
        prelude::*,
        types::{
            ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode, Recipient,
        },
    },
    tracing::warn,
};

use {
    crosspost_common::types::{PostContent, UserId},
    crosspost_exchange::PostGateway,
};

use crate::callback::CallbackAction;

const RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Longest content preview embedded in an approval card.
const PREVIEW_MAX_CHARS: usize = 500;

/// `PostGateway` implementation on the Telegram Bot API.
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Run a Telegram request, waiting out RetryAfter rate limits up to a
    /// bounded number of retries.
    async fn run_request_with_retry<T, F, Fut>(
        &self,
        to: &str,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            to,
                            operation,
                            retries,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        to,
                        operation,
                        retries,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }

    /// Send a text message as HTML, falling back to plain text when Telegram
    /// rejects the markup.
    async fn send_text_with_fallback(
        &self,
        recipient: Recipient,
        label: &str,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> std::result::Result<(), RequestError> {
        let html = self
            .run_request_with_retry(label, "send message (html)", || {
                let mut req = self
                    .bot
                    .send_message(recipient.clone(), text)
                    .parse_mode(ParseMode::Html);
                if let Some(kb) = markup.clone() {
                    req = req.reply_markup(kb);
                }
                async move { req.await }
            })
            .await;

        match html {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(to = label, error = %e, "telegram HTML send failed, retrying as plain text");
                self.run_request_with_retry(label, "send message (plain)", || {
                    let mut req = self.bot.send_message(recipient.clone(), text);
                    if let Some(kb) = markup.clone() {
                        req = req.reply_markup(kb);
                    }
                    async move { req.await }
                })
                .await
                .map(|_| ())
            },
        }
    }

    async fn send_photo_by_file_id(
        &self,
        recipient: Recipient,
        label: &str,
        file_id: &str,
        caption: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> std::result::Result<(), RequestError> {
        self.run_request_with_retry(label, "send photo", || {
            let mut req = self
                .bot
                .send_photo(recipient.clone(), InputFile::file_id(file_id));
            if !caption.is_empty() {
                req = req.caption(caption);
            }
            if let Some(kb) = markup.clone() {
                req = req.reply_markup(kb);
            }
            async move { req.await }
        })
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl PostGateway for TelegramGateway {
    async fn send_user(&self, user: UserId, text: &str) -> Result<()> {
        self.send_text_with_fallback(Recipient::Id(ChatId(user)), "user dm", text, None)
            .await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, content: &PostContent) -> Result<()> {
        let recipient = channel_recipient(channel);
        match content {
            PostContent::Text { body } => {
                self.send_text_with_fallback(recipient, channel, body, None)
                    .await?;
            },
            PostContent::Photo { file_id, caption } => {
                self.send_photo_by_file_id(recipient, channel, file_id, caption, None)
                    .await?;
            },
        }
        Ok(())
    }

    async fn send_approval_request(
        &self,
        owner: UserId,
        channel: &str,
        requester: UserId,
        content: &PostContent,
    ) -> Result<()> {
        let recipient = Recipient::Id(ChatId(owner));
        let keyboard = approval_keyboard(channel, requester);

        match content {
            PostContent::Text { .. } => {
                let card = approval_card(channel, content);
                self.send_text_with_fallback(recipient, "owner dm", &card, Some(keyboard))
                    .await?;
            },
            // For photo requests the owner sees the actual photo; the card
            // text rides along as the caption.
            PostContent::Photo { file_id, .. } => {
                let card = approval_card(channel, content);
                self.send_photo_by_file_id(recipient, "owner dm", file_id, &card, Some(keyboard))
                    .await?;
            },
        }
        Ok(())
    }
}

fn channel_recipient(channel: &str) -> Recipient {
    Recipient::ChannelUsername(format!("@{channel}"))
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

/// Accept/Decline controls shown under an approval request.
pub(crate) fn approval_keyboard(channel: &str, requester: UserId) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            "✅ Accept",
            CallbackAction::Confirm {
                channel: channel.to_string(),
                requester,
            }
            .encode(),
        ),
        InlineKeyboardButton::callback(
            "❌ Decline",
            CallbackAction::Decline {
                channel: channel.to_string(),
                requester,
            }
            .encode(),
        ),
    ]])
}

/// HTML card describing an incoming mutual-post request.
fn approval_card(channel: &str, content: &PostContent) -> String {
    let preview = truncate_chars(content.body(), PREVIEW_MAX_CHARS);
    let mut card = format!(
        "<b>📨 Mutual post request</b>\n\n\
         Someone wants this published in <b>@{}</b> and offers a post back in return.",
        escape_html(channel)
    );
    if !preview.is_empty() {
        card.push_str(&format!("\n\n<blockquote>{}</blockquote>", escape_html(&preview)));
    }
    card
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}…")
}
