use serde::{Deserialize, Serialize};

/// A Telegram user identity.
pub type UserId = i64;

/// Content of a mutual post, submitted by either side of an exchange.
///
/// Telegram photos are referenced by their server-side file ID; the bot never
/// downloads or re-uploads image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostContent {
    Text { body: String },
    Photo { file_id: String, caption: String },
}

impl PostContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn photo(file_id: impl Into<String>, caption: impl Into<String>) -> Self {
        Self::Photo {
            file_id: file_id.into(),
            caption: caption.into(),
        }
    }

    /// Stable tag used for persistence.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Photo { .. } => "photo",
        }
    }

    /// The human-readable part: the text body or the photo caption.
    pub fn body(&self) -> &str {
        match self {
            Self::Text { body } => body,
            Self::Photo { caption, .. } => caption,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags() {
        assert_eq!(PostContent::text("hi").kind(), "text");
        assert_eq!(PostContent::photo("f1", "cap").kind(), "photo");
    }

    #[test]
    fn body_is_text_or_caption() {
        assert_eq!(PostContent::text("hello").body(), "hello");
        assert_eq!(PostContent::photo("f1", "cap").body(), "cap");
    }

    #[test]
    fn serde_roundtrip() {
        let content = PostContent::photo("AgACAgI", "promo");
        let json = serde_json::to_string(&content).expect("serialize");
        let back: PostContent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, content);
    }
}
