use crosspost_common::types::UserId;

/// A channel registered with the bot, available for mutual-post exchanges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredChannel {
    /// Channel username without the leading `@`.
    pub name: String,
    pub owner_id: UserId,
    pub created_at: i64,
}

/// Persisted status of a post request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Completed,
    Declined,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit-log entry per submitted exchange.
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub id: i64,
    pub requester_id: UserId,
    pub channel: String,
    pub content_kind: String,
    pub body: String,
    pub caption: Option<String>,
    pub status: RequestStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A channel's rank entry for the /top leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStanding {
    pub channel: String,
    pub completed: i64,
}

/// A user blocked by an admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedUser {
    pub user_id: UserId,
    pub username: Option<String>,
    pub blocked_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Completed,
            RequestStatus::Declined,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("cancelled"), None);
    }
}
