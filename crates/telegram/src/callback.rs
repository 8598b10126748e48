use crosspost_common::types::UserId;

/// Typed form of the callback tokens carried in inline keyboard buttons.
///
/// Raw tokens exist only here: buttons are built from `encode()` and inbound
/// callback data goes through `parse()` before it reaches any handler logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Requester picked a target channel from the /createpost keyboard.
    SelectChannel { channel: String },
    /// Owner accepted a pending request.
    Confirm { channel: String, requester: UserId },
    /// Owner rejected a pending request.
    Decline { channel: String, requester: UserId },
    /// User asks to re-check the required-channel subscription.
    CheckSubscription,
    /// Admin panel: list users available for blocking.
    ShowUserList,
    /// Admin panel: list currently blocked users.
    ShowBlockedList,
    Block { user: UserId },
    Unblock { user: UserId },
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            Self::SelectChannel { channel } => format!("select_channel_{channel}"),
            Self::Confirm { channel, requester } => format!("confirm_{channel}_{requester}"),
            Self::Decline { channel, requester } => format!("decline_{channel}_{requester}"),
            Self::CheckSubscription => "check_subscription".to_string(),
            Self::ShowUserList => "show_user_list".to_string(),
            Self::ShowBlockedList => "show_blocked_user_list".to_string(),
            Self::Block { user } => format!("block_{user}"),
            Self::Unblock { user } => format!("unblock_{user}"),
        }
    }

    /// Decode a raw callback token. Unknown or malformed tokens yield `None`
    /// and are ignored by the caller.
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "check_subscription" => return Some(Self::CheckSubscription),
            "show_user_list" => return Some(Self::ShowUserList),
            "show_blocked_user_list" => return Some(Self::ShowBlockedList),
            _ => {},
        }
        if let Some(channel) = data.strip_prefix("select_channel_") {
            return (!channel.is_empty()).then(|| Self::SelectChannel {
                channel: channel.to_string(),
            });
        }
        if let Some(rest) = data.strip_prefix("confirm_") {
            return parse_channel_user(rest)
                .map(|(channel, requester)| Self::Confirm { channel, requester });
        }
        if let Some(rest) = data.strip_prefix("decline_") {
            return parse_channel_user(rest)
                .map(|(channel, requester)| Self::Decline { channel, requester });
        }
        // "unblock_" must be tried before "block_".
        if let Some(id) = data.strip_prefix("unblock_") {
            return id.parse().ok().map(|user| Self::Unblock { user });
        }
        if let Some(id) = data.strip_prefix("block_") {
            return id.parse().ok().map(|user| Self::Block { user });
        }
        None
    }
}

/// Split `<channel>_<user_id>` from the right, since channel usernames may
/// themselves contain underscores while user IDs never do.
fn parse_channel_user(rest: &str) -> Option<(String, UserId)> {
    let (channel, id) = rest.rsplit_once('_')?;
    if channel.is_empty() {
        return None;
    }
    id.parse().ok().map(|user| (channel.to_string(), user))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CallbackAction::SelectChannel { channel: "rustnews".into() })]
    #[case(CallbackAction::Confirm { channel: "rustnews".into(), requester: 42 })]
    #[case(CallbackAction::Decline { channel: "my_channel".into(), requester: 9000 })]
    #[case(CallbackAction::CheckSubscription)]
    #[case(CallbackAction::ShowUserList)]
    #[case(CallbackAction::ShowBlockedList)]
    #[case(CallbackAction::Block { user: 7 })]
    #[case(CallbackAction::Unblock { user: 7 })]
    fn encode_parse_roundtrip(#[case] action: CallbackAction) {
        assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
    }

    #[test]
    fn channel_names_with_underscores_split_from_the_right() {
        let parsed = CallbackAction::parse("confirm_my_channel_name_123").unwrap();
        assert_eq!(parsed, CallbackAction::Confirm {
            channel: "my_channel_name".into(),
            requester: 123,
        });
    }

    #[rstest]
    #[case("")]
    #[case("select_channel_")]
    #[case("confirm_nouser")]
    #[case("confirm__42")]
    #[case("decline_chan_notanumber")]
    #[case("block_abc")]
    #[case("something_else")]
    fn malformed_tokens_are_rejected(#[case] data: &str) {
        assert_eq!(CallbackAction::parse(data), None);
    }

    #[test]
    fn unblock_is_not_misread_as_block() {
        assert_eq!(
            CallbackAction::parse("unblock_5"),
            Some(CallbackAction::Unblock { user: 5 })
        );
    }
}
