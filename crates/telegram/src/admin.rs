//! Admin panel keyboards: block and unblock flows.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use {
    crosspost_common::types::UserId,
    crosspost_directory::BlockedUser,
};

use crate::callback::CallbackAction;

/// Entry panel shown on /admin.
pub(crate) fn panel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "🔒 Block a user",
            CallbackAction::ShowUserList.encode(),
        )],
        vec![InlineKeyboardButton::callback(
            "🔓 Unblock a user",
            CallbackAction::ShowBlockedList.encode(),
        )],
    ])
}

/// One button per known user, blocking on press.
pub(crate) fn user_list_keyboard(users: &[UserId]) -> InlineKeyboardMarkup {
    let buttons = users
        .iter()
        .map(|&user| {
            vec![InlineKeyboardButton::callback(
                format!("ID {user}"),
                CallbackAction::Block { user }.encode(),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(buttons)
}

/// One button per blocked user, unblocking on press.
pub(crate) fn blocked_list_keyboard(blocked: &[BlockedUser]) -> InlineKeyboardMarkup {
    let buttons = blocked
        .iter()
        .map(|entry| {
            let label = match &entry.username {
                Some(name) => format!("@{name} (ID {})", entry.user_id),
                None => format!("ID {}", entry.user_id),
            };
            vec![InlineKeyboardButton::callback(
                label,
                CallbackAction::Unblock {
                    user: entry.user_id,
                }
                .encode(),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(buttons)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use teloxide::types::InlineKeyboardButtonKind;

    use super::*;

    fn callback_data(kb: &InlineKeyboardMarkup) -> Vec<String> {
        kb.inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn panel_offers_block_and_unblock() {
        let tokens = callback_data(&panel_keyboard());
        assert_eq!(tokens, vec!["show_user_list", "show_blocked_user_list"]);
    }

    #[test]
    fn user_list_emits_block_tokens() {
        let tokens = callback_data(&user_list_keyboard(&[10, 20]));
        assert_eq!(tokens, vec!["block_10", "block_20"]);
    }

    #[test]
    fn blocked_list_emits_unblock_tokens_with_usernames() {
        let blocked = vec![
            BlockedUser {
                user_id: 10,
                username: Some("spammer".into()),
                blocked_at: 0,
            },
            BlockedUser {
                user_id: 20,
                username: None,
                blocked_at: 0,
            },
        ];
        let kb = blocked_list_keyboard(&blocked);
        assert_eq!(callback_data(&kb), vec!["unblock_10", "unblock_20"]);
        let first_label = &kb.inline_keyboard[0][0].text;
        assert!(first_label.contains("@spammer"));
    }
}
