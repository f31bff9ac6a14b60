//! Inline keyboard markup attached to notifications.

use serde::{Deserialize, Serialize};

/// One inline button carrying callback data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineButton {
    /// Button label.
    pub text: String,
    /// Data echoed back in the callback query.
    pub callback_data: String,
}

impl InlineButton {
    /// Button that sends `callback_data` when tapped.
    #[must_use]
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineKeyboard {
    /// Button rows, top to bottom.
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

/// Action buttons for a new-message notification.
#[must_use]
pub fn notification_keyboard(message_id: &str) -> InlineKeyboard {
    InlineKeyboard {
        inline_keyboard: vec![
            vec![
                InlineButton::new("\u{1f4ac} Reply", format!("reply_{message_id}")),
                InlineButton::new("\u{1f916} AI reply", format!("ai_{message_id}")),
            ],
            vec![
                InlineButton::new("\u{1f6ab} Ignore", format!("ignore_{message_id}")),
                InlineButton::new("\u{1f4cb} Details", format!("view_{message_id}")),
            ],
        ],
    }
}

/// Shortcut buttons shown under list and status output.
#[must_use]
pub fn overview_keyboard() -> InlineKeyboard {
    InlineKeyboard {
        inline_keyboard: vec![vec![
            InlineButton::new("\u{1f4cb} Pending", "list"),
            InlineButton::new("\u{1f4ca} Status", "status"),
            InlineButton::new("\u{2753} Help", "help"),
        ]],
    }
}
