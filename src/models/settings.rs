//! Per-account AI settings, reply templates, channels, and item metadata.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// AI reply configuration for one seller account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiSettings {
    /// Seller account identifier.
    pub cookie_id: String,
    /// Whether AI replies are enabled.
    pub ai_enabled: bool,
    /// Model name; `custom` (and aliases) selects the app-completion convention.
    pub model_name: String,
    /// Backend credential.
    pub api_key: String,
    /// Backend endpoint.
    pub base_url: String,
    /// Upper bound on the discount percentage the model may offer.
    pub max_discount_percent: u32,
    /// Upper bound on the absolute discount the model may offer.
    pub max_discount_amount: u32,
    /// Bargaining rounds allowed before the fixed refusal.
    pub max_bargain_rounds: u32,
    /// Prompt overrides keyed by `classify`, `price`, `tech`, `default`.
    pub custom_prompts: HashMap<String, String>,
}

impl AiSettings {
    /// Disabled settings used when an account has no stored row.
    #[must_use]
    pub fn disabled(cookie_id: &str) -> Self {
        Self {
            cookie_id: cookie_id.to_owned(),
            ai_enabled: false,
            model_name: "qwen-plus".into(),
            api_key: String::new(),
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".into(),
            max_discount_percent: 10,
            max_discount_amount: 100,
            max_bargain_rounds: 3,
            custom_prompts: HashMap::new(),
        }
    }

    /// Whether the account can call a backend at all.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.ai_enabled && !self.api_key.is_empty()
    }

    /// The configured override for `key`, if non-empty.
    #[must_use]
    pub fn prompt_override(&self, key: &str) -> Option<&str> {
        self.custom_prompts
            .get(key)
            .map(String::as_str)
            .filter(|p| !p.trim().is_empty())
    }

    /// API key reduced to its last four characters for logging.
    #[must_use]
    pub fn masked_key(&self) -> String {
        let tail: String = self
            .api_key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("***{tail}")
    }
}

/// Canned reply keyed by name for one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyTemplate {
    /// Seller account identifier.
    pub cookie_id: String,
    /// Template name the operator refers to.
    pub keyword: String,
    /// Reply text.
    pub reply_content: String,
}

/// Operator notification destination registered by a platform user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationChannel {
    /// Row identifier.
    pub id: i64,
    /// Platform user who owns the channel.
    pub user_id: String,
    /// Channel kind; only `telegram` is routed here.
    pub channel_type: String,
    /// Telegram chat identifier.
    pub chat_id: i64,
}

/// Item metadata used to ground AI replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemInfo {
    /// Listing title.
    pub title: String,
    /// Listing price.
    pub price: f64,
    /// Listing description.
    pub description: String,
}

impl ItemInfo {
    /// Placeholder used when the item is unknown.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            title: "Item details unavailable".into(),
            price: 0.0,
            description: "No description".into(),
        }
    }
}

/// Parse a display price such as `¥1,299.00` into a number.
///
/// Everything except digits and `.` is discarded; unparsable input yields 0.
#[must_use]
pub fn parse_price(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}
