//! Aggregated message statistics for the `stats` command.

use serde::Serialize;

/// Per-status counts for one channel.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    /// Records still awaiting action.
    pub pending: u64,
    /// Records answered.
    pub replied: u64,
    /// Records ignored.
    pub ignored: u64,
}

impl StatusCounts {
    /// Sum across all statuses.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.pending + self.replied + self.ignored
    }
}

/// Message count for one calendar day.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailyCount {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Records created that day.
    pub count: u64,
}

/// One of the most active buyers in the window.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopSender {
    /// Buyer display name.
    pub sender_name: String,
    /// Records from this buyer.
    pub message_count: u64,
    /// Share of this buyer's records that were replied to, in percent.
    pub reply_rate: f64,
}

/// Full statistics for a channel over a day window.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MessageStats {
    /// Window length in days.
    pub days: u32,
    /// Per-status counts.
    pub counts: StatusCounts,
    /// Replied share of all records, in percent with one decimal.
    pub reply_rate: f64,
    /// Replies sent from AI suggestions.
    pub ai_replies: u64,
    /// Replies typed by the operator.
    pub manual_replies: u64,
    /// Replies sent from templates.
    pub template_replies: u64,
    /// Records ignored in bulk.
    pub batch_ignored: u64,
    /// Mean minutes between creation and resolution of replied records.
    pub avg_response_minutes: f64,
    /// Most active buyers, at most five.
    pub top_senders: Vec<TopSender>,
    /// Daily counts, most recent first.
    pub daily: Vec<DailyCount>,
}
