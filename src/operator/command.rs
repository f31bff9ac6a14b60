//! Operator command grammar.
//!
//! Text is matched against an ordered table of patterns; the first match
//! wins. Keywords are case-insensitive and the `#` before an identifier is
//! optional.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Default `stats` window in days.
pub const DEFAULT_STATS_DAYS: u32 = 7;

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Deliver `text` verbatim.
    Reply {
        /// Target record.
        id: String,
        /// Reply body.
        text: String,
    },
    /// Generate an AI suggestion without sending it.
    Ai {
        /// Target record.
        id: String,
    },
    /// Send the AI suggestion.
    Confirm {
        /// Target record.
        id: String,
    },
    /// Mark ignored.
    Ignore {
        /// Target record.
        id: String,
    },
    /// Show a record.
    View {
        /// Target record.
        id: String,
    },
    /// Pending records for the channel.
    List,
    /// Per-status counts.
    Status,
    /// Command reference.
    Help,
    /// Reply with a named template.
    Template {
        /// Target record.
        id: String,
        /// Template name.
        name: String,
    },
    /// Templates of the channel's primary account.
    Templates,
    /// Ignore several records independently.
    BatchIgnore {
        /// Target records, in the order given.
        ids: Vec<String>,
    },
    /// Substring search.
    Search {
        /// Search term.
        term: String,
    },
    /// Statistics over a day window; `None` means the default.
    Stats {
        /// Raw requested window, validated by the handler.
        days: Option<u64>,
    },
    /// Leave reply mode.
    Cancel,
}

type Build = fn(&Captures<'_>) -> Option<Command>;

fn group(caps: &Captures<'_>, i: usize) -> Option<String> {
    caps.get(i)
        .map(|m| m.as_str().trim().to_owned())
        .filter(|s| !s.is_empty())
}

static TABLE: LazyLock<Vec<(Regex, Build)>> = LazyLock::new(|| {
    let rows: [(&str, Build); 14] = [
        (r"(?is)^reply\s+#?(\w+)\s+(.+)$", |c| {
            Some(Command::Reply {
                id: group(c, 1)?,
                text: group(c, 2)?,
            })
        }),
        (r"(?i)^ai\s+#?(\w+)$", |c| Some(Command::Ai { id: group(c, 1)? })),
        (r"(?i)^ignore\s+#?(\w+)$", |c| {
            Some(Command::Ignore { id: group(c, 1)? })
        }),
        (r"(?i)^view\s+#?(\w+)$", |c| Some(Command::View { id: group(c, 1)? })),
        (r"(?i)^list$", |_| Some(Command::List)),
        (r"(?i)^status$", |_| Some(Command::Status)),
        (r"(?i)^help$", |_| Some(Command::Help)),
        (r"(?i)^confirm\s+#?(\w+)$", |c| {
            Some(Command::Confirm { id: group(c, 1)? })
        }),
        (r"(?is)^template\s+#?(\w+)\s+(.+)$", |c| {
            Some(Command::Template {
                id: group(c, 1)?,
                name: group(c, 2)?,
            })
        }),
        (r"(?i)^(?:templates|template-list)$", |_| Some(Command::Templates)),
        (r"(?is)^batch-ignore\s+(.+)$", |c| {
            let ids = parse_id_list(c.get(1)?.as_str());
            (!ids.is_empty()).then_some(Command::BatchIgnore { ids })
        }),
        (r"(?is)^search\s+(.+)$", |c| {
            Some(Command::Search { term: group(c, 1)? })
        }),
        (r"(?i)^stats(?:\s+(\d+))?$", |c| {
            Some(Command::Stats {
                days: c.get(1).map(|m| m.as_str().parse().unwrap_or(u64::MAX)),
            })
        }),
        (r"(?i)^/?cancel$", |_| Some(Command::Cancel)),
    ];
    rows.into_iter()
        .filter_map(|(pattern, build)| Regex::new(pattern).ok().map(|re| (re, build)))
        .collect()
});

/// Split `#A1, #A2,A3` into identifiers.
#[must_use]
pub fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split([',', '，'])
        .map(|part| part.trim().trim_start_matches('#').trim())
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse one line of operator text.
#[must_use]
pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim();
    TABLE
        .iter()
        .find_map(|(re, build)| re.captures(text).and_then(|caps| build(&caps)))
}

/// Whether `text` is the reply-mode cancel keyword.
#[must_use]
pub fn is_cancel(text: &str) -> bool {
    matches!(parse(text), Some(Command::Cancel))
}
