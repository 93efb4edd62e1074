use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Canonical textual timestamp exchanged with the scrape pipeline: UTC, no offset.
pub const WIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Scrape,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::Scrape => "scrape",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "feed" => Some(SourceKind::Feed),
            "scrape" => Some(SourceKind::Scrape),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content origin: either a syndication feed or a scraped HTML page.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub active: bool,
    pub include_in_aggregate: bool,
    pub selectors: Option<SelectorRules>,
    pub last_updated: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// CSS selector rule set driving HTML scraping. Fixed-shape record: every known
/// role is an explicit optional field, and absence is a first-class state.
///
/// Wire format is a flat mapping of role name to selector string plus the
/// rendering flag, e.g. `{"container": "div.list", "item": "div.card",
/// "use_browser": false}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub use_browser: bool,
}

impl SelectorRules {
    /// Extraction is only attempted when both the container and item roles are set.
    pub fn has_required(&self) -> bool {
        self.container.is_some() && self.item.is_some()
    }
}

/// One normalized content unit attributed to a source. Immutable once stored;
/// identity is unique per `(source_id, guid)`.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub link: String,
    pub description: String,
    pub guid: String,
    pub published: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// A named, slugged collection of sources merged into one output view.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub active: bool,
    pub last_updated: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// Publication timestamp of a freshly fetched entry. The feed pipeline hands
/// over parsed UTC-naive datetimes; the scrape pipeline hands over the canonical
/// wire string, coerced at reconcile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryTimestamp {
    Stamped(NaiveDateTime),
    Wire(String),
}

impl EntryTimestamp {
    /// Coerce to the storage representation. Unparseable wire strings fall back
    /// to the current UTC time.
    pub fn coerce(&self) -> NaiveDateTime {
        match self {
            EntryTimestamp::Stamped(dt) => *dt,
            EntryTimestamp::Wire(s) => {
                NaiveDateTime::parse_from_str(s, WIRE_TIME_FORMAT).unwrap_or_else(|_| {
                    debug!(raw = %s, "unparseable wire timestamp, using current time");
                    Utc::now().naive_utc()
                })
            }
        }
    }
}

/// A freshly fetched entry, not yet reconciled against storage.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub guid: String,
    pub published: EntryTimestamp,
}

/// Canonical item shape produced by both pipelines before reconciliation.
#[derive(Debug, Clone)]
pub struct NormalizedFeed {
    pub title: String,
    pub description: String,
    pub entries: Vec<NewEntry>,
}

/// Window over the merged item view of a group.
#[derive(Debug, Clone, Copy)]
pub enum ItemWindow {
    /// A 1-based page of fixed size.
    Page { page: u32, per_page: u32 },
    /// The newest `n` items.
    Limit(u32),
    /// The full ordered sequence.
    All,
}

/// Outcome counters for one bulk update sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub new_items: usize,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout: Duration,
    /// Settle period granted to client-side rendering in browser mode.
    pub settle: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            timeout: Duration::from_secs(15),
            settle: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("source not found: {id}")]
    SourceNotFound { id: i64 },

    #[error("group not found: {slug}")]
    GroupNotFound { slug: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AggregateError>;
