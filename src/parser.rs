use crate::types::{AggregateError, EntryTimestamp, NewEntry, NormalizedFeed, Result};
use chrono::Utc;
use feed_rs::parser;
use tracing::debug;

/// Parse a syndication document into the canonical item shape.
///
/// A fatal structural parse error is reported as `Err`; entry-level gaps
/// degrade to defaults instead. Timestamps are normalized to UTC and stripped
/// of their offset (timestamps without zone information are taken as UTC by
/// the underlying parser).
pub fn parse_feed(content: &str) -> Result<NormalizedFeed> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| AggregateError::Parse(format!("failed to parse feed: {e}")))?;

    let title = feed
        .title
        .map(|t| t.content)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Feed".to_string());
    let description = feed.description.map(|d| d.content).unwrap_or_default();

    let entries: Vec<NewEntry> = feed.entries.into_iter().map(normalize_entry).collect();
    debug!(count = entries.len(), "normalized feed entries");

    Ok(NormalizedFeed {
        title,
        description,
        entries,
    })
}

fn normalize_entry(entry: feed_rs::model::Entry) -> NewEntry {
    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();

    // Identity falls back to the link when the feed carries no explicit id.
    let guid = if entry.id.is_empty() {
        link.clone()
    } else {
        entry.id.clone()
    };

    let title = entry
        .title
        .map(|t| t.content)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let description = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .unwrap_or_default();

    // Prefer published, fall back to updated, else the current time.
    let published = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
        .unwrap_or_else(|| Utc::now().naive_utc());

    NewEntry {
        title,
        link,
        description,
        guid,
        published: EntryTimestamp::Stamped(published),
    }
}
