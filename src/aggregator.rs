use crate::detector;
use crate::extractor::{self, ScrapedRecord};
use crate::fetcher::PageFetcher;
use crate::parser;
use crate::reconciler;
use crate::store::Store;
use crate::types::{
    AggregateError, Item, ItemWindow, NormalizedFeed, Result, SelectorRules, Source, SourceKind,
    SweepReport,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

/// Result of a selector test run: what a rule set would extract from a live
/// page, without touching storage.
#[derive(Debug, Serialize)]
pub struct RulesPreview {
    pub count: usize,
    pub records: Vec<PreviewRecord>,
}

#[derive(Debug, Serialize)]
pub struct PreviewRecord {
    pub title: String,
    pub link: String,
    pub description: String,
    pub image: String,
    pub published: String,
    pub guid: String,
}

impl From<ScrapedRecord> for PreviewRecord {
    fn from(record: ScrapedRecord) -> Self {
        Self {
            guid: record.guid.clone(),
            title: record.title.into_value(),
            link: record.link.into_value(),
            description: record.description.into_value(),
            image: record.image.into_value(),
            published: record.published.into_value(),
        }
    }
}

/// Result of feed validation: feed-level metadata and entry count for a URL,
/// without touching storage.
#[derive(Debug, Serialize)]
pub struct FeedPreview {
    pub title: String,
    pub description: String,
    pub entry_count: usize,
}

/// Orchestrates the update pipeline: fetch, normalize or extract, reconcile.
/// Holds no ambient global state; everything flows through the store and the
/// fetcher it owns.
pub struct FeedAggregator {
    store: Store,
    fetcher: PageFetcher,
}

impl FeedAggregator {
    pub fn new(store: Store, fetcher: PageFetcher) -> Self {
        Self { store, fetcher }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Update a single source by id. Returns the number of newly created items.
    pub async fn update_source(&self, source_id: i64) -> Result<usize> {
        let source = self.store.get_source(source_id).await?;
        self.update(&source).await
    }

    async fn update(&self, source: &Source) -> Result<usize> {
        let feed = match source.kind {
            SourceKind::Feed => self.pull_feed(source).await?,
            SourceKind::Scrape => self.pull_scrape(source).await?,
        };
        info!(source = %source.name, entries = feed.entries.len(), "fetched source");
        reconciler::reconcile(&self.store, source, &feed.entries).await
    }

    async fn pull_feed(&self, source: &Source) -> Result<NormalizedFeed> {
        let body = self
            .fetcher
            .fetch(&source.url, false)
            .await
            .ok_or_else(|| AggregateError::General(format!("failed to fetch {}", source.url)))?;
        parser::parse_feed(&body)
    }

    async fn pull_scrape(&self, source: &Source) -> Result<NormalizedFeed> {
        let rules = source
            .selectors
            .as_ref()
            .filter(|r| r.has_required())
            .ok_or_else(|| {
                AggregateError::General(format!(
                    "source {} is missing container/item selectors",
                    source.name
                ))
            })?;

        let html = self
            .fetcher
            .fetch(&source.url, rules.use_browser)
            .await
            .ok_or_else(|| AggregateError::General(format!("failed to fetch {}", source.url)))?;

        let records = extractor::extract(&html, rules, &source.url);
        if records.is_empty() {
            return Err(AggregateError::General(format!(
                "no records extracted from {}",
                source.url
            )));
        }

        Ok(NormalizedFeed {
            title: source.name.clone(),
            description: format!("Scraped feed from {}", source.url),
            entries: records.into_iter().map(ScrapedRecord::into_entry).collect(),
        })
    }

    /// Bulk sweep over every active source, sequentially. Each source commits
    /// or rolls back on its own; one failure never aborts the sweep. Active
    /// groups get their last-updated timestamp touched at the end.
    pub async fn update_all(&self) -> Result<SweepReport> {
        let sources = self.store.list_sources(true).await?;
        let mut report = SweepReport::default();

        for source in &sources {
            report.attempted += 1;
            match self.update(source).await {
                Ok(created) => {
                    report.succeeded += 1;
                    report.new_items += created;
                    info!(source = %source.name, created, "source updated");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(source = %source.name, error = %e, "source update failed, eligible for retry on the next sweep");
                }
            }
        }

        self.store
            .touch_active_groups(Utc::now().naive_utc())
            .await?;
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            new_items = report.new_items,
            "update sweep finished"
        );
        Ok(report)
    }

    /// Merged, time-ordered item view for a group, resolved by slug.
    pub async fn resolve_group(&self, slug: &str, window: ItemWindow) -> Result<Vec<Item>> {
        let group = self.store.get_group_by_slug(slug).await?;
        self.store.group_items(group.id, window).await
    }

    // --- stateless request/response operations for the API layer ---

    /// Auto-detect a selector rule set for a live page.
    pub async fn detect_for_url(&self, url: &str, rendered: bool) -> Result<Option<SelectorRules>> {
        let html = self
            .fetcher
            .fetch(url, rendered)
            .await
            .ok_or_else(|| AggregateError::General(format!("failed to fetch {url}")))?;
        Ok(detector::detect(&html))
    }

    /// Test a rule set against a live page without persisting anything.
    pub async fn test_rules(&self, url: &str, rules: &SelectorRules) -> Result<RulesPreview> {
        if !rules.has_required() {
            return Err(AggregateError::General(
                "container and item selectors are required".to_string(),
            ));
        }
        let html = self
            .fetcher
            .fetch(url, rules.use_browser)
            .await
            .ok_or_else(|| AggregateError::General(format!("failed to fetch {url}")))?;
        let records = extractor::extract(&html, rules, url);
        Ok(RulesPreview {
            count: records.len(),
            records: records.into_iter().map(PreviewRecord::from).collect(),
        })
    }

    /// Validate that a URL serves a parseable syndication feed.
    pub async fn validate_feed(&self, url: &str) -> Result<FeedPreview> {
        let body = self
            .fetcher
            .fetch(url, false)
            .await
            .ok_or_else(|| AggregateError::General(format!("failed to fetch {url}")))?;
        let feed = parser::parse_feed(&body)?;
        Ok(FeedPreview {
            title: feed.title,
            description: feed.description,
            entry_count: feed.entries.len(),
        })
    }
}
