use pagefeed::{
    spawn_update_loop, FeedAggregator, FetchConfig, ItemWindow, PageFetcher, SelectorRules,
    SourceKind, Store,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RSS_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Mock Feed</title>
    <link>https://example.com/</link>
    <description>mock</description>
    <item>
      <title>Feed item one</title>
      <link>https://example.com/1</link>
      <guid>feed-1</guid>
      <pubDate>Tue, 04 Jun 2024 09:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Feed item two</title>
      <link>https://example.com/2</link>
      <guid>feed-2</guid>
      <pubDate>Tue, 04 Jun 2024 10:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>
"#;

const SCRAPE_BODY: &str = r#"
<html><body>
<div class="list">
    <div class="card"><h3>Scraped one</h3><a href="/articles/1">go</a></div>
    <div class="card"><h3>Scraped two</h3><a href="/articles/2">go</a></div>
    <div class="card"><h3>Scraped three</h3><a href="/articles/3">go</a></div>
</div>
</body></html>
"#;

fn scrape_rules() -> SelectorRules {
    SelectorRules {
        container: Some("div.list".to_string()),
        item: Some("div.card".to_string()),
        title: Some("h3".to_string()),
        link: Some("a".to_string()),
        ..Default::default()
    }
}

async fn aggregator() -> FeedAggregator {
    let store = Store::open_in_memory().await.unwrap();
    let fetcher = PageFetcher::new(&FetchConfig::default());
    FeedAggregator::new(store, fetcher)
}

async fn mock_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS_BODY))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SCRAPE_BODY))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn sweep_isolates_failures_and_counts_outcomes() {
    let server = mock_site().await;
    let agg = aggregator().await;

    agg.store()
        .add_source("feed", SourceKind::Feed, &format!("{}/rss", server.uri()), None)
        .await
        .unwrap();
    agg.store()
        .add_source(
            "scraped",
            SourceKind::Scrape,
            &format!("{}/news", server.uri()),
            Some(&scrape_rules()),
        )
        .await
        .unwrap();
    agg.store()
        .add_source(
            "broken",
            SourceKind::Feed,
            &format!("{}/broken", server.uri()),
            None,
        )
        .await
        .unwrap();

    let report = agg.update_all().await.unwrap();
    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.new_items, 5);

    // A second sweep sees nothing new; the broken source stays broken.
    let report = agg.update_all().await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.new_items, 0);
}

#[tokio::test]
async fn sweep_touches_active_group_timestamps() {
    let server = mock_site().await;
    let agg = aggregator().await;

    let group = agg.store().add_group("All", "all", "").await.unwrap();
    assert!(group.last_updated.is_none());

    agg.store()
        .add_source("feed", SourceKind::Feed, &format!("{}/rss", server.uri()), None)
        .await
        .unwrap();
    agg.update_all().await.unwrap();

    let group = agg.store().get_group(group.id).await.unwrap();
    assert!(group.last_updated.is_some());
}

#[tokio::test]
async fn feed_source_update_stores_normalized_items() {
    let server = mock_site().await;
    let agg = aggregator().await;

    let source = agg
        .store()
        .add_source("feed", SourceKind::Feed, &format!("{}/rss", server.uri()), None)
        .await
        .unwrap();

    let created = agg.update_source(source.id).await.unwrap();
    assert_eq!(created, 2);

    let items = agg
        .store()
        .items_for_source(source.id, ItemWindow::All)
        .await
        .unwrap();
    assert_eq!(items[0].title, "Feed item two");
    assert_eq!(items[0].guid, "feed-2");
    assert_eq!(items[1].title, "Feed item one");
}

#[tokio::test]
async fn scrape_source_update_resolves_links_against_page_url() {
    let server = mock_site().await;
    let agg = aggregator().await;

    let source = agg
        .store()
        .add_source(
            "scraped",
            SourceKind::Scrape,
            &format!("{}/news", server.uri()),
            Some(&scrape_rules()),
        )
        .await
        .unwrap();

    let created = agg.update_source(source.id).await.unwrap();
    assert_eq!(created, 3);

    let items = agg
        .store()
        .items_for_source(source.id, ItemWindow::All)
        .await
        .unwrap();
    for item in &items {
        assert!(item.link.starts_with(&server.uri()));
        assert!(item.link.contains("/articles/"));
    }
}

#[tokio::test]
async fn scrape_source_without_required_selectors_fails() {
    let server = mock_site().await;
    let agg = aggregator().await;

    let source = agg
        .store()
        .add_source(
            "ruleless",
            SourceKind::Scrape,
            &format!("{}/news", server.uri()),
            None,
        )
        .await
        .unwrap();

    assert!(agg.update_source(source.id).await.is_err());
}

#[tokio::test]
async fn empty_extraction_is_a_source_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(&server)
        .await;

    let agg = aggregator().await;
    let source = agg
        .store()
        .add_source(
            "empty",
            SourceKind::Scrape,
            &format!("{}/empty", server.uri()),
            Some(&scrape_rules()),
        )
        .await
        .unwrap();

    assert!(agg.update_source(source.id).await.is_err());
    assert_eq!(agg.store().count_items(source.id).await.unwrap(), 0);
}

#[tokio::test]
async fn fetcher_maps_failures_to_none() {
    let server = mock_site().await;
    let fetcher = PageFetcher::new(&FetchConfig::default());

    let body = fetcher.fetch(&format!("{}/rss", server.uri()), false).await;
    assert!(body.is_some());

    assert!(fetcher
        .fetch(&format!("{}/broken", server.uri()), false)
        .await
        .is_none());
    assert!(fetcher
        .fetch(&format!("{}/missing", server.uri()), false)
        .await
        .is_none());
}

#[tokio::test]
async fn validate_feed_reports_metadata_without_persisting() {
    let server = mock_site().await;
    let agg = aggregator().await;

    let preview = agg
        .validate_feed(&format!("{}/rss", server.uri()))
        .await
        .unwrap();
    assert_eq!(preview.title, "Mock Feed");
    assert_eq!(preview.entry_count, 2);

    assert!(agg.store().list_sources(false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rules_previews_extraction_without_persisting() {
    let server = mock_site().await;
    let agg = aggregator().await;

    let preview = agg
        .test_rules(&format!("{}/news", server.uri()), &scrape_rules())
        .await
        .unwrap();
    assert_eq!(preview.count, 3);
    assert_eq!(preview.records[0].title, "Scraped one");

    assert!(agg.store().list_sources(false).await.unwrap().is_empty());
}

#[tokio::test]
async fn scheduler_stop_terminates_the_loop() {
    let agg = Arc::new(aggregator().await);
    let handle = spawn_update_loop(agg, Duration::from_secs(3600));
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn replaced_rules_drive_the_next_update() {
    let server = mock_site().await;
    let agg = aggregator().await;

    let bad_rules = SelectorRules {
        container: Some("div.nothing".to_string()),
        item: Some("div.card".to_string()),
        ..Default::default()
    };
    let source = agg
        .store()
        .add_source(
            "scraped",
            SourceKind::Scrape,
            &format!("{}/news", server.uri()),
            Some(&bad_rules),
        )
        .await
        .unwrap();
    assert!(agg.update_source(source.id).await.is_err());

    agg.store()
        .set_selectors(source.id, &scrape_rules())
        .await
        .unwrap();
    assert_eq!(agg.update_source(source.id).await.unwrap(), 3);
}

#[tokio::test]
async fn detect_for_url_finds_rules_on_a_live_page() {
    let server = MockServer::start().await;
    let body = r#"
<html><body>
<div class="content">
    <div class="card"><h2>A</h2><a href="/a">a</a></div>
    <div class="card"><h2>B</h2><a href="/b">b</a></div>
    <div class="card"><h2>C</h2><a href="/c">c</a></div>
</div>
</body></html>
"#;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let agg = aggregator().await;
    let rules = agg
        .detect_for_url(&format!("{}/page", server.uri()), false)
        .await
        .unwrap()
        .expect("rules detected");
    assert_eq!(rules.container.as_deref(), Some("div.content"));
    assert_eq!(rules.item.as_deref(), Some(".card"));
    assert_eq!(rules.title.as_deref(), Some("h2"));
}
