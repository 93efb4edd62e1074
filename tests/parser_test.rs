use chrono::NaiveDate;
use pagefeed::parser::parse_feed;
use pagefeed::types::EntryTimestamp;

const FEED_WITH_MISSING_TITLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <description>Example description</description>
    <link>https://example.com/</link>
    <item>
      <title>First</title>
      <link>https://example.com/1</link>
      <guid>guid-1</guid>
      <description>one</description>
      <pubDate>Mon, 02 Jan 2006 15:04:05 +0000</pubDate>
    </item>
    <item>
      <link>https://example.com/2</link>
      <guid>guid-2</guid>
      <description>two</description>
      <pubDate>Mon, 02 Jan 2006 16:04:05 +0000</pubDate>
    </item>
    <item>
      <title>Third</title>
      <link>https://example.com/3</link>
      <guid>guid-3</guid>
      <description>three</description>
      <pubDate>Mon, 02 Jan 2006 17:04:05 +0000</pubDate>
    </item>
  </channel>
</rss>
"#;

#[test]
fn missing_entry_title_defaults_to_untitled() {
    let feed = parse_feed(FEED_WITH_MISSING_TITLE).expect("feed should parse");
    assert_eq!(feed.title, "Example News");
    assert_eq!(feed.description, "Example description");
    assert_eq!(feed.entries.len(), 3);

    let titles: Vec<&str> = feed.entries.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Untitled", "Third"]);
}

#[test]
fn explicit_guid_is_kept_as_identity() {
    let feed = parse_feed(FEED_WITH_MISSING_TITLE).expect("feed should parse");
    assert_eq!(feed.entries[0].guid, "guid-1");
    assert_eq!(feed.entries[0].link, "https://example.com/1");
    assert_eq!(feed.entries[0].description, "one");
}

#[test]
fn offset_timestamps_normalize_to_identical_utc_naive_values() {
    // The same instant written with two different offsets.
    let feed_xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>TZ</title>
    <link>https://example.com/</link>
    <description>tz</description>
    <item>
      <title>utc</title>
      <link>https://example.com/utc</link>
      <pubDate>Mon, 02 Jan 2006 15:04:05 +0000</pubDate>
    </item>
    <item>
      <title>plus-two</title>
      <link>https://example.com/plus-two</link>
      <pubDate>Mon, 02 Jan 2006 17:04:05 +0200</pubDate>
    </item>
  </channel>
</rss>
"#;
    let feed = parse_feed(feed_xml).expect("feed should parse");
    assert_eq!(feed.entries.len(), 2);

    let expected = NaiveDate::from_ymd_opt(2006, 1, 2)
        .unwrap()
        .and_hms_opt(15, 4, 5)
        .unwrap();
    for entry in &feed.entries {
        match &entry.published {
            EntryTimestamp::Stamped(dt) => assert_eq!(*dt, expected),
            EntryTimestamp::Wire(_) => panic!("feed entries carry parsed timestamps"),
        }
    }
}

#[test]
fn entry_without_any_date_gets_current_time() {
    let feed_xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>No dates</title>
    <link>https://example.com/</link>
    <description>d</description>
    <item>
      <title>dateless</title>
      <link>https://example.com/x</link>
    </item>
  </channel>
</rss>
"#;
    let before = chrono::Utc::now().naive_utc();
    let feed = parse_feed(feed_xml).expect("feed should parse");
    let after = chrono::Utc::now().naive_utc();

    match &feed.entries[0].published {
        EntryTimestamp::Stamped(dt) => {
            assert!(*dt >= before && *dt <= after);
        }
        EntryTimestamp::Wire(_) => panic!("feed entries carry parsed timestamps"),
    }
}

#[test]
fn malformed_document_is_a_parse_failure() {
    assert!(parse_feed("this is not xml").is_err());
    assert!(parse_feed("").is_err());
}

#[test]
fn atom_documents_parse_too() {
    let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <id>urn:example</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Entry</title>
    <id>urn:example:1</id>
    <link href="https://example.com/1"/>
    <updated>2024-01-01T00:00:00Z</updated>
    <summary>summary text</summary>
  </entry>
</feed>
"#;
    let feed = parse_feed(atom).expect("atom should parse");
    assert_eq!(feed.title, "Atom Example");
    assert_eq!(feed.entries.len(), 1);
    assert_eq!(feed.entries[0].guid, "urn:example:1");
    assert_eq!(feed.entries[0].description, "summary text");
    // No published element: the updated timestamp is used.
    match &feed.entries[0].published {
        EntryTimestamp::Stamped(dt) => {
            assert_eq!(
                *dt,
                NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            );
        }
        EntryTimestamp::Wire(_) => panic!("feed entries carry parsed timestamps"),
    }
}
