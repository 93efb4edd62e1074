use crate::types::{EntryTimestamp, NewEntry, SelectorRules, WIRE_TIME_FORMAT};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

/// Per-field extraction result. Degradation to a default is an observable
/// outcome, not a swallowed error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    Resolved(String),
    Defaulted(String),
}

impl FieldOutcome {
    pub fn value(&self) -> &str {
        match self {
            FieldOutcome::Resolved(v) | FieldOutcome::Defaulted(v) => v,
        }
    }

    pub fn into_value(self) -> String {
        match self {
            FieldOutcome::Resolved(v) | FieldOutcome::Defaulted(v) => v,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, FieldOutcome::Defaulted(_))
    }
}

/// One raw record extracted from a page. `published` carries the canonical
/// wire-format timestamp string.
#[derive(Debug, Clone)]
pub struct ScrapedRecord {
    pub title: FieldOutcome,
    pub link: FieldOutcome,
    pub description: FieldOutcome,
    pub image: FieldOutcome,
    pub published: FieldOutcome,
    pub guid: String,
}

impl ScrapedRecord {
    pub fn into_entry(self) -> NewEntry {
        NewEntry {
            guid: self.guid,
            title: self.title.into_value(),
            link: self.link.into_value(),
            description: self.description.into_value(),
            published: EntryTimestamp::Wire(self.published.into_value()),
        }
    }
}

/// Extract an ordered sequence of records from `html` using a selector rule set.
///
/// An unmatched container is a legitimate "no content" outcome and yields an
/// empty sequence, as does an invalid selector. When the item selector is
/// absent the container itself is treated as the sole item. Field failures
/// degrade independently to that field's default.
pub fn extract(html: &str, rules: &SelectorRules, base_url: &str) -> Vec<ScrapedRecord> {
    let Some(container_selector) = rules.container.as_deref() else {
        return Vec::new();
    };
    let Some(container_selector) = compile(container_selector) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let Some(container) = document.select(&container_selector).next() else {
        debug!(selector = ?rules.container, "container selector matched nothing");
        return Vec::new();
    };

    let elements: Vec<ElementRef> = match rules.item.as_deref() {
        Some(item_selector) => match compile(item_selector) {
            Some(selector) => container.select(&selector).collect(),
            None => return Vec::new(),
        },
        None => vec![container],
    };

    let base = Url::parse(base_url).ok();
    let fields = FieldSelectors::compile(rules);

    elements
        .into_iter()
        .map(|element| resolve_record(element, &fields, base.as_ref(), base_url))
        .collect()
}

/// Pre-compiled per-field selectors. A selector that fails to parse behaves
/// like an absent one.
struct FieldSelectors {
    title: Option<Selector>,
    link: Option<Selector>,
    description: Option<Selector>,
    image: Option<Selector>,
    date: Option<Selector>,
}

impl FieldSelectors {
    fn compile(rules: &SelectorRules) -> Self {
        Self {
            title: rules.title.as_deref().and_then(compile),
            link: rules.link.as_deref().and_then(compile),
            description: rules.description.as_deref().and_then(compile),
            image: rules.image.as_deref().and_then(compile),
            date: rules.date.as_deref().and_then(compile),
        }
    }
}

fn resolve_record(
    element: ElementRef,
    fields: &FieldSelectors,
    base: Option<&Url>,
    base_url: &str,
) -> ScrapedRecord {
    let title = match &fields.title {
        Some(selector) => element
            .select(selector)
            .next()
            .map(|el| FieldOutcome::Resolved(element_text(&el)))
            .unwrap_or_else(|| FieldOutcome::Defaulted("No Title".to_string())),
        None => FieldOutcome::Defaulted("No Title".to_string()),
    };

    let link = match &fields.link {
        Some(selector) => element
            .select(selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(|href| FieldOutcome::Resolved(absolutize(href, base)))
            .unwrap_or_else(|| FieldOutcome::Defaulted(base_url.to_string())),
        None => FieldOutcome::Defaulted(base_url.to_string()),
    };

    let description = match &fields.description {
        Some(selector) => element
            .select(selector)
            .next()
            .map(|el| FieldOutcome::Resolved(element_text(&el)))
            .unwrap_or_else(|| FieldOutcome::Defaulted(String::new())),
        None => FieldOutcome::Defaulted(String::new()),
    };

    let image = match &fields.image {
        Some(selector) => element
            .select(selector)
            .next()
            .and_then(|el| el.value().attr("src"))
            .map(|src| FieldOutcome::Resolved(absolutize(src, base)))
            .unwrap_or_else(|| FieldOutcome::Defaulted(String::new())),
        // No selector for this role: still try the first image descendant
        // before defaulting to empty.
        None => first_image(element, base)
            .map(FieldOutcome::Resolved)
            .unwrap_or_else(|| FieldOutcome::Defaulted(String::new())),
    };

    let published = match &fields.date {
        Some(selector) => element
            .select(selector)
            .next()
            .and_then(|el| parse_date_text(&element_text(&el)))
            .map(FieldOutcome::Resolved)
            .unwrap_or_else(|| FieldOutcome::Defaulted(now_wire())),
        None => FieldOutcome::Defaulted(now_wire()),
    };

    let guid = content_guid(link.value(), title.value());

    ScrapedRecord {
        title,
        link,
        description,
        image,
        published,
        guid,
    }
}

fn compile(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(selector, error = %e, "invalid CSS selector");
            None
        }
    }
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn absolutize(href: &str, base: Option<&Url>) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(resolved) => resolved.to_string(),
        None => href.to_string(),
    }
}

fn first_image(element: ElementRef, base: Option<&Url>) -> Option<String> {
    static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("valid selector"));
    element
        .select(&IMG)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(|src| absolutize(src, base))
}

/// Deterministic identity key: hex-encoded content hash of link + title, so the
/// key is stable across repeated fetches of unchanged content.
pub fn content_guid(link: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(link.as_bytes());
    hasher.update(title.as_bytes());
    hex::encode(hasher.finalize())
}

fn now_wire() -> String {
    Utc::now().naive_utc().format(WIRE_TIME_FORMAT).to_string()
}

/// Free-form date text parsing against a ranked list of common shapes.
/// Returns the canonical wire-format string, or `None` when nothing matched.
pub fn parse_date_text(text: &str) -> Option<String> {
    static CLUTTER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^\w\s\-/.,:+]").expect("valid regex"));

    let cleaned = CLUTTER.replace_all(text, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(format_wire(dt.with_timezone(&Utc).naive_utc()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(format_wire(dt.with_timezone(&Utc).naive_utc()));
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%d.%m.%Y %H:%M",
        "%d/%m/%Y %H:%M",
        "%B %d, %Y %H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(cleaned, format) {
            return Some(format_wire(dt));
        }
    }

    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%d.%m.%Y",
        "%d/%m/%Y",
        "%m/%d/%Y",
        "%B %d, %Y",
        "%d %B %Y",
    ];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cleaned, format) {
            return date.and_hms_opt(0, 0, 0).map(format_wire);
        }
    }

    None
}

fn format_wire(dt: NaiveDateTime) -> String {
    dt.format(WIRE_TIME_FORMAT).to_string()
}
