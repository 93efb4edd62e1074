use crate::types::SelectorRules;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::debug;

/// Ranked container candidates: common semantic tags, classes and ids for
/// content listings. Order matters: ties keep the first-seen pair.
const CONTAINER_CANDIDATES: &[&str] = &[
    "div.news",
    "div.articles",
    "div.posts",
    "div.feed",
    "div.content",
    "section.news",
    "section.articles",
    "section.posts",
    "section.content",
    "main",
    "article",
    "section",
    "#content",
    "#main",
    "#news",
    "#posts",
    "#articles",
];

const ITEM_CANDIDATES: &[&str] = &[
    "article",
    "div.item",
    "div.post",
    "div.entry",
    "div.news-item",
    ".card",
];

const TITLE_CANDIDATES: &[&str] = &["h1", "h2", "h3", "h4", ".title", ".heading"];
const DESCRIPTION_CANDIDATES: &[&str] = &[
    "p",
    ".description",
    ".summary",
    ".text",
    ".content",
    ".excerpt",
];
const DATE_CANDIDATES: &[&str] = &["time", ".date", ".time", ".published", ".posted", "[datetime]"];

/// Minimum sibling-group size for the repetition fallback.
const MIN_REPEAT_COUNT: usize = 3;

/// Ancestor depth bound for fallback container signatures.
const MAX_SIGNATURE_DEPTH: usize = 3;

/// Propose a selector rule set for an unlabeled page.
///
/// Phase 1 scores the fixed (container, item) candidate pairs by match count;
/// the maximum count wins and equal counts keep the first-seen pair in
/// iteration order. Phase 2 falls back to scanning for repeated sibling
/// classes. Returns `None` only when no pair could be established at all.
pub fn detect(html: &str) -> Option<SelectorRules> {
    let document = Html::parse_document(html);

    let mut rules =
        best_candidate_pair(&document).or_else(|| repeated_class_fallback(&document))?;

    probe_roles(&document, &mut rules);
    Some(rules)
}

fn best_candidate_pair(document: &Html) -> Option<SelectorRules> {
    let mut best: Option<(&str, &str)> = None;
    let mut max_count = 0usize;

    for container_candidate in CONTAINER_CANDIDATES {
        let Ok(container_selector) = Selector::parse(container_candidate) else {
            continue;
        };
        let Some(container) = document.select(&container_selector).next() else {
            continue;
        };

        for item_candidate in ITEM_CANDIDATES {
            let Ok(item_selector) = Selector::parse(item_candidate) else {
                continue;
            };
            let count = container.select(&item_selector).count();
            // Strict comparison: equal counts keep the earlier pair.
            if count > max_count {
                max_count = count;
                best = Some((container_candidate, item_candidate));
            }
        }
    }

    let (container, item) = best?;
    debug!(container, item, count = max_count, "pattern scoring matched");
    Some(SelectorRules {
        container: Some(container.to_string()),
        item: Some(item.to_string()),
        ..Default::default()
    })
}

/// Repetition fallback: group block-level elements by identical class
/// attribute; the largest group of at least `MIN_REPEAT_COUNT` members becomes
/// the item class, and its most frequent ancestor signature the container.
fn repeated_class_fallback(document: &Html) -> Option<SelectorRules> {
    let block = Selector::parse("div, article, section, li").expect("valid selector");

    // Insertion order is kept separately so equal-sized groups resolve to the
    // first one seen in document order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ElementRef>> = HashMap::new();

    for element in document.select(&block) {
        let classes: Vec<&str> = element.value().classes().collect();
        if classes.is_empty() {
            continue;
        }
        let key = classes.join(" ");
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(element);
    }

    let mut best_key: Option<&str> = None;
    let mut best_len = 0usize;
    for key in &order {
        let len = groups[key].len();
        if len >= MIN_REPEAT_COUNT && len > best_len {
            best_len = len;
            best_key = Some(key);
        }
    }
    let key = best_key?;

    let container = most_frequent_parent(&groups[key])?;
    let item = format!(
        ".{}",
        key.split_whitespace().collect::<Vec<_>>().join(".")
    );
    debug!(%container, %item, count = best_len, "repetition fallback matched");

    Some(SelectorRules {
        container: Some(container),
        item: Some(item),
        ..Default::default()
    })
}

fn most_frequent_parent(members: &[ElementRef]) -> Option<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for element in members {
        let Some(parent) = element.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let signature = selector_signature(parent, MAX_SIGNATURE_DEPTH);
        if signature.is_empty() {
            continue;
        }
        if !counts.contains_key(&signature) {
            order.push(signature.clone());
        }
        *counts.entry(signature).or_insert(0) += 1;
    }

    let mut best: Option<&str> = None;
    let mut best_count = 0usize;
    for signature in &order {
        let count = counts[signature];
        if count > best_count {
            best_count = count;
            best = Some(signature);
        }
    }
    best.map(|s| s.to_string())
}

/// Bounded-depth ancestor selector for an element. An id short-circuits the
/// walk; classes are appended at each step.
fn selector_signature(element: ElementRef, max_depth: usize) -> String {
    let mut path: Vec<String> = Vec::new();
    let mut current = Some(element);
    let mut depth = 0usize;

    while let Some(el) = current {
        if depth >= max_depth {
            break;
        }
        let value = el.value();
        let mut part = value.name().to_string();

        if let Some(id) = value.id() {
            part.push('#');
            part.push_str(id);
            path.insert(0, part);
            break;
        }

        let classes: Vec<&str> = value.classes().collect();
        if !classes.is_empty() {
            part.push('.');
            part.push_str(&classes.join("."));
        }
        path.insert(0, part);

        current = el.parent().and_then(ElementRef::wrap);
        depth += 1;
    }

    path.join(" > ")
}

/// Probe the first matched item for secondary roles, each filled by the first
/// satisfied candidate in its priority list or left unset.
fn probe_roles(document: &Html, rules: &mut SelectorRules) {
    let Some(container_selector) = rules.container.as_deref() else {
        return;
    };
    let Some(item_selector) = rules.item.as_deref() else {
        return;
    };
    let Ok(container_selector) = Selector::parse(container_selector) else {
        return;
    };
    let Some(container) = document.select(&container_selector).next() else {
        return;
    };
    let Ok(item_selector) = Selector::parse(item_selector) else {
        return;
    };
    let Some(first_item) = container.select(&item_selector).next() else {
        return;
    };

    rules.title = first_matching(first_item, TITLE_CANDIDATES);
    if matches_any(first_item, "a") {
        rules.link = Some("a".to_string());
    }
    rules.description = first_matching(first_item, DESCRIPTION_CANDIDATES);
    if matches_any(first_item, "img") {
        rules.image = Some("img".to_string());
    }
    rules.date = first_matching(first_item, DATE_CANDIDATES);
}

fn first_matching(element: ElementRef, candidates: &[&str]) -> Option<String> {
    for candidate in candidates {
        if matches_any(element, candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}

fn matches_any(element: ElementRef, selector: &str) -> bool {
    Selector::parse(selector)
        .map(|parsed| element.select(&parsed).next().is_some())
        .unwrap_or(false)
}
