//! Page classifier
//!
//! Turns one fetched page into a `PageClass`:
//! - Boundary, deleted and access-denied pages are recognized by the text of
//!   the site's alert element
//! - Everything else is treated as an entry page and its fields are extracted
//! - A page with no extractable title is `Unparseable`
//!
//! Classification is pure: no I/O, no shared state.

use crate::config::MarkerConfig;
use crate::record::{PublicationStatus, Record};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;

/// Classification of one fetched page
#[derive(Debug, Clone, PartialEq)]
pub enum PageClass {
    /// The ID is past the last real entry
    BoundaryReached,

    /// Deleted or access-denied entry; carries a minimal record
    Removed(Record),

    /// No recognizable content marker and no extractable title
    Unparseable,

    /// A real entry
    Valid(Record),
}

/// Classifies pages using site-specific markers
#[derive(Debug, Clone)]
pub struct PageClassifier {
    markers: MarkerConfig,
}

impl PageClassifier {
    pub fn new(markers: MarkerConfig) -> Self {
        Self { markers }
    }

    /// Classifies the page fetched for `id`
    ///
    /// # Arguments
    ///
    /// * `id` - Zero-padded ID the page was fetched for
    /// * `html` - Page content
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sumi_sweep::config::MarkerConfig;
    /// use sumi_sweep::crawler::{PageClass, PageClassifier};
    ///
    /// let classifier = PageClassifier::new(MarkerConfig::default());
    /// let class = classifier.classify("000001", "<html></html>");
    /// assert_eq!(class, PageClass::Unparseable);
    /// ```
    pub fn classify(&self, id: &str, html: &str) -> PageClass {
        let document = Html::parse_document(html);

        if let Some(alert) = self.alert_text(&document) {
            if contains_any(&alert, &self.markers.boundary) {
                return PageClass::BoundaryReached;
            }
            if contains_any(&alert, &self.markers.deleted) {
                return PageClass::Removed(Record::removed(id, PublicationStatus::Deleted));
            }
            if contains_any(&alert, &self.markers.access_denied) {
                return PageClass::Removed(Record::removed(id, PublicationStatus::AccessDenied));
            }
        }

        match self.extract_record(id, &document) {
            Some(record) => PageClass::Valid(record),
            None => PageClass::Unparseable,
        }
    }

    /// Text of the alert element, if the page has one
    fn alert_text(&self, document: &Html) -> Option<String> {
        let selector = Selector::parse(&self.markers.alert_selector).ok()?;
        let text = document
            .select(&selector)
            .map(|element| element_text(&element))
            .collect::<Vec<_>>()
            .join(" ");
        Some(text).filter(|t| !t.is_empty())
    }

    /// Extracts an entry's fields; None if no title can be found
    fn extract_record(&self, id: &str, document: &Html) -> Option<Record> {
        let title = self.extract_title(document)?;
        let mut record = Record::new(id, title);

        record.synopsis = meta_content(document, "meta[name='twitter:description']")
            .filter(|s| !s.is_empty());
        record.author = select_first(document, "a.writer-name")
            .map(|e| element_text(&e))
            .filter(|s| !s.is_empty());
        record.tags = self.extract_tags(document);
        record.is_adult = select_all(document, "span.b_19.s_inv")
            .iter()
            .any(|e| element_text(e) == self.markers.adult_label);
        record.publication_status = self.extract_status(document);

        record.asset_ref = meta_content(document, "meta[property='og:image']").filter(|url| {
            !url.is_empty()
                && !self
                    .markers
                    .placeholder_assets
                    .iter()
                    .any(|p| !p.is_empty() && url.contains(p.as_str()))
        });
        if record.asset_ref.is_some() {
            record.asset_mime = meta_content(document, "meta[property='og:image:type']")
                .filter(|s| !s.is_empty());
        }

        for element in select_all(document, "div.info-count2 p") {
            let text = element_text(&element);
            if text.contains(self.markers.like_label.as_str()) {
                record.like_count = parse_grouped_number(&text);
            } else if text.contains(self.markers.chapter_label.as_str()) {
                record.chapter_count = parse_grouped_number(&text);
            }
        }

        Some(record)
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        let content = meta_content(document, "meta[name='twitter:title']")?;
        let prefix = self.markers.title_prefix.as_str();

        let title = if prefix.is_empty() {
            content.as_str()
        } else {
            let start = content.find(prefix)? + prefix.len();
            &content[start..]
        };

        Some(title.trim().to_string()).filter(|t| !t.is_empty())
    }

    fn extract_tags(&self, document: &Html) -> BTreeSet<String> {
        select_all(document, "p.writer-tag span.tag")
            .iter()
            .map(element_text)
            .filter(|tag| !tag.is_empty())
            .filter(|tag| {
                !self
                    .markers
                    .excluded_tags
                    .iter()
                    .any(|x| !x.is_empty() && tag.contains(x.as_str()))
            })
            .collect()
    }

    fn extract_status(&self, document: &Html) -> PublicationStatus {
        let completed = select_all(document, "span.b_comp.s_inv")
            .iter()
            .any(|e| element_text(e) == self.markers.completed_label);
        if completed {
            return PublicationStatus::Completed;
        }

        let discontinued = select_all(document, "span.s_inv")
            .iter()
            .any(|e| element_text(e) == self.markers.discontinued_label);
        if discontinued {
            return PublicationStatus::Discontinued;
        }

        PublicationStatus::Serializing
    }
}

/// Parses the first digit-grouped number in `text`
///
/// Accepts plain digit runs ("1234") and comma-grouped runs ("1,234,567").
/// Returns None when there is no number, the grouping is malformed
/// ("12,34") or the value overflows.
///
/// # Example
///
/// ```
/// use sumi_sweep::crawler::parse_grouped_number;
///
/// assert_eq!(parse_grouped_number("선호 1,234"), Some(1234));
/// assert_eq!(parse_grouped_number("회차 N/A"), None);
/// ```
pub fn parse_grouped_number(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let run: &str = {
        let rest = &text[start..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == ','))
            .unwrap_or(rest.len());
        rest[..end].trim_end_matches(',')
    };

    let mut groups = run.split(',');
    let first = groups.next()?;
    let grouped = run.contains(',');
    if grouped && first.len() > 3 {
        return None;
    }

    let mut value: u64 = first.parse().ok()?;
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        let part: u64 = group.parse().ok()?;
        value = value.checked_mul(1000)?.checked_add(part)?;
    }
    Some(value)
}

fn contains_any(text: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .any(|m| !m.trim().is_empty() && text.contains(m.trim()))
}

/// Concatenated, trimmed text of an element
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    select_first(document, css)
        .and_then(|e| e.value().attr("content"))
        .map(|c| c.trim().to_string())
}
