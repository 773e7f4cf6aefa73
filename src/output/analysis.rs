//! Offline analysis of a metadata output
//!
//! Reads the JSON-lines output of earlier sessions and reports:
//! - Tag popularity across all records
//! - The average chapter count of records matching a filter
//! - The matching records themselves, optionally saved as `"title, id"` lines
//!
//! Lines are read leniently: malformed lines and fields of the wrong type are
//! skipped, never fatal.

use crate::SweepError;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Which records the adult flag lets through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdultFilter {
    /// Only adult records
    Only,

    /// Only non-adult records
    Exclude,

    /// No filtering
    #[default]
    Any,
}

impl std::str::FromStr for AdultFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "only" => Ok(Self::Only),
            "no" | "exclude" => Ok(Self::Exclude),
            "all" | "any" => Ok(Self::Any),
            other => Err(format!(
                "invalid adult filter '{}', expected yes, no or all",
                other
            )),
        }
    }
}

/// Record filter for the chapter average
#[derive(Debug, Clone)]
pub struct AnalysisFilter {
    /// Tags that must all be present
    pub required_tags: Vec<String>,

    /// Tags of which at least one must be present
    pub optional_tags: Vec<String>,

    pub completed_only: bool,

    /// Status values counted as completed
    pub completed_labels: Vec<String>,

    /// Records without a like count fail any non-zero minimum
    pub min_likes: u64,

    /// Records without a chapter count fail any non-zero minimum
    pub min_chapters: u64,

    pub adult: AdultFilter,
}

impl Default for AnalysisFilter {
    fn default() -> Self {
        Self {
            required_tags: Vec::new(),
            optional_tags: Vec::new(),
            completed_only: false,
            completed_labels: vec!["completed".to_string()],
            min_likes: 0,
            min_chapters: 0,
            adult: AdultFilter::Any,
        }
    }
}

impl AnalysisFilter {
    /// Returns true if the record passes every filter
    fn matches(&self, record: &Value, tags: &[&str]) -> bool {
        if !self
            .required_tags
            .iter()
            .all(|t| tags.contains(&t.as_str()))
        {
            return false;
        }

        if !self.optional_tags.is_empty()
            && !self
                .optional_tags
                .iter()
                .any(|t| tags.contains(&t.as_str()))
        {
            return false;
        }

        if self.completed_only {
            let status = record.get("publication_status").and_then(Value::as_str);
            if !status.is_some_and(|s| self.completed_labels.iter().any(|l| l == s)) {
                return false;
            }
        }

        match like_count(record) {
            Some(likes) if likes < self.min_likes as f64 => return false,
            None if self.min_likes > 0 => return false,
            _ => {}
        }

        match chapter_count(record) {
            Some(chapters) if chapters < self.min_chapters as f64 => return false,
            None if self.min_chapters > 0 => return false,
            _ => {}
        }

        let adult = record
            .get("is_adult")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        match self.adult {
            AdultFilter::Only => adult,
            AdultFilter::Exclude => !adult,
            AdultFilter::Any => true,
        }
    }
}

/// One record that passed the filter
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRecord {
    pub id: String,
    pub title: String,
}

/// Result of analyzing one metadata output
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// Lines that parsed as JSON objects
    pub records_read: u64,

    /// Tags with their occurrence counts, most frequent first
    pub tag_counts: Vec<(String, u64)>,

    /// Records that passed the filter and carry a chapter count
    pub matched: Vec<MatchedRecord>,

    pub total_chapters: f64,

    pub elapsed: Duration,
}

impl AnalysisReport {
    /// Average chapter count of the matched records
    pub fn average_chapters(&self) -> Option<f64> {
        if self.matched.is_empty() {
            None
        } else {
            Some(self.total_chapters / self.matched.len() as f64)
        }
    }
}

fn like_count(record: &Value) -> Option<f64> {
    record
        .get("like_count")
        .and_then(Value::as_f64)
        .or_else(|| record.get("total_likes").and_then(Value::as_f64))
}

fn chapter_count(record: &Value) -> Option<f64> {
    record.get("chapter_count").and_then(Value::as_f64)
}

/// Analyzes JSON lines from a reader
pub fn analyze_records<R: BufRead>(
    reader: R,
    filter: &AnalysisFilter,
) -> std::io::Result<AnalysisReport> {
    let start_time = Instant::now();
    let mut report = AnalysisReport::default();
    let mut tag_counts: HashMap<String, u64> = HashMap::new();

    for line in reader.split(b'\n') {
        let line = line?;
        let Ok(record) = serde_json::from_slice::<Value>(&line) else {
            continue;
        };
        if !record.is_object() {
            continue;
        }
        report.records_read += 1;

        let tags: Vec<&str> = record
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        for tag in &tags {
            *tag_counts.entry((*tag).to_string()).or_default() += 1;
        }

        if !filter.matches(&record, &tags) {
            continue;
        }

        if let Some(chapters) = chapter_count(&record) {
            report.total_chapters += chapters;
            report.matched.push(MatchedRecord {
                id: record
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("N/A")
                    .to_string(),
                title: record
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or("N/A")
                    .to_string(),
            });
        }
    }

    let mut tag_counts: Vec<(String, u64)> = tag_counts.into_iter().collect();
    tag_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    report.tag_counts = tag_counts;
    report.elapsed = start_time.elapsed();

    Ok(report)
}

/// Analyzes a metadata output file
pub fn analyze_file(path: &Path, filter: &AnalysisFilter) -> Result<AnalysisReport, SweepError> {
    let file = std::fs::File::open(path)?;
    Ok(analyze_records(BufReader::new(file), filter)?)
}

/// Resolves tag arguments, where a bare number is a 1-based rank in `popular`
///
/// Duplicates are removed, keeping the first occurrence.
pub fn resolve_tags(inputs: &[String], popular: &[(String, u64)]) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::new();
    for input in inputs.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        let tag = input
            .parse::<usize>()
            .ok()
            .and_then(|rank| rank.checked_sub(1))
            .and_then(|index| popular.get(index))
            .map(|(tag, _)| tag.clone())
            .unwrap_or_else(|| input.to_string());
        if !resolved.contains(&tag) {
            resolved.push(tag);
        }
    }
    resolved
}

/// Prints the report to stdout
pub fn print_report(report: &AnalysisReport, top_tags: usize) {
    println!("=== Metadata Analysis ===\n");
    println!(
        "Read {} records in {:.4} seconds",
        report.records_read,
        report.elapsed.as_secs_f64()
    );
    println!();

    if report.tag_counts.is_empty() {
        println!("No tags found.");
    } else {
        println!("Top {} Tags:", top_tags.min(report.tag_counts.len()));
        for (rank, (tag, count)) in report.tag_counts.iter().take(top_tags).enumerate() {
            println!("  {}. {} ({} occurrences)", rank + 1, tag, count);
        }
    }
    println!();

    match report.average_chapters() {
        Some(average) => {
            println!("Matched records: {}", report.matched.len());
            println!("Total chapters: {}", report.total_chapters);
            println!("Average chapter count: {:.2}", average);
        }
        None => println!("No records match the given filters."),
    }
}

/// Saves matched records as `"title, id"` lines
pub fn save_matches(path: &Path, matched: &[MatchedRecord]) -> std::io::Result<()> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    for record in matched {
        writeln!(out, "{}, {}", record.title, record.id)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const SAMPLE: &str = concat!(
        r##"{"id":"000001","title":"A","tags":["#판타지","#로맨스"],"publication_status":"completed","like_count":120,"chapter_count":100,"is_adult":false}"##,
        "\n",
        r##"{"id":"000002","title":"B","tags":["#판타지"],"publication_status":"serializing","like_count":5,"chapter_count":20,"is_adult":true}"##,
        "\n",
        "not json\n",
        r##"{"id":"000003","title":"C","tags":["#현대"],"publication_status":"완결","total_likes":50}"##,
        "\n",
    );

    fn analyze(filter: &AnalysisFilter) -> AnalysisReport {
        analyze_records(Cursor::new(SAMPLE), filter).unwrap()
    }

    #[test]
    fn test_tag_popularity() {
        let report = analyze(&AnalysisFilter::default());
        assert_eq!(report.records_read, 3);
        assert_eq!(report.tag_counts[0], ("#판타지".to_string(), 2));
        assert_eq!(report.tag_counts.len(), 3);
    }

    #[test]
    fn test_average_without_filters() {
        let report = analyze(&AnalysisFilter::default());
        // 000003 has no chapter count
        assert_eq!(report.matched.len(), 2);
        assert_eq!(report.average_chapters(), Some(60.0));
    }

    #[test]
    fn test_required_and_optional_tags() {
        let filter = AnalysisFilter {
            required_tags: vec!["#판타지".to_string()],
            optional_tags: vec!["#로맨스".to_string(), "#현대".to_string()],
            ..AnalysisFilter::default()
        };
        let report = analyze(&filter);
        assert_eq!(
            report.matched,
            vec![MatchedRecord {
                id: "000001".to_string(),
                title: "A".to_string()
            }]
        );
    }

    #[test]
    fn test_min_likes_and_adult() {
        let filter = AnalysisFilter {
            min_likes: 10,
            ..AnalysisFilter::default()
        };
        assert_eq!(analyze(&filter).matched.len(), 1);

        let filter = AnalysisFilter {
            adult: AdultFilter::Only,
            ..AnalysisFilter::default()
        };
        assert_eq!(analyze(&filter).matched[0].id, "000002");
    }

    #[test]
    fn test_completed_labels() {
        let filter = AnalysisFilter {
            completed_only: true,
            completed_labels: vec!["completed".to_string(), "완결".to_string()],
            ..AnalysisFilter::default()
        };
        let report = analyze(&filter);
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.average_chapters(), Some(100.0));
    }

    #[test]
    fn test_min_chapters_requires_count() {
        let filter = AnalysisFilter {
            min_chapters: 50,
            ..AnalysisFilter::default()
        };
        assert_eq!(analyze(&filter).matched.len(), 1);
    }

    #[test]
    fn test_no_matches_has_no_average() {
        let filter = AnalysisFilter {
            required_tags: vec!["#없음".to_string()],
            ..AnalysisFilter::default()
        };
        assert_eq!(analyze(&filter).average_chapters(), None);
    }

    #[test]
    fn test_resolve_tags_by_rank() {
        let popular = vec![("#판타지".to_string(), 2), ("#현대".to_string(), 1)];
        let inputs = vec![
            "2".to_string(),
            "#무협".to_string(),
            " ".to_string(),
            "#현대".to_string(),
            "9".to_string(),
        ];
        assert_eq!(
            resolve_tags(&inputs, &popular),
            vec!["#현대".to_string(), "#무협".to_string(), "9".to_string()]
        );
    }

    #[test]
    fn test_adult_filter_from_str() {
        assert_eq!("yes".parse::<AdultFilter>().unwrap(), AdultFilter::Only);
        assert_eq!("NO".parse::<AdultFilter>().unwrap(), AdultFilter::Exclude);
        assert_eq!("all".parse::<AdultFilter>().unwrap(), AdultFilter::Any);
        assert!("maybe".parse::<AdultFilter>().is_err());
    }

    #[test]
    fn test_save_matches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.txt");
        save_matches(
            &path,
            &[MatchedRecord {
                id: "000001".to_string(),
                title: "A".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A, 000001\n");
    }
}
