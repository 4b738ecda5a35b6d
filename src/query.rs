use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::error::{LogQueryError, Result};
use crate::model::{LogLine, LogSummary, SeverityLevel};

/// How many services the summary ranks.
pub const TOP_SERVICES: usize = 5;

/// Line matching: case-insensitive regex search, level markers, service tags
/// and summary counting. All functions here are pure over in-memory lines.
#[derive(Clone, Default)]
pub struct QueryProcessor;

impl QueryProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn compile_regex(&self, pattern: &str) -> Result<Regex> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| LogQueryError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Every matching line, in file order, with its 1-based number.
    pub fn find_matches(&self, lines: &[String], re: &Regex) -> Vec<LogLine> {
        numbered(lines)
            .filter(|line| re.is_match(&line.content))
            .collect()
    }

    pub fn lines_with_level(&self, lines: &[String], level: SeverityLevel) -> Vec<LogLine> {
        numbered(lines)
            .filter(|line| level.tags(&line.content))
            .collect()
    }

    /// First level in `SeverityLevel::ALL` order whose marker the line
    /// contains.
    pub fn classify(&self, line: &str) -> Option<SeverityLevel> {
        SeverityLevel::ALL.into_iter().find(|level| level.tags(line))
    }

    /// Content of the first parenthesized group, if it is non-empty.
    pub fn service_tag<'a>(&self, line: &'a str) -> Option<&'a str> {
        service_re()
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    pub fn summarize(&self, filename: &str, lines: &[String]) -> LogSummary {
        let mut level_counts = [0usize; SeverityLevel::ALL.len()];
        // insertion order doubles as the tie-break for the ranking
        let mut services: Vec<(String, usize)> = Vec::new();
        let mut service_index: HashMap<String, usize> = HashMap::new();

        for line in lines {
            if let Some(level) = self.classify(line) {
                level_counts[level as usize] += 1;
            }
            if let Some(tag) = self.service_tag(line) {
                match service_index.get(tag) {
                    Some(&idx) => services[idx].1 += 1,
                    None => {
                        service_index.insert(tag.to_string(), services.len());
                        services.push((tag.to_string(), 1));
                    }
                }
            }
        }

        // stable sort keeps first-seen order among equal counts
        services.sort_by(|a, b| b.1.cmp(&a.1));
        services.truncate(TOP_SERVICES);

        LogSummary {
            filename: filename.to_string(),
            total_lines: lines.len(),
            levels: SeverityLevel::ALL
                .into_iter()
                .zip(level_counts)
                .filter(|(_, n)| *n > 0)
                .collect(),
            top_services: services,
        }
    }
}

/// Drop from the front so that at most `limit` of the most recent items
/// remain, in their original order.
pub fn keep_last<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if items.len() > limit {
        items.drain(..items.len() - limit);
    }
    items
}

fn numbered(lines: &[String]) -> impl Iterator<Item = LogLine> + '_ {
    lines.iter().enumerate().map(|(idx, content)| LogLine {
        number: idx + 1,
        content: content.clone(),
    })
}

fn service_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^)]+)\)").expect("static service regex"))
}
