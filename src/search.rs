use std::path::PathBuf;

use futures::{stream, StreamExt};
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::{LogQueryError, Result};
use crate::model::{FileMatch, LogLine, SeverityLevel};
use crate::query::{keep_last, QueryProcessor};
use crate::reader::FileReader;
use crate::report;
use crate::scanner::LogDirectory;

/// The six read-only log operations.
///
/// Every call reads the files it needs afresh and renders a text report.
/// Caller mistakes (missing file, bad level, bad regex, path escape) come
/// back as `Ok` text; only I/O failures and the like return `Err`.
pub struct LogQueryEngine {
    config: SearchConfig,
    dir: LogDirectory,
    reader: FileReader,
    query: QueryProcessor,
}

impl LogQueryEngine {
    pub fn new(dir: LogDirectory, config: SearchConfig) -> Self {
        Self {
            config,
            dir,
            reader: FileReader::new(),
            query: QueryProcessor::new(),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn list_files(&self) -> Result<String> {
        debug!(root = %self.dir.root().display(), "list_files");
        let files = self.dir.list()?;
        Ok(report::file_list(&files))
    }

    pub async fn read_file(&self, filename: &str, lines: usize) -> Result<String> {
        debug!(filename, lines, "read_file");
        soften(self.read_file_inner(filename, lines).await)
    }

    async fn read_file_inner(&self, filename: &str, lines: usize) -> Result<String> {
        let all = self.load(filename).await?;
        if all.is_empty() {
            return Ok(report::empty_file(filename));
        }
        let total = all.len();
        let start = total.saturating_sub(lines);
        let shown: Vec<LogLine> = all
            .into_iter()
            .enumerate()
            .skip(start)
            .map(|(idx, content)| LogLine {
                number: idx + 1,
                content,
            })
            .collect();
        Ok(report::tail(filename, total, &shown))
    }

    pub async fn search_logs(&self, filename: &str, pattern: &str, lines: usize) -> Result<String> {
        debug!(filename, pattern, lines, "search_logs");
        soften(self.search_logs_inner(filename, pattern, lines).await)
    }

    async fn search_logs_inner(&self, filename: &str, pattern: &str, lines: usize) -> Result<String> {
        let re = self.query.compile_regex(pattern)?;
        let all = self.load(filename).await?;
        if all.is_empty() {
            return Ok(report::empty_file(filename));
        }
        let hits = self.query.find_matches(&all, &re);
        let total = hits.len();
        let hits = keep_last(hits, lines);
        Ok(report::search_file(filename, pattern, total, &hits))
    }

    /// Files are read concurrently, but results are collected in directory
    /// order before truncation, so the output does not depend on timing.
    pub async fn search_all_logs(&self, pattern: &str, max_results: usize) -> Result<String> {
        debug!(pattern, max_results, "search_all_logs");
        soften(self.search_all_logs_inner(pattern, max_results).await)
    }

    async fn search_all_logs_inner(&self, pattern: &str, max_results: usize) -> Result<String> {
        let re = self.query.compile_regex(pattern)?;
        let files = self.dir.list()?;
        let concurrency = self.config.max_concurrent_files.max(1);

        let per_file: Vec<(String, PathBuf, Result<Vec<String>>)> = stream::iter(files)
            .map(|file| {
                let reader = self.reader.clone();
                async move {
                    let lines = reader.read_lines(&file.path).await;
                    (file.name, file.path, lines)
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut hits = Vec::new();
        for (name, path, lines) in per_file {
            let lines = match lines {
                Ok(lines) => lines,
                Err(e) => {
                    warn!("skipping unreadable {}: {}", path.display(), e);
                    continue;
                }
            };
            hits.extend(
                self.query
                    .find_matches(&lines, &re)
                    .into_iter()
                    .map(|line| FileMatch {
                        filename: name.clone(),
                        line,
                    }),
            );
        }

        let total = hits.len();
        let hits = keep_last(hits, max_results);
        Ok(report::search_all(pattern, total, &hits))
    }

    pub async fn filter_by_level(&self, filename: &str, level: &str) -> Result<String> {
        debug!(filename, level, "filter_by_level");
        soften(self.filter_by_level_inner(filename, level).await)
    }

    async fn filter_by_level_inner(&self, filename: &str, level: &str) -> Result<String> {
        let level: SeverityLevel = level.parse()?;
        let all = self.load(filename).await?;
        if all.is_empty() {
            return Ok(report::empty_file(filename));
        }
        let hits = self.query.lines_with_level(&all, level);
        Ok(report::level_filter(filename, level, &hits))
    }

    pub async fn log_summary(&self, filename: &str) -> Result<String> {
        debug!(filename, "log_summary");
        soften(self.log_summary_inner(filename).await)
    }

    async fn log_summary_inner(&self, filename: &str) -> Result<String> {
        let all = self.load(filename).await?;
        if all.is_empty() {
            return Ok(report::empty_file(filename));
        }
        let summary = self.query.summarize(filename, &all);
        Ok(report::summary(&summary))
    }

    async fn load(&self, filename: &str) -> Result<Vec<String>> {
        let path = self.dir.resolve(filename)?;
        match self.reader.read_lines(&path).await {
            // removed between resolve and read
            Err(LogQueryError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LogQueryError::NotFound {
                    filename: filename.to_string(),
                })
            }
            other => other,
        }
    }
}

/// Turn caller mistakes into a text report; keep real failures as errors.
fn soften(result: Result<String>) -> Result<String> {
    match result {
        Err(e) if e.is_soft() => {
            debug!("soft error: {e}");
            Ok(report::soft_error(&e.to_string()))
        }
        other => other,
    }
}
