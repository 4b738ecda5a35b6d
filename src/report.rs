//! Plain-text reports returned to tool callers.

use std::fmt::Write;

use crate::model::{FileMatch, LogFile, LogLine, LogSummary, SeverityLevel};

const RULE_WIDTH: usize = 50;

fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

fn push_line(out: &mut String, line: &LogLine) {
    let _ = writeln!(out, "{:4} | {}", line.number, line.content.trim_end());
}

pub fn file_list(files: &[LogFile]) -> String {
    if files.is_empty() {
        return "No .log files found".to_string();
    }
    let mut out = String::from("📁 Log Files:\n");
    for f in files {
        let _ = write!(out, "{} ({:.2} KB", f.name, f.size_kb());
        if let Some(modified) = f.modified {
            let _ = write!(out, ", modified {}", modified.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        out.push_str(")\n");
    }
    out
}

pub fn empty_file(filename: &str) -> String {
    format!("📄 {filename} is empty")
}

/// `total` is the file's line count, `shown` the numbered tail.
pub fn tail(filename: &str, total: usize, shown: &[LogLine]) -> String {
    let mut out = format!(
        "📄 {filename} (showing last {} of {total} lines)\n{}\n",
        shown.len(),
        rule()
    );
    for line in shown {
        push_line(&mut out, line);
    }
    out
}

pub fn search_file(filename: &str, pattern: &str, total: usize, hits: &[LogLine]) -> String {
    if total == 0 {
        return format!("🔍 No matches for '{pattern}' in {filename}");
    }
    let mut out = format!(
        "🔍 Search results for '{pattern}' in {filename} (showing {} of {total} matches)\n{}\n",
        hits.len(),
        rule()
    );
    for line in hits {
        push_line(&mut out, line);
    }
    out
}

/// A file header is written whenever the file changes from the previous hit,
/// so the truncated order is kept as-is.
pub fn search_all(pattern: &str, total: usize, hits: &[FileMatch]) -> String {
    if total == 0 {
        return format!("🔍 No matches for '{pattern}' across all logs");
    }
    let mut out = format!(
        "🔍 Search results for '{pattern}' across all logs (showing {} of {total} matches)\n{}\n",
        hits.len(),
        rule()
    );
    let mut current: Option<&str> = None;
    for hit in hits {
        if current != Some(hit.filename.as_str()) {
            let _ = writeln!(out, "\n📄 {}:", hit.filename);
            current = Some(hit.filename.as_str());
        }
        push_line(&mut out, &hit.line);
    }
    out
}

pub fn level_filter(filename: &str, level: SeverityLevel, hits: &[LogLine]) -> String {
    if hits.is_empty() {
        return format!("🏷️ {} entries in {filename} (0 found)", level.marker());
    }
    let mut out = format!(
        "🏷️ {} entries in {filename} ({} found)\n{}\n",
        level.marker(),
        hits.len(),
        rule()
    );
    for line in hits {
        push_line(&mut out, line);
    }
    out
}

pub fn summary(summary: &LogSummary) -> String {
    let mut out = format!(
        "📊 Summary for {} ({} total lines)\n{}\n",
        summary.filename,
        summary.total_lines,
        rule()
    );
    out.push_str("Log Levels:\n");
    if summary.levels.is_empty() {
        out.push_str("  (no level markers)\n");
    }
    for (level, count) in &summary.levels {
        let _ = writeln!(out, "  {level}: {count}");
    }
    out.push_str("\nTop Services:\n");
    if summary.top_services.is_empty() {
        out.push_str("  (no service tags)\n");
    }
    for (service, count) in &summary.top_services {
        let _ = writeln!(out, "  {service}: {count}");
    }
    out
}

pub fn soft_error(message: &str) -> String {
    format!("❌ {message}")
}
