#![forbid(unsafe_code)]

//! Descriptive statistics over a downloaded chat replay: message totals,
//! top commenters, activity per time interval, and the CSV/JSON reports
//! derived from them.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::chat::{ChatMessage, format_offset, parse_offset};
use crate::manifest::format_count;

const TOP_LIMIT: usize = 10;

/// One of the longest messages in the stream, used as a cheap engagement
/// proxy just like the original reports.
#[derive(Debug, Clone)]
pub struct TopComment {
    pub author: String,
    pub message: String,
    pub offset_text: String,
}

/// Everything the summary, reports and charts are built from.
#[derive(Debug, Clone)]
pub struct ChatStats {
    pub total_messages: usize,
    pub unique_authors: usize,
    pub top_commenters: Vec<(String, usize)>,
    pub top_comments: Vec<TopComment>,
    /// Message counts keyed by minute mark (floor of the stream offset).
    pub minute_counts: BTreeMap<i64, usize>,
    /// Keyed by interval start in minutes (multiples of 5).
    pub five_minute_counts: BTreeMap<i64, usize>,
    /// Keyed by interval start in minutes (multiples of 10).
    pub ten_minute_counts: BTreeMap<i64, usize>,
    pub member_percentage: f64,
    pub superchat_percentage: f64,
    pub superchat_total: f64,
}

pub fn analyze(messages: &[ChatMessage]) -> ChatStats {
    let total_messages = messages.len();

    let mut per_author: HashMap<&str, usize> = HashMap::new();
    let mut minute_counts = BTreeMap::new();
    let mut five_minute_counts = BTreeMap::new();
    let mut ten_minute_counts = BTreeMap::new();
    let mut member_count = 0usize;
    let mut superchat_count = 0usize;
    let mut superchat_total = 0.0f64;

    for message in messages {
        *per_author.entry(message.author_name.as_str()).or_default() += 1;

        // div_euclid floors toward negative infinity so pre-stream
        // messages land in the -1 minute bucket, not in minute 0.
        let offset = parse_offset(&message.time_in_seconds);
        *minute_counts.entry(offset.div_euclid(60)).or_default() += 1;
        *five_minute_counts
            .entry(offset.div_euclid(300) * 5)
            .or_default() += 1;
        *ten_minute_counts
            .entry(offset.div_euclid(600) * 10)
            .or_default() += 1;

        if message.is_member {
            member_count += 1;
        }
        if message.is_superchat {
            superchat_count += 1;
            superchat_total += message.amount.unwrap_or(0.0);
        }
    }

    let unique_authors = per_author.len();

    let mut top_commenters: Vec<(String, usize)> = per_author
        .into_iter()
        .map(|(author, count)| (author.to_string(), count))
        .collect();
    top_commenters.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_commenters.truncate(TOP_LIMIT);

    let mut by_length: Vec<&ChatMessage> = messages.iter().collect();
    by_length.sort_by(|a, b| b.message.chars().count().cmp(&a.message.chars().count()));
    let top_comments = by_length
        .into_iter()
        .take(TOP_LIMIT)
        .map(|message| TopComment {
            author: message.author_name.clone(),
            message: message.message.clone(),
            offset_text: message.time_in_seconds.clone(),
        })
        .collect();

    let percentage = |count: usize| {
        if total_messages == 0 {
            0.0
        } else {
            (count as f64 / total_messages as f64) * 100.0
        }
    };

    ChatStats {
        total_messages,
        unique_authors,
        top_commenters,
        top_comments,
        minute_counts,
        five_minute_counts,
        ten_minute_counts,
        member_percentage: percentage(member_count),
        superchat_percentage: percentage(superchat_count),
        superchat_total,
    }
}

/// Intervals sorted by activity, busiest first; ties resolve to the
/// earlier interval so output stays deterministic.
pub fn busiest_intervals(counts: &BTreeMap<i64, usize>, limit: usize) -> Vec<(i64, usize)> {
    let mut intervals: Vec<(i64, usize)> = counts
        .iter()
        .map(|(start, count)| (*start, *count))
        .collect();
    intervals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    intervals.truncate(limit);
    intervals
}

/// `HH:MM:SS - HH:MM:SS` label for an interval starting at `start_minute`.
pub fn interval_range_label(start_minute: i64, span_minutes: i64) -> String {
    format!(
        "{} - {}",
        interval_edge(start_minute),
        interval_edge(start_minute + span_minutes)
    )
}

fn interval_edge(minutes: i64) -> String {
    let sign = if minutes < 0 { "-" } else { "" };
    let minutes = minutes.abs();
    format!("{sign}{:02}:{:02}:00", minutes / 60, minutes % 60)
}

/// Console report in the original banner format.
pub fn print_summary(stats: &ChatStats, file_name: &str) {
    println!("{}", summary_text(stats, file_name));
}

/// Builds the banner summary as one string so the layout is testable.
pub fn summary_text(stats: &ChatStats, file_name: &str) -> String {
    let bar = "=".repeat(80);
    let mut out = String::new();

    out.push_str(&format!("\n{bar}\n"));
    out.push_str(&format!("CHAT ANALYSIS SUMMARY FOR: {file_name}\n"));
    out.push_str(&format!("{bar}\n"));

    out.push_str(&format!(
        "\nTotal Comments: {}\n",
        format_count(Some(stats.total_messages as i64))
    ));
    out.push_str(&format!(
        "Unique Authors: {}\n",
        format_count(Some(stats.unique_authors as i64))
    ));
    if stats.member_percentage > 0.0 {
        out.push_str(&format!(
            "Member Comments: {:.2}%\n",
            stats.member_percentage
        ));
    }
    if stats.superchat_percentage > 0.0 {
        out.push_str(&format!(
            "Superchat Comments: {:.2}%\n",
            stats.superchat_percentage
        ));
        out.push_str(&format!("Superchat Total: {:.2}\n", stats.superchat_total));
    }

    out.push_str(&format!("\nTop {} Commenters:\n", TOP_LIMIT));
    for (author, count) in &stats.top_commenters {
        out.push_str(&format!("  - {author}: {count} comments\n"));
    }

    if !stats.five_minute_counts.is_empty() {
        out.push_str(&format!(
            "\nTop {} 5-Minute Intervals with Most Activity:\n",
            TOP_LIMIT
        ));
        for (start, count) in busiest_intervals(&stats.five_minute_counts, TOP_LIMIT) {
            out.push_str(&format!(
                "  - {}: {count} comments\n",
                interval_range_label(start, 5)
            ));
        }

        out.push_str(&format!(
            "\nTop {} 10-Minute Intervals with Most Activity:\n",
            TOP_LIMIT
        ));
        for (start, count) in busiest_intervals(&stats.ten_minute_counts, TOP_LIMIT) {
            out.push_str(&format!(
                "  - {}: {count} comments\n",
                interval_range_label(start, 10)
            ));
        }
    }

    out.push_str(&format!("\nTop {} Comments (by length):\n", TOP_LIMIT));
    for (index, comment) in stats.top_comments.iter().enumerate() {
        let text: String = comment.message.chars().take(50).collect();
        let ellipsis = if comment.message.chars().count() > 50 {
            "..."
        } else {
            ""
        };
        out.push_str(&format!(
            "  {}. [{}] {}: {text}{ellipsis}\n",
            index + 1,
            comment.offset_text,
            comment.author
        ));
    }

    out.push_str(&format!("\n{bar}\n"));
    out.push_str("Analysis complete!\n");
    out.push_str(&format!("{bar}\n"));
    out
}

#[derive(Serialize)]
struct SummaryReport {
    total_comments: usize,
    unique_authors: usize,
    member_percentage: f64,
    superchat_percentage: f64,
    superchat_total: f64,
}

/// Writes every CSV report plus the JSON summary into `analysis_dir`,
/// prefixing each file with `base_name`.
pub fn write_reports(stats: &ChatStats, analysis_dir: &Path, base_name: &str) -> Result<()> {
    fs::create_dir_all(analysis_dir)
        .with_context(|| format!("creating {}", analysis_dir.display()))?;

    let mut commenters = String::from("author,comment_count\n");
    for (author, count) in &stats.top_commenters {
        commenters.push_str(&format!("{},{count}\n", csv_field(author)));
    }
    write_report(analysis_dir, base_name, "top_commenters.csv", &commenters)?;

    let mut minutes = String::from("minute,comment_count\n");
    for (minute, count) in &stats.minute_counts {
        minutes.push_str(&format!("{minute},{count}\n"));
    }
    write_report(analysis_dir, base_name, "minute_activity.csv", &minutes)?;

    let mut five = String::from("five_minute_interval,comment_count,time_range\n");
    for (start, count) in busiest_intervals(&stats.five_minute_counts, TOP_LIMIT) {
        five.push_str(&format!(
            "{start},{count},{}\n",
            csv_field(&interval_range_label(start, 5))
        ));
    }
    write_report(analysis_dir, base_name, "five_minute_intervals.csv", &five)?;

    let mut ten = String::from("ten_minute_interval,comment_count,time_range\n");
    for (start, count) in busiest_intervals(&stats.ten_minute_counts, TOP_LIMIT) {
        ten.push_str(&format!(
            "{start},{count},{}\n",
            csv_field(&interval_range_label(start, 10))
        ));
    }
    write_report(analysis_dir, base_name, "ten_minute_intervals.csv", &ten)?;

    let mut comments = String::from("author,message,timestamp_text\n");
    for comment in &stats.top_comments {
        comments.push_str(&format!(
            "{},{},{}\n",
            csv_field(&comment.author),
            csv_field(&comment.message),
            csv_field(&comment.offset_text)
        ));
    }
    write_report(analysis_dir, base_name, "top_comments.csv", &comments)?;

    let summary = SummaryReport {
        total_comments: stats.total_messages,
        unique_authors: stats.unique_authors,
        member_percentage: stats.member_percentage,
        superchat_percentage: stats.superchat_percentage,
        superchat_total: stats.superchat_total,
    };
    let summary_path = analysis_dir.join(format!("{base_name}_summary.json"));
    let payload = serde_json::to_vec_pretty(&summary).context("serializing summary")?;
    fs::write(&summary_path, payload)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    Ok(())
}

fn write_report(dir: &Path, base_name: &str, suffix: &str, contents: &str) -> Result<()> {
    let path = dir.join(format!("{base_name}_{suffix}"));
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Minimal CSV quoting: only fields containing a delimiter, quote or
/// newline get wrapped.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Chronological `(label, count)` pairs for charting, one per minute mark.
pub fn minute_series(stats: &ChatStats) -> Vec<(String, usize)> {
    stats
        .minute_counts
        .iter()
        .map(|(minute, count)| (format_offset(minute * 60), *count))
        .collect()
}

/// Chronological series for the 5-minute chart.
pub fn five_minute_series(stats: &ChatStats) -> Vec<(String, usize)> {
    stats
        .five_minute_counts
        .iter()
        .map(|(start, count)| (format_offset(start * 60), *count))
        .collect()
}
