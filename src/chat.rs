#![forbid(unsafe_code)]

//! On-disk chat message records and the small time/amount parsers the
//! analyzer depends on.
//!
//! The JSON layout matches what `fetch_chat` writes: a flat array of
//! messages with snake_case fields. Everything beyond author and text is
//! optional because older dumps may predate some fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One chat replay message, normalized from YouTube's renderer JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub message: String,
    /// Publish time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub datetime: String,
    /// Offset into the stream as shown in the player, e.g. `1:23` or `-0:05`.
    #[serde(default)]
    pub time_in_seconds: String,
    #[serde(default)]
    pub is_member: bool,
    #[serde(default)]
    pub is_moderator: bool,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_superchat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Reads a `<video_id>_live_chat.json` file into memory.
pub fn load_messages(path: &Path) -> Result<Vec<ChatMessage>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let messages: Vec<ChatMessage> =
        serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))?;
    Ok(messages)
}

/// Parses a player offset (`MM:SS`, `H:MM:SS`, optionally negative for
/// pre-stream messages) into signed seconds. Malformed input parses as 0 so
/// one bad record cannot sink a whole analysis run.
pub fn parse_offset(text: &str) -> i64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0;
    }

    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed),
    };

    let parts: Vec<&str> = rest.split(':').collect();
    let parsed: Option<Vec<i64>> = parts.iter().map(|part| part.parse::<i64>().ok()).collect();
    let Some(values) = parsed else {
        return 0;
    };

    match values.as_slice() {
        [minutes, seconds] => sign * (minutes * 60 + seconds),
        [hours, minutes, seconds] => sign * (hours * 3600 + minutes * 60 + seconds),
        _ => 0,
    }
}

/// Renders seconds as `H:MM:SS` or `M:SS` for short offsets.
pub fn format_offset(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.abs();
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{sign}{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{sign}{minutes}:{secs:02}")
    }
}

/// Splits a Super Chat purchase amount like `$5.00`, `¥1,000` or `CA$2.00`
/// into (numeric amount, currency prefix). Returns `None` when no digits
/// are present.
pub fn parse_amount(text: &str) -> Option<(f64, String)> {
    let trimmed = text.trim();
    let digit_start = trimmed.find(|c: char| c.is_ascii_digit())?;
    let (currency, number) = trimmed.split_at(digit_start);
    let cleaned: String = number
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let amount = cleaned.parse::<f64>().ok()?;
    Some((amount, currency.trim().to_string()))
}
