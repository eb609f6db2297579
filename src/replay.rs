#![forbid(unsafe_code)]

//! Watch-page scraping and live-chat replay parsing.
//!
//! YouTube embeds two JSON blobs (`ytInitialData` and
//! `ytInitialPlayerResponse`) directly in the watch page HTML. The replay
//! continuation token lives inside `ytInitialData`; the replay endpoint is
//! reconstructed from that token and paginated by following the next token
//! inside each payload. None of this is a documented API, so every lookup
//! degrades to `None` rather than panicking when the page structure shifts.

use anyhow::{Result, anyhow, bail};
use chrono::DateTime;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use crate::chat::{ChatMessage, format_offset, parse_amount};

/// Hard cap on replay pages followed in one run. The chain for even very
/// long streams stays well under this; the cap only guards against a token
/// cycle.
pub const MAX_REPLAY_PAGES: usize = 1000;

/// Browser identity used for the scrape requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
    Edge,
    Safari,
}

impl Browser {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chrome" => Ok(Browser::Chrome),
            "firefox" => Ok(Browser::Firefox),
            "edge" => Ok(Browser::Edge),
            "safari" => Ok(Browser::Safari),
            _ => bail!("unknown browser: {value} (expected chrome, firefox, edge or safari)"),
        }
    }

    pub fn user_agent(self) -> &'static str {
        match self {
            Browser::Chrome => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36"
            }
            Browser::Firefox => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0"
            }
            Browser::Edge => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0"
            }
            Browser::Safari => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/17.0 Safari/605.1.15"
            }
        }
    }
}

/// Accepts a bare video id, a `youtube.com/watch?v=` URL or a `youtu.be/`
/// short link and returns the video id.
pub fn parse_video_target(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        bail!("empty video id");
    }

    if trimmed.contains("youtu.be") {
        let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
        let id = without_query
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("could not extract video id from {input}"))?;
        return Ok(id.to_string());
    }

    if trimmed.contains("youtube.com") {
        let query = trimmed
            .split_once('?')
            .map(|(_, query)| query)
            .unwrap_or("");
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("v=")
                && !value.is_empty()
            {
                return Ok(value.split('#').next().unwrap_or(value).to_string());
            }
        }
        bail!("could not extract video id from {input}");
    }

    Ok(trimmed.to_string())
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Reconstructed replay endpoint for a continuation token.
pub fn replay_url(continuation: &str) -> String {
    format!(
        "https://www.youtube.com/live_chat_replay/get_live_chat_replay?continuation={continuation}"
    )
}

/// Locates an embedded `<name> = {...}` assignment in the page and returns
/// the raw JSON text. The page inlines the blob in one of a handful of
/// assignment styles depending on the serving experiment.
pub fn extract_embedded_json<'a>(html: &'a str, name: &str) -> Option<&'a str> {
    let patterns = [
        format!("var {name} = "),
        format!("window[\"{name}\"] = "),
        format!("window['{name}'] = "),
        format!("{name} = "),
    ];

    for pattern in &patterns {
        if let Some(start) = html.find(pattern.as_str()) {
            let json_start = start + pattern.len();
            if let Some(len) = find_json_end(&html[json_start..]) {
                return Some(&html[json_start..json_start + len]);
            }
        }
    }
    None
}

/// Finds the end of a brace-balanced JSON object. Quotes and escapes are
/// tracked because the blobs routinely contain `}` inside string values,
/// which rules out a plain regex.
fn find_json_end(text: &str) -> Option<usize> {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Both JSON blobs scraped from a watch page.
#[derive(Debug)]
pub struct WatchPage {
    pub initial_data: Value,
    pub player_response: Value,
}

pub fn parse_watch_page(html: &str) -> Result<WatchPage> {
    let initial = extract_embedded_json(html, "ytInitialData")
        .ok_or_else(|| anyhow!("could not find ytInitialData in the video page"))?;
    let initial_data: Value =
        serde_json::from_str(initial).map_err(|err| anyhow!("parsing ytInitialData: {err}"))?;

    let player = extract_embedded_json(html, "ytInitialPlayerResponse")
        .ok_or_else(|| anyhow!("could not find ytInitialPlayerResponse in the video page"))?;
    let player_response: Value = serde_json::from_str(player)
        .map_err(|err| anyhow!("parsing ytInitialPlayerResponse: {err}"))?;

    Ok(WatchPage {
        initial_data,
        player_response,
    })
}

/// Extracts the replay continuation token from `ytInitialData`.
///
/// The structured conversation-bar path is tried first; when the layout
/// does not match, a regex scan over the serialized data picks up the first
/// `"continuation":"…"` pair, which is what the player itself uses.
pub fn find_continuation(initial_data: &Value) -> Option<String> {
    let live_chat = initial_data
        .pointer("/contents/twoColumnWatchNextResults/conversationBar/liveChatRenderer");

    if let Some(renderer) = live_chat {
        if let Some(token) = renderer
            .pointer("/continuations/0/reloadContinuationData/continuation")
            .and_then(Value::as_str)
        {
            return Some(token.to_string());
        }
        if let Some(actions) = renderer.get("actions").and_then(Value::as_array) {
            for action in actions {
                if let Some(token) = action
                    .pointer("/replayChatItemAction/continuation/replayContinuationData/continuation")
                    .and_then(Value::as_str)
                {
                    return Some(token.to_string());
                }
            }
        }
    }

    let serialized = initial_data.to_string();
    let pattern = Regex::new(r#""continuation":"([^"]+)""#).ok()?;
    pattern
        .captures(&serialized)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_string())
}

/// Some archived streams expose the chat replay as a caption track instead
/// of a conversation bar. Returns its `baseUrl` when present.
pub fn live_chat_caption_url(player_response: &Value) -> Option<String> {
    let tracks = player_response
        .pointer("/captions/playerCaptionsTracklistRenderer/captionTracks")?
        .as_array()?;

    for track in tracks {
        let kind = track.get("kind").and_then(Value::as_str).unwrap_or("");
        let name = track
            .pointer("/name/simpleText")
            .and_then(Value::as_str)
            .unwrap_or("");
        if kind == "asr" || name.to_ascii_lowercase().contains("live_chat") {
            if let Some(url) = track.get("baseUrl").and_then(Value::as_str) {
                return Some(url.to_string());
            }
        }
    }
    None
}

/// Pulls the next-page token out of a replay payload, if any.
pub fn next_continuation(payload: &Value) -> Option<String> {
    let continuations = payload
        .pointer("/continuationContents/liveChatContinuation/continuations")?
        .as_array()?;

    for entry in continuations {
        for key in ["liveChatReplayContinuationData", "reloadContinuationData"] {
            if let Some(token) = entry
                .get(key)
                .and_then(|data| data.get("continuation"))
                .and_then(Value::as_str)
            {
                return Some(token.to_string());
            }
        }
    }
    None
}

/// Flattens one replay payload into chat messages, skipping renderer ids
/// already present in `seen` so overlapping pages never duplicate output.
pub fn normalize_actions(payload: &Value, seen: &mut HashSet<String>) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    let Some(actions) = payload
        .pointer("/continuationContents/liveChatContinuation/actions")
        .and_then(Value::as_array)
    else {
        return messages;
    };

    for action in actions {
        let Some(replay) = action.get("replayChatItemAction") else {
            continue;
        };
        let offset_msec = replay
            .get("videoOffsetTimeMsec")
            .and_then(value_as_i64)
            .unwrap_or(0);

        let Some(inner_actions) = replay.get("actions").and_then(Value::as_array) else {
            continue;
        };
        for inner in inner_actions {
            let Some(item) = inner.pointer("/addChatItemAction/item") else {
                continue;
            };
            if let Some(message) = message_from_item(item, offset_msec, seen) {
                messages.push(message);
            }
        }
    }

    messages
}

fn message_from_item(
    item: &Value,
    offset_msec: i64,
    seen: &mut HashSet<String>,
) -> Option<ChatMessage> {
    let (renderer, is_superchat) = if let Some(text) = item.get("liveChatTextMessageRenderer") {
        (text, false)
    } else if let Some(paid) = item.get("liveChatPaidMessageRenderer") {
        (paid, true)
    } else {
        // Membership gifts, mode changes, tickers and the like.
        return None;
    };

    let id = renderer.get("id").and_then(Value::as_str).unwrap_or("");
    if !id.is_empty() && !seen.insert(id.to_string()) {
        return None;
    }

    let timestamp_usec = renderer
        .get("timestampUsec")
        .and_then(value_as_i64)
        .unwrap_or(0);
    let datetime = DateTime::from_timestamp_micros(timestamp_usec)
        .map(|value| value.to_rfc3339())
        .unwrap_or_default();

    let time_in_seconds = renderer
        .pointer("/timestampText/simpleText")
        .and_then(Value::as_str)
        .map(|text| text.to_string())
        .unwrap_or_else(|| format_offset(offset_msec / 1000));

    let amount_string = renderer
        .pointer("/purchaseAmountText/simpleText")
        .and_then(Value::as_str)
        .map(|text| text.to_string());
    let (amount, currency) = match amount_string.as_deref().and_then(parse_amount) {
        Some((amount, currency)) => (Some(amount), Some(currency)),
        None => (None, None),
    };

    let badges = author_badges(renderer);

    Some(ChatMessage {
        author_name: renderer
            .pointer("/authorName/simpleText")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        author_id: renderer
            .get("authorExternalChannelId")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        message: message_text(renderer),
        timestamp: timestamp_usec / 1000,
        datetime,
        time_in_seconds,
        is_member: badges.member,
        is_moderator: badges.moderator,
        is_owner: badges.owner,
        is_superchat,
        amount,
        amount_string,
        currency,
    })
}

/// Joins the message `runs` into one string. Emoji runs render as their
/// first shortcut (e.g. `:smile:`) so text statistics stay meaningful.
fn message_text(renderer: &Value) -> String {
    let Some(runs) = renderer.pointer("/message/runs").and_then(Value::as_array) else {
        return String::new();
    };

    let mut text = String::new();
    for run in runs {
        if let Some(fragment) = run.get("text").and_then(Value::as_str) {
            text.push_str(fragment);
        } else if let Some(emoji) = run.get("emoji") {
            if let Some(shortcut) = emoji
                .pointer("/shortcuts/0")
                .and_then(Value::as_str)
                .or_else(|| emoji.get("emojiId").and_then(Value::as_str))
            {
                text.push_str(shortcut);
            }
        }
    }
    text
}

#[derive(Default)]
struct AuthorBadges {
    member: bool,
    moderator: bool,
    owner: bool,
}

fn author_badges(renderer: &Value) -> AuthorBadges {
    let mut badges = AuthorBadges::default();
    let Some(entries) = renderer.get("authorBadges").and_then(Value::as_array) else {
        return badges;
    };

    for entry in entries {
        let Some(badge) = entry.get("liveChatAuthorBadgeRenderer") else {
            continue;
        };
        match badge
            .pointer("/icon/iconType")
            .and_then(Value::as_str)
            .unwrap_or("")
        {
            "MODERATOR" => badges.moderator = true,
            "OWNER" => badges.owner = true,
            _ => {}
        }
        // Member badges carry a custom thumbnail instead of an icon type.
        if badge.get("customThumbnail").is_some() {
            badges.member = true;
        }
    }
    badges
}

fn value_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|text| text.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_video_target_accepts_bare_ids() {
        assert_eq!(parse_video_target("dQw4w9WgXcQ").unwrap(), "dQw4w9WgXcQ");
    }

    #[test]
    fn parse_video_target_extracts_watch_urls() {
        assert_eq!(
            parse_video_target("https://www.youtube.com/watch?v=abc123&t=10s").unwrap(),
            "abc123"
        );
        assert_eq!(
            parse_video_target("https://www.youtube.com/watch?list=PL1&v=xyz").unwrap(),
            "xyz"
        );
    }

    #[test]
    fn parse_video_target_extracts_short_links() {
        assert_eq!(
            parse_video_target("https://youtu.be/abc123?t=5").unwrap(),
            "abc123"
        );
    }

    #[test]
    fn parse_video_target_rejects_urls_without_id() {
        assert!(parse_video_target("https://www.youtube.com/watch?list=PL1").is_err());
        assert!(parse_video_target("").is_err());
    }

    #[test]
    fn browser_parse_is_case_insensitive() {
        assert_eq!(Browser::parse("FireFox").unwrap(), Browser::Firefox);
        assert!(Browser::parse("netscape").is_err());
    }

    #[test]
    fn extract_embedded_json_handles_var_assignment() {
        let html = r#"<script>var ytInitialData = {"a": "b}c", "n": {"x": 1}};</script>"#;
        let blob = extract_embedded_json(html, "ytInitialData").unwrap();
        let value: Value = serde_json::from_str(blob).unwrap();
        assert_eq!(value["a"], "b}c");
        assert_eq!(value["n"]["x"], 1);
    }

    #[test]
    fn extract_embedded_json_handles_window_assignment() {
        let html = r#"window["ytInitialPlayerResponse"] = {"ok": true};more"#;
        let blob = extract_embedded_json(html, "ytInitialPlayerResponse").unwrap();
        assert_eq!(blob, r#"{"ok": true}"#);
    }

    #[test]
    fn extract_embedded_json_handles_escaped_quotes() {
        let html = r#"var ytInitialData = {"t": "he said \"}\" loudly"};"#;
        let blob = extract_embedded_json(html, "ytInitialData").unwrap();
        let value: Value = serde_json::from_str(blob).unwrap();
        assert_eq!(value["t"], "he said \"}\" loudly");
    }

    #[test]
    fn extract_embedded_json_missing_blob_is_none() {
        assert!(extract_embedded_json("<html></html>", "ytInitialData").is_none());
        // Unterminated blob: opening brace never closes.
        assert!(extract_embedded_json(r#"var ytInitialData = {"a": 1"#, "ytInitialData").is_none());
    }

    #[test]
    fn parse_watch_page_requires_both_blobs() {
        let html = r#"var ytInitialData = {"a": 1};"#;
        let err = parse_watch_page(html).unwrap_err();
        assert!(err.to_string().contains("ytInitialPlayerResponse"));

        let full = r#"var ytInitialData = {"a": 1};var ytInitialPlayerResponse = {"b": 2};"#;
        let page = parse_watch_page(full).unwrap();
        assert_eq!(page.initial_data["a"], 1);
        assert_eq!(page.player_response["b"], 2);
    }

    #[test]
    fn find_continuation_uses_conversation_bar_path() {
        let data = json!({
            "contents": {"twoColumnWatchNextResults": {"conversationBar": {
                "liveChatRenderer": {"continuations": [
                    {"reloadContinuationData": {"continuation": "token-1"}}
                ]}
            }}}
        });
        assert_eq!(find_continuation(&data).as_deref(), Some("token-1"));
    }

    #[test]
    fn find_continuation_uses_replay_action_path() {
        let data = json!({
            "contents": {"twoColumnWatchNextResults": {"conversationBar": {
                "liveChatRenderer": {"actions": [
                    {"replayChatItemAction": {"continuation": {
                        "replayContinuationData": {"continuation": "token-2"}
                    }}}
                ]}
            }}}
        });
        assert_eq!(find_continuation(&data).as_deref(), Some("token-2"));
    }

    #[test]
    fn find_continuation_falls_back_to_serialized_scan() {
        let data = json!({"somewhere": {"deep": {"continuation": "token-3"}}});
        assert_eq!(find_continuation(&data).as_deref(), Some("token-3"));
        assert!(find_continuation(&json!({"no": "chat"})).is_none());
    }

    #[test]
    fn live_chat_caption_url_matches_track_name() {
        let player = json!({
            "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": [
                {"baseUrl": "https://x/subs", "name": {"simpleText": "English"}},
                {"baseUrl": "https://x/chat", "name": {"simpleText": "Live_chat archive"}}
            ]}}
        });
        assert_eq!(
            live_chat_caption_url(&player).as_deref(),
            Some("https://x/chat")
        );
        assert!(live_chat_caption_url(&json!({})).is_none());
    }

    fn text_item(id: &str, author: &str, text: &str, offset: &str) -> Value {
        json!({"liveChatTextMessageRenderer": {
            "id": id,
            "authorName": {"simpleText": author},
            "authorExternalChannelId": format!("UC-{author}"),
            "message": {"runs": [{"text": text}]},
            "timestampUsec": "1700000000000000",
            "timestampText": {"simpleText": offset}
        }})
    }

    fn replay_payload(items: Vec<Value>, next: Option<&str>) -> Value {
        let actions: Vec<Value> = items
            .into_iter()
            .map(|item| {
                json!({"replayChatItemAction": {
                    "videoOffsetTimeMsec": "90000",
                    "actions": [{"addChatItemAction": {"item": item}}]
                }})
            })
            .collect();

        let mut continuation = Vec::new();
        if let Some(token) = next {
            continuation.push(json!({"liveChatReplayContinuationData": {"continuation": token}}));
        }
        json!({"continuationContents": {"liveChatContinuation": {
            "actions": actions,
            "continuations": continuation
        }}})
    }

    #[test]
    fn normalize_actions_extracts_text_messages() {
        let payload = replay_payload(vec![text_item("m1", "alice", "hello there", "1:30")], None);
        let mut seen = HashSet::new();
        let messages = normalize_actions(&payload, &mut seen);
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.author_name, "alice");
        assert_eq!(message.author_id, "UC-alice");
        assert_eq!(message.message, "hello there");
        assert_eq!(message.time_in_seconds, "1:30");
        assert_eq!(message.timestamp, 1_700_000_000_000);
        assert!(!message.is_superchat);
    }

    #[test]
    fn normalize_actions_deduplicates_across_pages() {
        let payload = replay_payload(
            vec![
                text_item("m1", "alice", "hello", "1:30"),
                text_item("m1", "alice", "hello", "1:30"),
            ],
            None,
        );
        let mut seen = HashSet::new();
        assert_eq!(normalize_actions(&payload, &mut seen).len(), 1);

        // A second page repeating the same id yields nothing new.
        let repeat = replay_payload(vec![text_item("m1", "alice", "hello", "1:30")], None);
        assert!(normalize_actions(&repeat, &mut seen).is_empty());
    }

    #[test]
    fn normalize_actions_handles_superchats_and_badges() {
        let item = json!({"liveChatPaidMessageRenderer": {
            "id": "p1",
            "authorName": {"simpleText": "bob"},
            "message": {"runs": [{"text": "big fan"}]},
            "timestampUsec": "1700000000000000",
            "purchaseAmountText": {"simpleText": "$5.00"},
            "authorBadges": [
                {"liveChatAuthorBadgeRenderer": {"customThumbnail": {}, "tooltip": "Member"}},
                {"liveChatAuthorBadgeRenderer": {"icon": {"iconType": "MODERATOR"}}}
            ]
        }});
        let payload = replay_payload(vec![item], None);
        let mut seen = HashSet::new();
        let messages = normalize_actions(&payload, &mut seen);
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert!(message.is_superchat);
        assert_eq!(message.amount, Some(5.0));
        assert_eq!(message.amount_string.as_deref(), Some("$5.00"));
        assert_eq!(message.currency.as_deref(), Some("$"));
        assert!(message.is_member);
        assert!(message.is_moderator);
        assert!(!message.is_owner);
    }

    #[test]
    fn normalize_actions_skips_non_message_items() {
        let item = json!({"liveChatViewerEngagementMessageRenderer": {"id": "e1"}});
        let payload = replay_payload(vec![item], None);
        let mut seen = HashSet::new();
        assert!(normalize_actions(&payload, &mut seen).is_empty());
    }

    #[test]
    fn normalize_actions_falls_back_to_video_offset() {
        let item = json!({"liveChatTextMessageRenderer": {
            "id": "m2",
            "authorName": {"simpleText": "carol"},
            "message": {"runs": [{"text": "hi"}, {"emoji": {"shortcuts": [":wave:"]}}]},
            "timestampUsec": "1700000001000000"
        }});
        let payload = replay_payload(vec![item], None);
        let mut seen = HashSet::new();
        let messages = normalize_actions(&payload, &mut seen);
        assert_eq!(messages[0].time_in_seconds, "1:30");
        assert_eq!(messages[0].message, "hi:wave:");
    }

    #[test]
    fn next_continuation_reads_replay_token() {
        let payload = replay_payload(vec![], Some("next-token"));
        assert_eq!(next_continuation(&payload).as_deref(), Some("next-token"));
        assert!(next_continuation(&replay_payload(vec![], None)).is_none());
    }
}
