#![forbid(unsafe_code)]

//! Downloads the live-chat replay of an archived YouTube stream.
//!
//! The watch page is scraped for the embedded `ytInitialData` blob, the
//! replay continuation token is pulled out of it, and the reconstructed
//! replay endpoint is then paginated until the token chain ends. Messages
//! are normalized and written to `<video_id>_live_chat.json` in the data
//! directory.

use anyhow::{Context, Result, bail};
use chat_replay_tools::chat::ChatMessage;
use chat_replay_tools::config::{RuntimeOverrides, resolve_runtime_paths};
use chat_replay_tools::process::ensure_not_root;
use chat_replay_tools::replay::{
    Browser, MAX_REPLAY_PAGES, find_continuation, live_chat_caption_url, normalize_actions,
    next_continuation, parse_video_target, parse_watch_page, replay_url, watch_url,
};
use serde_json::Value;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

const PAGE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone)]
struct FetchArgs {
    video_id: String,
    browser: Browser,
    output_dir: PathBuf,
}

impl FetchArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut target: Option<String> = None;
        let mut browser_override: Option<String> = None;
        let mut output_override: Option<PathBuf> = None;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--browser=") {
                browser_override = Some(value.to_string());
                continue;
            }
            if let Some(value) = arg.strip_prefix("--output-dir=") {
                output_override = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "-b" | "--browser" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--browser requires a value"))?;
                    browser_override = Some(value);
                }
                "-o" | "--output-dir" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--output-dir requires a value"))?;
                    output_override = Some(PathBuf::from(value));
                }
                _ if arg.starts_with('-') => {
                    bail!("unknown argument: {arg}");
                }
                _ => {
                    if target.is_some() {
                        bail!("video specified multiple times");
                    }
                    target = Some(arg);
                }
            }
        }

        let Some(target) = target else {
            bail!("Usage: fetch_chat [-b chrome|firefox|edge|safari] [-o <dir>] <video_id_or_url>");
        };
        let video_id = parse_video_target(&target)?;

        let runtime = resolve_runtime_paths(RuntimeOverrides {
            data_root: output_override.clone(),
            browser: browser_override,
            ..RuntimeOverrides::default()
        })?;
        let browser = Browser::parse(&runtime.browser)?;
        let output_dir = output_override.unwrap_or_else(|| runtime.data_root.clone());

        Ok(Self {
            video_id,
            browser,
            output_dir,
        })
    }
}

fn main() -> Result<()> {
    ensure_not_root("fetch_chat")?;

    let FetchArgs {
        video_id,
        browser,
        output_dir,
    } = FetchArgs::parse()?;

    let output_path = output_dir.join(format!("{video_id}_live_chat.json"));
    if output_path.exists() {
        println!(
            "Chat replay already downloaded: {}",
            output_path.display()
        );
        return Ok(());
    }

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let agent = ureq::AgentBuilder::new().build();
    let user_agent = browser.user_agent();

    println!("Fetching watch page for {video_id}...");
    let html = get_text(&agent, &watch_url(&video_id), user_agent)?;
    let page = parse_watch_page(&html)?;

    let download = match find_continuation(&page.initial_data) {
        Some(token) => {
            println!("Found replay continuation, downloading pages...");
            let mut first = true;
            download_replay(token, |url| {
                if !first {
                    thread::sleep(Duration::from_millis(PAGE_DELAY_MS));
                }
                first = false;
                get_text(&agent, url, user_agent)
            })?
        }
        None => match live_chat_caption_url(&page.player_response) {
            Some(caption_url) => {
                // Older archives expose the replay as a caption track
                // instead of a conversation bar.
                println!("No conversation bar found, trying caption track...");
                let body = get_text(&agent, &caption_url, user_agent)?;
                ReplayDownload::from_single_page(body)
            }
            None => bail!("no live chat replay found for {video_id}"),
        },
    };

    // Bodies that were not JSON are kept verbatim so nothing from the
    // network is thrown away.
    if let Some(body) = &download.unparsed {
        let raw_path = output_dir.join(format!("{video_id}_live_chat_raw.json"));
        fs::write(&raw_path, body)
            .with_context(|| format!("writing {}", raw_path.display()))?;
        eprintln!(
            "  Warning: payload was not JSON; raw response saved to {}",
            raw_path.display()
        );
    }

    if download.messages.is_empty() {
        if download.unparsed.is_none() {
            let raw_path = output_dir.join(format!("{video_id}_live_chat_raw.json"));
            let payload = serde_json::to_vec_pretty(&Value::Array(download.raw_pages))
                .context("serializing raw replay pages")?;
            fs::write(&raw_path, payload)
                .with_context(|| format!("writing {}", raw_path.display()))?;
            eprintln!(
                "  Warning: no messages could be extracted; raw payload saved to {}",
                raw_path.display()
            );
        }
        return Ok(());
    }

    let payload =
        serde_json::to_vec_pretty(&download.messages).context("serializing chat messages")?;
    fs::write(&output_path, payload)
        .with_context(|| format!("writing {}", output_path.display()))?;

    println!(
        "Saved {} messages to {}",
        download.messages.len(),
        output_path.display()
    );
    Ok(())
}

/// Result of walking the replay chain. `unparsed` holds the body of the
/// first page that failed to parse as JSON, if any.
#[derive(Debug, Default)]
struct ReplayDownload {
    messages: Vec<ChatMessage>,
    raw_pages: Vec<Value>,
    unparsed: Option<String>,
}

impl ReplayDownload {
    /// Normalizes a single fetched body, keeping it verbatim when it is
    /// not JSON.
    fn from_single_page(body: String) -> Self {
        let mut download = Self::default();
        match serde_json::from_str::<Value>(&body) {
            Ok(payload) => {
                let mut seen = HashSet::new();
                download.messages = normalize_actions(&payload, &mut seen);
                download.raw_pages.push(payload);
            }
            Err(_) => download.unparsed = Some(body),
        }
        download
    }
}

/// Follows the continuation chain, normalizing each page. `fetch` is
/// injected so the pagination logic can run against canned payloads. A
/// page that is not JSON ends the chain; its body is returned verbatim.
fn download_replay(
    first_token: String,
    mut fetch: impl FnMut(&str) -> Result<String>,
) -> Result<ReplayDownload> {
    let mut download = ReplayDownload::default();
    let mut seen_ids = HashSet::new();
    let mut seen_tokens = HashSet::new();
    let mut token = Some(first_token);
    let mut pages = 0usize;

    while let Some(current) = token.take() {
        if pages >= MAX_REPLAY_PAGES {
            eprintln!("  Warning: stopping after {pages} pages; continuation chain did not end");
            break;
        }
        // A repeated token means the chain has looped back on itself.
        if !seen_tokens.insert(current.clone()) {
            break;
        }

        let body = fetch(&replay_url(&current))?;
        let payload = match serde_json::from_str::<Value>(&body) {
            Ok(payload) => payload,
            Err(err) => {
                eprintln!("  Warning: replay page was not JSON: {err}");
                download.unparsed = Some(body);
                break;
            }
        };
        pages += 1;

        download
            .messages
            .extend(normalize_actions(&payload, &mut seen_ids));
        token = next_continuation(&payload);
        download.raw_pages.push(payload);

        if pages % 25 == 0 {
            println!(
                "  {pages} pages fetched, {} messages so far",
                download.messages.len()
            );
        }
    }

    Ok(download)
}

fn get_text(agent: &ureq::Agent, url: &str, user_agent: &str) -> Result<String> {
    let response = agent
        .get(url)
        .set("User-Agent", user_agent)
        .set("Accept-Language", "en-US,en;q=0.9")
        .call()
        .with_context(|| format!("requesting {url}"))?;

    // Watch pages routinely exceed the default into_string limit.
    let mut body = String::new();
    response
        .into_reader()
        .read_to_string(&mut body)
        .with_context(|| format!("reading response from {url}"))?;
    Ok(body)
}
