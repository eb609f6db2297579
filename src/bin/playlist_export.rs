#![forbid(unsafe_code)]

//! Exports a YouTube playlist into a tab-separated manifest via yt-dlp's
//! flat-playlist mode. The manifest feeds `batch_chat`.

use anyhow::{Context, Result, bail};
use chat_replay_tools::config::{RuntimeOverrides, resolve_runtime_paths};
use chat_replay_tools::manifest::{
    PlaylistVideo, format_count, format_date, format_duration, write_manifest,
};
use chat_replay_tools::process::{ensure_not_root, ensure_program_available};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::process::Command;
#[cfg(test)]
use std::sync::{Mutex, MutexGuard};

const DEFAULT_OUTPUT_FILE: &str = "playlist_videos.txt";
const PLAYLIST_ITEMS_RANGE: &str = "1-1000";

#[cfg(test)]
static YT_DLP_STUB: Mutex<Option<PathBuf>> = Mutex::new(None);
#[cfg(test)]
static STUB_USE_LOCK: Mutex<()> = Mutex::new(());

fn yt_dlp_command() -> Command {
    #[cfg(test)]
    {
        if let Some(path) = YT_DLP_STUB.lock().unwrap().clone() {
            return Command::new(path);
        }
    }
    Command::new("yt-dlp")
}

#[cfg(test)]
fn set_ytdlp_stub_path(path: PathBuf) -> YtDlpStubGuard {
    let guard = STUB_USE_LOCK.lock().unwrap();
    {
        let mut lock = YT_DLP_STUB.lock().unwrap();
        *lock = Some(path);
    }
    YtDlpStubGuard { lock: Some(guard) }
}

#[cfg(test)]
struct YtDlpStubGuard {
    lock: Option<MutexGuard<'static, ()>>,
}

#[cfg(test)]
impl Drop for YtDlpStubGuard {
    fn drop(&mut self) {
        *YT_DLP_STUB.lock().unwrap() = None;
        self.lock.take();
    }
}

#[derive(Debug, Clone)]
struct ExportArgs {
    playlist_id: String,
    output: PathBuf,
}

impl ExportArgs {
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
        let mut output_override: Option<PathBuf> = None;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--output=") {
                output_override = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "-o" | "--output" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--output requires a value"))?;
                    output_override = Some(PathBuf::from(value));
                }
                _ if arg.starts_with('-') => {
                    bail!("unknown argument: {arg}");
                }
                _ => {
                    if target.is_some() {
                        bail!("playlist specified multiple times");
                    }
                    target = Some(arg);
                }
            }
        }

        let Some(target) = target else {
            bail!("Usage: playlist_export [-o <file>] <playlist_id_or_url>");
        };
        let playlist_id = parse_playlist_target(&target)?;

        let output = match output_override {
            Some(output) => output,
            None => {
                let runtime = resolve_runtime_paths(RuntimeOverrides::default())?;
                runtime.data_root.join(DEFAULT_OUTPUT_FILE)
            }
        };

        Ok(Self {
            playlist_id,
            output,
        })
    }
}

/// Accepts a bare playlist id or any URL carrying a `list=` parameter.
fn parse_playlist_target(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        bail!("empty playlist id");
    }

    if trimmed.contains("youtube.com") || trimmed.contains("youtu.be") {
        let query = trimmed
            .split_once('?')
            .map(|(_, query)| query)
            .unwrap_or("");
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("list=")
                && !value.is_empty()
            {
                return Ok(value.split('#').next().unwrap_or(value).to_string());
            }
        }
        bail!("could not extract playlist id from {input}");
    }

    Ok(trimmed.to_string())
}

fn playlist_url(playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={playlist_id}")
}

/// One line of `yt-dlp --flat-playlist --dump-json` output. Counts and
/// timestamps are frequently null in flat mode, so everything beyond the id
/// is optional.
#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    view_count: Option<i64>,
    #[serde(default)]
    comment_count: Option<i64>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    channel_id: Option<String>,
}

fn main() -> Result<()> {
    ensure_not_root("playlist_export")?;

    let ExportArgs {
        playlist_id,
        output,
    } = ExportArgs::parse()?;

    ensure_program_available("yt-dlp")?;

    println!("Exporting playlist {playlist_id}...");
    let stdout = dump_playlist(&playlist_id)?;
    let videos = parse_entries(&stdout);

    if videos.is_empty() {
        bail!("playlist {playlist_id} produced no entries");
    }

    write_manifest(&output, &videos)?;
    println!("Wrote {} videos to {}", videos.len(), output.display());
    Ok(())
}

fn dump_playlist(playlist_id: &str) -> Result<String> {
    let mut command = yt_dlp_command();
    command
        .arg("--flat-playlist")
        .arg("--no-warnings")
        .arg("--dump-json")
        .arg("--playlist-items")
        .arg(PLAYLIST_ITEMS_RANGE)
        .arg(playlist_url(playlist_id));

    let output = command
        .output()
        .with_context(|| format!("running yt-dlp for playlist {playlist_id}"))?;
    if !output.status.success() {
        bail!(
            "yt-dlp failed for playlist {} (status {})",
            playlist_id,
            output.status
        );
    }

    String::from_utf8(output.stdout).context("parsing yt-dlp output as UTF-8")
}

/// Parses one manifest row per JSON line, warning about lines that do not
/// deserialize instead of aborting the export.
fn parse_entries(stdout: &str) -> Vec<PlaylistVideo> {
    let mut videos = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: PlaylistEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(err) => {
                eprintln!("  Warning: skipping malformed playlist entry: {err}");
                continue;
            }
        };

        let position = videos.len() + 1;
        let channel = entry
            .channel
            .or(entry.uploader)
            .unwrap_or_else(|| "N/A".to_string());
        videos.push(PlaylistVideo {
            position,
            video_id: entry.id,
            title: entry.title.unwrap_or_else(|| "N/A".to_string()),
            published_at: format_date(entry.timestamp),
            channel,
            views: format_count(entry.view_count),
            comments: format_count(entry.comment_count),
            duration: format_duration(entry.duration.map(|value| value as i64)),
            channel_id: entry.channel_id.unwrap_or_else(|| "N/A".to_string()),
        });
    }

    videos
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_replay_tools::manifest::read_manifest;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn args_require_a_playlist() {
        assert!(ExportArgs::from_slice(&[]).is_err());
    }

    #[test]
    fn args_accept_output_override() {
        let args = ExportArgs::from_slice(&["-o", "/tmp/list.txt", "PL123"]).unwrap();
        assert_eq!(args.playlist_id, "PL123");
        assert_eq!(args.output, PathBuf::from("/tmp/list.txt"));
    }

    #[test]
    fn parse_playlist_target_extracts_list_param() {
        assert_eq!(parse_playlist_target("PLabc").unwrap(), "PLabc");
        assert_eq!(
            parse_playlist_target("https://www.youtube.com/playlist?list=PLxyz").unwrap(),
            "PLxyz"
        );
        assert_eq!(
            parse_playlist_target("https://www.youtube.com/watch?v=abc&list=PLdef").unwrap(),
            "PLdef"
        );
        assert!(parse_playlist_target("https://www.youtube.com/watch?v=abc").is_err());
    }

    #[test]
    fn parse_entries_builds_display_rows() {
        let stdout = concat!(
            r#"{"id":"v1","title":"First","timestamp":1704067200,"channel":"Chan","view_count":1234567,"comment_count":89,"duration":3723.0,"channel_id":"UC1"}"#,
            "\n",
            r#"{"id":"v2","uploader":"Uploader Only"}"#,
            "\n",
            "not json\n",
        );
        let videos = parse_entries(stdout);
        assert_eq!(videos.len(), 2);

        let first = &videos[0];
        assert_eq!(first.position, 1);
        assert_eq!(first.published_at, "2024-01-01");
        assert_eq!(first.views, "1,234,567");
        assert_eq!(first.duration, "1:02:03");

        let second = &videos[1];
        assert_eq!(second.position, 2);
        assert_eq!(second.title, "N/A");
        assert_eq!(second.channel, "Uploader Only");
        assert_eq!(second.views, "N/A");
    }

    #[test]
    fn dump_playlist_uses_flat_playlist_mode() {
        let dir = tempdir().unwrap();
        let stub = dir.path().join("yt-dlp-stub.sh");
        let script = format!(
            "#!/bin/sh\necho \"$@\" > \"{}/args.log\"\necho '{}'\n",
            dir.path().display(),
            r#"{"id":"v1","title":"Stubbed"}"#
        );
        fs::write(&stub, script).unwrap();
        let mut perms = fs::metadata(&stub).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&stub, perms).unwrap();

        let _guard = set_ytdlp_stub_path(stub);
        let stdout = dump_playlist("PL123").unwrap();
        let videos = parse_entries(&stdout);
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].title, "Stubbed");

        let args = fs::read_to_string(dir.path().join("args.log")).unwrap();
        assert!(args.contains("--flat-playlist"));
        assert!(args.contains("--playlist-items 1-1000"));
        assert!(args.contains("playlist?list=PL123"));
    }

    #[test]
    fn exported_manifest_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("playlist_videos.txt");
        let videos = parse_entries(r#"{"id":"v1","title":"Round trip"}"#);
        write_manifest(&path, &videos).unwrap();

        let rows = read_manifest(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].video_id, "v1");
        assert_eq!(rows[0].title, "Round trip");
    }
}
