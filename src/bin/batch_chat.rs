#![forbid(unsafe_code)]

//! Walks a playlist manifest and downloads the chat replay for every video
//! that does not already have one on disk, delegating each download to the
//! `fetch_chat` binary.

use anyhow::{Context, Result, bail};
use chat_replay_tools::config::{RuntimeOverrides, resolve_runtime_paths};
use chat_replay_tools::manifest::{ManifestRow, read_manifest};
use chat_replay_tools::process::ensure_not_root;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
#[cfg(test)]
use std::sync::{Mutex, MutexGuard};

const JSON_SUBDIR: &str = "json";

#[cfg(test)]
static FETCH_CHAT_STUB: Mutex<Option<PathBuf>> = Mutex::new(None);
#[cfg(test)]
static STUB_USE_LOCK: Mutex<()> = Mutex::new(());

fn fetch_chat_command() -> Command {
    #[cfg(test)]
    {
        if let Some(path) = FETCH_CHAT_STUB.lock().unwrap().clone() {
            return Command::new(path);
        }
    }
    // Prefer the sibling binary from the same build, fall back to PATH.
    if let Ok(exe) = env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let sibling = dir.join("fetch_chat");
        if sibling.exists() {
            return Command::new(sibling);
        }
    }
    Command::new("fetch_chat")
}

#[cfg(test)]
fn set_fetch_chat_stub_path(path: PathBuf) -> FetchChatStubGuard {
    let guard = STUB_USE_LOCK.lock().unwrap();
    {
        let mut lock = FETCH_CHAT_STUB.lock().unwrap();
        *lock = Some(path);
    }
    FetchChatStubGuard { lock: Some(guard) }
}

#[cfg(test)]
struct FetchChatStubGuard {
    lock: Option<MutexGuard<'static, ()>>,
}

#[cfg(test)]
impl Drop for FetchChatStubGuard {
    fn drop(&mut self) {
        *FETCH_CHAT_STUB.lock().unwrap() = None;
        self.lock.take();
    }
}

#[derive(Debug, Clone)]
struct BatchArgs {
    manifest: PathBuf,
    position: Option<String>,
    output_dir: PathBuf,
}

impl BatchArgs {
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
        let mut manifest: Option<PathBuf> = None;
        let mut position: Option<String> = None;
        let mut output_override: Option<PathBuf> = None;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--position=") {
                position = Some(value.to_string());
                continue;
            }
            if let Some(value) = arg.strip_prefix("--output-dir=") {
                output_override = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--position" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--position requires a value"))?;
                    position = Some(value);
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
                    if manifest.is_some() {
                        bail!("manifest file specified multiple times");
                    }
                    manifest = Some(PathBuf::from(arg));
                }
            }
        }

        let Some(manifest) = manifest else {
            bail!("Usage: batch_chat [--position <n>] [-o <dir>] <manifest.txt>");
        };

        let runtime = resolve_runtime_paths(RuntimeOverrides {
            data_root: output_override.clone(),
            ..RuntimeOverrides::default()
        })?;
        let output_dir = output_override.unwrap_or_else(|| runtime.data_root.clone());

        Ok(Self {
            manifest,
            position,
            output_dir,
        })
    }
}

fn main() -> Result<()> {
    ensure_not_root("batch_chat")?;

    let BatchArgs {
        manifest,
        position,
        output_dir,
    } = BatchArgs::parse()?;

    let rows = read_manifest(&manifest)?;
    let selected = select_rows(rows, position.as_deref())?;

    println!("Processing {} videos from {}", selected.len(), manifest.display());
    println!();

    let outcome = process_rows(&selected, &output_dir);

    println!();
    println!(
        "Done: {} downloaded, {} already present, {} failed ({} total)",
        outcome.downloaded,
        outcome.skipped,
        outcome.failed,
        selected.len()
    );
    Ok(())
}

/// Narrows the manifest to the first row matching `--position`, or keeps
/// every row when no position was given.
fn select_rows(rows: Vec<ManifestRow>, position: Option<&str>) -> Result<Vec<ManifestRow>> {
    let Some(position) = position else {
        return Ok(rows);
    };
    let row = rows
        .into_iter()
        .find(|row| row.position.trim() == position.trim());
    match row {
        Some(row) => Ok(vec![row]),
        None => bail!("no manifest row with position {position}"),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct BatchOutcome {
    downloaded: usize,
    skipped: usize,
    failed: usize,
}

fn process_rows(rows: &[ManifestRow], output_dir: &Path) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let total = rows.len();

    for (index, row) in rows.iter().enumerate() {
        let current = index + 1;
        if replay_exists(output_dir, &row.video_id) {
            println!(
                "[{current}/{total}] Skipping {} ({}): already downloaded",
                row.video_id, row.title
            );
            outcome.skipped += 1;
            continue;
        }

        println!("[{current}/{total}] Downloading chat for {} ({})", row.video_id, row.title);
        match run_fetch_chat(&row.video_id, output_dir) {
            // The subprocess can exit cleanly without producing a replay
            // (e.g. only a raw payload), so verify the file landed.
            Ok(()) if replay_exists(output_dir, &row.video_id) => outcome.downloaded += 1,
            Ok(()) => {
                eprintln!(
                    "  Warning: fetch_chat finished but no replay file appeared for {}",
                    row.video_id
                );
                outcome.failed += 1;
            }
            Err(err) => {
                eprintln!("  Warning: failed to fetch chat for {}: {}", row.video_id, err);
                outcome.failed += 1;
            }
        }
    }

    outcome
}

/// A replay counts as present in the output directory itself or in its
/// `json/` subdirectory, where some users file finished downloads.
fn replay_exists(output_dir: &Path, video_id: &str) -> bool {
    let file_name = format!("{video_id}_live_chat.json");
    output_dir.join(&file_name).exists() || output_dir.join(JSON_SUBDIR).join(&file_name).exists()
}

fn run_fetch_chat(video_id: &str, output_dir: &Path) -> Result<()> {
    let mut command = fetch_chat_command();
    command
        .arg(video_id)
        .arg("--output-dir")
        .arg(output_dir.as_os_str());

    let status = command
        .status()
        .with_context(|| format!("running fetch_chat for {video_id}"))?;
    if !status.success() {
        bail!("fetch_chat exited with status {status}");
    }
    Ok(())
}
