#![forbid(unsafe_code)]

//! Analyzes downloaded chat replays. Accepts a single
//! `<video_id>_live_chat.json` file or a directory to scan, prints a
//! summary per replay, and writes CSV/JSON reports plus activity charts.

use anyhow::{Context, Result, bail};
use chat_replay_tools::analysis::{analyze, print_summary, write_reports};
use chat_replay_tools::chart::render_activity_charts;
use chat_replay_tools::chat::load_messages;
use chat_replay_tools::config::{RuntimeOverrides, resolve_runtime_paths};
use chat_replay_tools::process::ensure_not_root;
use std::env;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const REPLAY_SUFFIX: &str = "_live_chat.json";
const ANALYSIS_SUBDIR: &str = "analysis";

#[derive(Debug, Clone)]
struct AnalyzeArgs {
    input: PathBuf,
    output_dir: PathBuf,
    charts: bool,
}

impl AnalyzeArgs {
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
        let mut input: Option<PathBuf> = None;
        let mut output_override: Option<PathBuf> = None;
        let mut charts = true;
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--output-dir=") {
                output_override = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "-o" | "--output-dir" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--output-dir requires a value"))?;
                    output_override = Some(PathBuf::from(value));
                }
                "--no-charts" => {
                    charts = false;
                }
                _ if arg.starts_with('-') => {
                    bail!("unknown argument: {arg}");
                }
                _ => {
                    if input.is_some() {
                        bail!("input specified multiple times");
                    }
                    input = Some(PathBuf::from(arg));
                }
            }
        }

        let Some(input) = input else {
            bail!("Usage: analyze_chat [-o <dir>] [--no-charts] <replay.json | directory>");
        };

        let runtime = resolve_runtime_paths(RuntimeOverrides {
            analysis_root: output_override.clone(),
            ..RuntimeOverrides::default()
        })?;
        let output_dir = output_override.unwrap_or_else(|| runtime.analysis_root.clone());

        Ok(Self {
            input,
            output_dir,
            charts,
        })
    }
}

fn main() -> Result<()> {
    ensure_not_root("analyze_chat")?;

    let AnalyzeArgs {
        input,
        output_dir,
        charts,
    } = AnalyzeArgs::parse()?;

    let inputs = collect_inputs(&input)?;
    if inputs.is_empty() {
        bail!("no chat replay files found under {}", input.display());
    }

    let analysis_dir = output_dir.join(ANALYSIS_SUBDIR);
    for path in &inputs {
        if let Err(err) = analyze_file(path, &analysis_dir, charts) {
            eprintln!("  Warning: analysis failed for {}: {}", path.display(), err);
        }
    }

    println!("Reports written to {}", analysis_dir.display());
    Ok(())
}

/// Resolves the input argument into the list of replay files to analyze.
fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        bail!("no such file or directory: {}", input.display());
    }
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input) {
        let entry = entry.with_context(|| format!("scanning {}", input.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(REPLAY_SUFFIX))
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn analyze_file(path: &Path, analysis_dir: &Path, charts: bool) -> Result<()> {
    let messages = load_messages(path)?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("replay");

    if messages.is_empty() {
        println!("{file_name}: no messages to analyze");
        return Ok(());
    }

    let stats = analyze(&messages);
    print_summary(&stats, file_name);

    let base_name = file_name.trim_end_matches(".json");
    write_reports(&stats, analysis_dir, base_name)?;

    if charts {
        let video_id = base_name.trim_end_matches("_live_chat");
        let written = render_activity_charts(&stats, analysis_dir, video_id)?;
        for chart in written {
            println!("Chart written to {}", chart.display());
        }
    }

    Ok(())
}
