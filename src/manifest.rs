#![forbid(unsafe_code)]

//! Tab-separated playlist manifests: written by `playlist_export`, read
//! back by `batch_chat`. Columns are addressed by header name, not by
//! position, so hand-edited files keep working.

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const MANIFEST_HEADER: &str =
    "Position\tVideo ID\tTitle\tPublished Date\tChannel\tViews\tComments\tDuration\tChannel ID";

/// Full manifest row as produced by the playlist export.
#[derive(Debug, Clone)]
pub struct PlaylistVideo {
    pub position: usize,
    pub video_id: String,
    pub title: String,
    pub published_at: String,
    pub channel: String,
    pub views: String,
    pub comments: String,
    pub duration: String,
    pub channel_id: String,
}

/// The subset of columns the batch downloader needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub position: String,
    pub video_id: String,
    pub title: String,
}

/// Writes the manifest, creating parent directories as needed.
pub fn write_manifest(path: &Path, videos: &[PlaylistVideo]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut out = String::with_capacity(videos.len() * 96);
    out.push_str(MANIFEST_HEADER);
    out.push('\n');
    for video in videos {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            video.position,
            video.video_id,
            video.title,
            video.published_at,
            video.channel,
            video.views,
            video.comments,
            video.duration,
            video.channel_id,
        ));
    }

    fs::write(path, out).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Reads a manifest, requiring the `Position`, `Video ID` and `Title`
/// columns. Rows with too few columns are skipped with a warning.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRow>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let Some(header) = lines.next() else {
        bail!("manifest file is empty: {}", path.display());
    };

    let columns: HashMap<&str, usize> = header
        .trim()
        .split('\t')
        .enumerate()
        .map(|(index, name)| (name.trim(), index))
        .collect();

    let position_idx = require_column(&columns, "Position", path)?;
    let video_id_idx = require_column(&columns, "Video ID", path)?;
    let title_idx = require_column(&columns, "Title", path)?;
    let needed = position_idx.max(video_id_idx).max(title_idx);

    let mut rows = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        if fields.len() <= needed {
            eprintln!("  Warning: skipping row with insufficient columns: {}", line.trim());
            continue;
        }
        rows.push(ManifestRow {
            position: fields[position_idx].trim().to_string(),
            video_id: fields[video_id_idx].trim().to_string(),
            title: fields[title_idx].trim().to_string(),
        });
    }

    Ok(rows)
}

fn require_column(columns: &HashMap<&str, usize>, name: &str, path: &Path) -> Result<usize> {
    columns.get(name).copied().ok_or_else(|| {
        anyhow::anyhow!("manifest {} is missing the `{name}` column", path.display())
    })
}

/// Formats a count with comma grouping; `None` becomes `N/A`.
pub fn format_count(count: Option<i64>) -> String {
    match count {
        Some(value) => {
            let digits = value.abs().to_string();
            let mut grouped = String::new();
            for (index, ch) in digits.chars().enumerate() {
                if index > 0 && (digits.len() - index) % 3 == 0 {
                    grouped.push(',');
                }
                grouped.push(ch);
            }
            if value < 0 {
                format!("-{grouped}")
            } else {
                grouped
            }
        }
        None => "N/A".to_string(),
    }
}

/// Renders durations as `H:MM:SS` or `M:SS` for short clips.
pub fn format_duration(duration: Option<i64>) -> String {
    let Some(duration) = duration else {
        return "N/A".to_string();
    };
    let hours = duration / 3600;
    let minutes = (duration % 3600) / 60;
    let seconds = duration % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Converts epoch seconds into `YYYY-MM-DD`; `None` becomes `N/A`.
pub fn format_date(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(|value| DateTime::from_timestamp(value, 0))
        .map(|datetime| datetime.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_video(position: usize, id: &str) -> PlaylistVideo {
        PlaylistVideo {
            position,
            video_id: id.to_string(),
            title: format!("Video {id}"),
            published_at: "2024-01-01".into(),
            channel: "Channel".into(),
            views: "1,234".into(),
            comments: "56".into(),
            duration: "12:34".into(),
            channel_id: "UC123".into(),
        }
    }

    #[test]
    fn manifest_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("playlist_videos.txt");
        write_manifest(&path, &[sample_video(1, "aaa"), sample_video(2, "bbb")]).unwrap();

        let rows = read_manifest(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].position, "1");
        assert_eq!(rows[0].video_id, "aaa");
        assert_eq!(rows[1].title, "Video bbb");
    }

    #[test]
    fn write_manifest_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out/list.txt");
        write_manifest(&path, &[sample_video(1, "aaa")]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn read_manifest_resolves_columns_by_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(
            &path,
            "Title\tPosition\tVideo ID\nFirst video\t1\tabc\nSecond\t2\tdef\n",
        )
        .unwrap();

        let rows = read_manifest(&path).unwrap();
        assert_eq!(rows[0].video_id, "abc");
        assert_eq!(rows[0].title, "First video");
    }

    #[test]
    fn read_manifest_skips_short_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(
            &path,
            "Position\tVideo ID\tTitle\n1\tabc\tOk row\nbroken-row\n\n2\tdef\tAlso ok\n",
        )
        .unwrap();

        let rows = read_manifest(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].video_id, "def");
    }

    #[test]
    fn read_manifest_requires_mandatory_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "Position\tTitle\n1\tNo id column\n").unwrap();
        let err = read_manifest(&path).unwrap_err();
        assert!(err.to_string().contains("Video ID"));
    }

    #[test]
    fn read_manifest_rejects_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "\n\n").unwrap();
        assert!(read_manifest(&path).is_err());
    }

    #[test]
    fn format_count_groups_digits() {
        assert_eq!(format_count(Some(0)), "0");
        assert_eq!(format_count(Some(999)), "999");
        assert_eq!(format_count(Some(1_234_567)), "1,234,567");
        assert_eq!(format_count(None), "N/A");
    }

    #[test]
    fn format_duration_handles_hours() {
        assert_eq!(format_duration(Some(59)), "0:59");
        assert_eq!(format_duration(Some(3723)), "1:02:03");
        assert_eq!(format_duration(None), "N/A");
    }

    #[test]
    fn format_date_converts_timestamps() {
        assert_eq!(format_date(Some(1_704_067_200)), "2024-01-01");
        assert_eq!(format_date(None), "N/A");
    }
}
