#![forbid(unsafe_code)]

//! PNG activity charts rendered with plotters. One bar per time bucket,
//! with axis labels thinned so long streams stay readable.

use anyhow::{Context, Result};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

use crate::analysis::{ChatStats, five_minute_series, minute_series};

const CHART_SIZE: (u32, u32) = (1400, 700);
const MAX_MINUTE_LABELS: usize = 20;
const MAX_INTERVAL_LABELS: usize = 15;

/// Renders both activity charts for a video into `output_dir` and returns
/// the paths written, skipping charts whose series are empty.
pub fn render_activity_charts(
    stats: &ChatStats,
    output_dir: &Path,
    video_id: &str,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let mut written = Vec::new();

    let minutes = minute_series(stats);
    if !minutes.is_empty() {
        let path = output_dir.join(format!("{video_id}_comments_per_minute.png"));
        render_bar_chart(
            &path,
            "Comments Per Minute",
            "Stream Time",
            &minutes,
            MAX_MINUTE_LABELS,
        )?;
        written.push(path);
    }

    let intervals = five_minute_series(stats);
    if !intervals.is_empty() {
        let path = output_dir.join(format!("{video_id}_five_minute_intervals.png"));
        render_bar_chart(
            &path,
            "Comments Per 5-Minute Interval",
            "Interval Start",
            &intervals,
            MAX_INTERVAL_LABELS,
        )?;
        written.push(path);
    }

    Ok(written)
}

fn render_bar_chart(
    path: &Path,
    caption: &str,
    x_desc: &str,
    series: &[(String, usize)],
    max_labels: usize,
) -> Result<()> {
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let max_count = series.iter().map(|(_, count)| *count).max().unwrap_or(0);
    // Headroom above the tallest bar so it never touches the frame.
    let y_max = (max_count + max_count / 10 + 1) as u32;

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 30))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(0..series.len(), 0u32..y_max)?;

    let stride = label_stride(series.len(), max_labels);
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Comments")
        .disable_x_mesh()
        .x_labels(series.len().min(max_labels))
        .x_label_formatter(&|index| {
            if index % stride == 0 {
                series
                    .get(*index)
                    .map(|(label, _)| label.clone())
                    .unwrap_or_default()
            } else {
                String::new()
            }
        })
        .draw()?;

    chart.draw_series(series.iter().enumerate().map(|(index, (_, count))| {
        Rectangle::new(
            [(index, 0u32), (index + 1, *count as u32)],
            BLUE.mix(0.6).filled(),
        )
    }))?;

    root.present()
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Every `stride`-th label is kept so at most `max_labels` remain visible.
fn label_stride(len: usize, max_labels: usize) -> usize {
    if len <= max_labels {
        1
    } else {
        len.div_ceil(max_labels)
    }
}
