// ManimGen Transcript Fetcher
// Copyright (c) 2026 ManimGen
//
// Subtitles come from yt-dlp in its json3 format (manual subs preferred,
// auto-generated as fallback). We only parse the result.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use super::{load_videos, save_videos, watch_url};

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    /// Seconds from the start of the video.
    pub start: f64,
    pub text: String,
}

#[derive(Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs", default)]
    start_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

pub fn parse_json3(data: &str) -> Result<Vec<TranscriptEntry>> {
    let parsed: Json3 = serde_json::from_str(data).context("invalid json3 subtitle file")?;
    Ok(parsed
        .events
        .into_iter()
        .filter_map(|ev| {
            let text: String = ev.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then(|| TranscriptEntry {
                start: ev.start_ms as f64 / 1000.0,
                text,
            })
        })
        .collect())
}

fn hms(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

pub fn format_timestamped(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("[{}] {}\n", hms(e.start), e.text))
        .collect()
}

pub fn format_clean(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| e.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn build_ytdlp_args(video_id: &str, out_dir: &Path) -> Vec<String> {
    vec![
        "--skip-download".to_string(),
        "--write-subs".to_string(),
        "--write-auto-subs".to_string(),
        "--sub-langs".to_string(),
        "en.*,en".to_string(),
        "--sub-format".to_string(),
        "json3".to_string(),
        "-o".to_string(),
        out_dir.join("%(id)s.%(ext)s").to_string_lossy().into_owned(),
        "--".to_string(),
        watch_url(video_id),
    ]
}

/// Download and parse English subtitles for one video.
pub async fn fetch_transcript(ytdlp: &str, video_id: &str) -> Result<Vec<TranscriptEntry>> {
    let scratch = tempfile::tempdir()?;
    let output = Command::new(ytdlp)
        .args(build_ytdlp_args(video_id, scratch.path()))
        .output()
        .await
        .with_context(|| format!("failed to run {}", ytdlp))?;

    if !output.status.success() {
        bail!(
            "yt-dlp failed for {}: {}",
            video_id,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let file = pick_subtitle_file(scratch.path())?
        .ok_or_else(|| anyhow!("No transcript available for {}", video_id))?;
    let data = tokio::fs::read_to_string(&file).await?;
    let entries = parse_json3(&data)?;
    if entries.is_empty() {
        bail!("Transcript for {} is empty", video_id);
    }
    Ok(entries)
}

// Manual `.en.json3` beats auto-generated `.en-orig`/other variants.
fn pick_subtitle_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json3"))
        .collect();
    candidates.sort_by_key(|p| {
        let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
        (!name.ends_with(".en.json3"), name.to_string())
    });
    Ok(candidates.into_iter().next())
}

#[derive(Debug, Default, PartialEq)]
pub struct TranscriptSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Fetch transcripts for every video in `videos_file`, writing
/// `{id}_timestamped.txt` and `{id}_clean.txt`, and record `has_transcript`
/// back into the file.
pub async fn download_transcripts(
    videos_file: &Path,
    out_dir: &Path,
    ytdlp: &str,
) -> Result<TranscriptSummary> {
    tokio::fs::create_dir_all(out_dir).await?;
    let mut videos = load_videos(videos_file)?;
    let mut summary = TranscriptSummary::default();
    let total = videos.len();

    for (i, video) in videos.iter_mut().enumerate() {
        info!("[DATASET] Processing {}/{}: {}", i + 1, total, video.title);
        match fetch_transcript(ytdlp, &video.video_id).await {
            Ok(entries) => {
                let stamped = out_dir.join(format!("{}_timestamped.txt", video.video_id));
                let clean = out_dir.join(format!("{}_clean.txt", video.video_id));
                tokio::fs::write(&stamped, format_timestamped(&entries)).await?;
                tokio::fs::write(&clean, format_clean(&entries)).await?;
                video.has_transcript = Some(true);
                summary.succeeded += 1;
            }
            Err(e) => {
                warn!("[DATASET]   Error: {}", e);
                video.has_transcript = Some(false);
                summary.failed += 1;
            }
        }
    }

    save_videos(videos_file, &videos)?;
    info!(
        "[DATASET] Transcript download complete. Success: {}, Failed: {}",
        summary.succeeded, summary.failed
    );
    Ok(summary)
}
