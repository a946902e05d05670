// ManimGen Dataset Tools
// Copyright (c) 2026 ManimGen
//
// Offline, human-supervised batch jobs that pair YouTube videos with their
// transcripts and the Manim source that produced them.

pub mod builder;
pub mod manual;
pub mod matcher;
pub mod report;
pub mod transcripts;
pub mod youtube;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

pub const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

pub fn watch_url(video_id: &str) -> String {
    format!("{}{}", WATCH_URL, video_id)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    File,
    Directory,
}

impl MatchType {
    pub fn of(path: &Path) -> Self {
        if path.is_dir() {
            MatchType::Directory
        } else {
            MatchType::File
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::File => "file",
            MatchType::Directory => "directory",
        }
    }
}

/// One candidate source path, relative to the repo root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeMatch {
    pub path: String,
    pub score: u32,
}

/// Per-video metadata, enriched in place by each dataset step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VideoMeta {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub published_at: String,
    pub year: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_transcript: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manim_code_matches: Option<Vec<CodeMatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_confidence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    /// Fields added by other tools survive a load/save cycle.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Summary row for one video in `index.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IndexEntry {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub year: i32,
    #[serde(default)]
    pub has_transcript: bool,
    #[serde(default)]
    pub has_code: bool,
    #[serde(default)]
    pub match_confidence: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manim_code_matches: Vec<CodeMatch>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manually_matched: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DatasetIndex {
    pub total_videos: usize,
    pub videos_with_transcripts: usize,
    pub videos_with_code: usize,
    pub dataset_creation_date: String,
    pub videos: Vec<IndexEntry>,
}

impl DatasetIndex {
    pub fn recount(&mut self) {
        self.total_videos = self.videos.len();
        self.videos_with_transcripts = self.videos.iter().filter(|v| v.has_transcript).count();
        self.videos_with_code = self.videos.iter().filter(|v| v.has_code).count();
    }

    pub fn unmatched(&self) -> Vec<&IndexEntry> {
        self.videos.iter().filter(|v| !v.has_code).collect()
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Dataset file not found at {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Could not parse JSON file at {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let data = serde_json::to_string_pretty(value)?;
    std::fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn load_videos(path: &Path) -> Result<Vec<VideoMeta>> {
    read_json(path)
}

pub fn save_videos(path: &Path, videos: &[VideoMeta]) -> Result<()> {
    write_json(path, &videos)
}

/// Recursively copy `src` into `dst` (created if missing).
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
