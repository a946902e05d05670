// ManimGen Dataset Builder
// Copyright (c) 2026 ManimGen

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use super::{copy_tree, load_videos, write_json, DatasetIndex, IndexEntry, VideoMeta};

/// Assemble `out_dir/{video_id}/` folders and `out_dir/index.json`.
///
/// Each folder holds `metadata.json`, `transcript_clean.txt` and
/// `transcript_timestamped.txt` when available, and a `code/` directory with
/// every matched file (directory matches are copied by content).
pub fn build_dataset(
    videos_file: &Path,
    transcript_dir: &Path,
    repo_dir: &Path,
    out_dir: &Path,
) -> Result<DatasetIndex> {
    std::fs::create_dir_all(out_dir)?;
    let videos = load_videos(videos_file)?;

    let mut index = DatasetIndex {
        dataset_creation_date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
        videos: Vec::with_capacity(videos.len()),
        ..Default::default()
    };

    for video in &videos {
        let video_dir = out_dir.join(&video.video_id);
        std::fs::create_dir_all(&video_dir)?;
        write_json(&video_dir.join("metadata.json"), video)?;

        if video.has_transcript.unwrap_or(false) {
            for suffix in ["_clean", "_timestamped"] {
                let src = transcript_dir.join(format!("{}{}.txt", video.video_id, suffix));
                if src.exists() {
                    std::fs::copy(&src, video_dir.join(format!("transcript{}.txt", suffix)))?;
                }
            }
        }

        if video.best_match.is_some() {
            copy_matches(video, repo_dir, &video_dir.join("code"))?;
        }

        index.videos.push(index_entry(video));
    }

    index.recount();
    write_json(&out_dir.join("index.json"), &index)?;

    info!("[DATASET] Dataset creation complete! Saved to {}", out_dir.display());
    info!("[DATASET] Total videos: {}", index.total_videos);
    info!("[DATASET] Videos with transcripts: {}", index.videos_with_transcripts);
    info!("[DATASET] Videos with code: {}", index.videos_with_code);
    Ok(index)
}

fn copy_matches(video: &VideoMeta, repo_dir: &Path, code_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(code_dir)?;
    for m in video.manim_code_matches.iter().flatten() {
        let src = repo_dir.join(&m.path);
        if src.is_dir() {
            copy_tree(&src, code_dir)?;
        } else if src.is_file() {
            if let Some(name) = src.file_name() {
                std::fs::copy(&src, code_dir.join(name))?;
            }
        } else {
            warn!("[DATASET] Source path not found: {}", src.display());
        }
    }
    Ok(())
}

fn index_entry(video: &VideoMeta) -> IndexEntry {
    IndexEntry {
        video_id: video.video_id.clone(),
        url: video.url.clone(),
        title: video.title.clone(),
        year: video.year,
        has_transcript: video.has_transcript.unwrap_or(false),
        has_code: video.best_match.is_some(),
        match_confidence: video.match_confidence.unwrap_or(0),
        best_match: video.best_match.clone(),
        match_type: video.match_type,
        manim_code_matches: video.manim_code_matches.clone().unwrap_or_default(),
        manually_matched: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{read_json, save_videos, CodeMatch, MatchType};

    #[test]
    fn test_build_dataset_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join("_2017/eola/chapter1")).unwrap();
        std::fs::write(repo.join("_2017/eola/chapter1/vectors.py"), "class Vectors: pass").unwrap();
        std::fs::write(repo.join("_2017/eola/intro.py"), "intro").unwrap();

        let transcripts = dir.path().join("transcripts");
        std::fs::create_dir_all(&transcripts).unwrap();
        std::fs::write(transcripts.join("fNk_zzaMoSs_clean.txt"), "vectors").unwrap();
        std::fs::write(transcripts.join("fNk_zzaMoSs_timestamped.txt"), "[00:00:00] vectors\n").unwrap();

        let videos = vec![
            VideoMeta {
                video_id: "fNk_zzaMoSs".into(),
                url: "https://www.youtube.com/watch?v=fNk_zzaMoSs".into(),
                title: "Vectors, what even are they?".into(),
                year: 2017,
                has_transcript: Some(true),
                manim_code_matches: Some(vec![CodeMatch { path: "_2017/eola".into(), score: 90 }]),
                best_match: Some("_2017/eola".into()),
                match_confidence: Some(90),
                match_type: Some(MatchType::Directory),
                ..Default::default()
            },
            VideoMeta {
                video_id: "nomatch".into(),
                title: "Unmatched".into(),
                year: 2017,
                ..Default::default()
            },
        ];
        let videos_file = dir.path().join("videos_with_code.json");
        save_videos(&videos_file, &videos).unwrap();

        let out = dir.path().join("dataset");
        let index = build_dataset(&videos_file, &transcripts, &repo, &out).unwrap();
        assert_eq!(index.total_videos, 2);
        assert_eq!(index.videos_with_transcripts, 1);
        assert_eq!(index.videos_with_code, 1);

        let vdir = out.join("fNk_zzaMoSs");
        assert!(vdir.join("metadata.json").exists());
        assert_eq!(std::fs::read_to_string(vdir.join("transcript_clean.txt")).unwrap(), "vectors");
        assert!(vdir.join("transcript_timestamped.txt").exists());
        assert!(vdir.join("code/intro.py").exists());
        assert!(vdir.join("code/chapter1/vectors.py").exists());
        assert!(!out.join("nomatch/code").exists());

        let on_disk: DatasetIndex = read_json(&out.join("index.json")).unwrap();
        assert_eq!(on_disk, index);
        assert_eq!(on_disk.videos[0].match_type, Some(MatchType::Directory));
    }
}
