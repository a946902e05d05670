// ManimGen Code Matcher
// Copyright (c) 2026 ManimGen
//
// Heuristic pairing of videos with source in the 3b1b/videos repository.
// Only the video's year directories are searched.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::{load_videos, save_videos, CodeMatch, MatchType, VideoMeta};

pub const VIDEOS_REPO_URL: &str = "https://github.com/3b1b/videos.git";
/// Matches must score strictly above this.
pub const MIN_SCORE: u32 = 60;
pub const HIGH_CONFIDENCE: u32 = 80;
const MAX_MATCHES: usize = 3;

/// Lowercase and strip everything that isn't a word character or whitespace.
pub fn clean_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

/// Indel similarity in 0..=100.
pub fn fuzz_ratio(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100;
    }
    let lcs = lcs_len(&a, &b);
    ((200 * lcs) as f64 / total as f64).round() as u32
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

pub fn file_score(path: &Path, title: &str) -> u32 {
    if !path.exists() {
        return 0;
    }
    let title = clean_title(title);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default();
    let mut score = fuzz_ratio(&title, &clean_title(&stem));

    if path.extension().and_then(|e| e.to_str()) == Some("py") {
        score += 10;
        match std::fs::read(path) {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes).to_lowercase();
                if content.contains(&title) {
                    score += 30;
                }
                let mut words: Vec<&str> = title.split_whitespace().collect();
                words.sort_unstable();
                words.dedup();
                score += 5 * words
                    .iter()
                    .filter(|w| w.chars().count() > 4 && content.contains(*w))
                    .count() as u32;
            }
            Err(e) => warn!("[DATASET] Error reading {}: {}", path.display(), e),
        }
    }
    score
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut items: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(_) => Vec::new(),
    };
    items.sort();
    items
}

/// Top candidates for one video, best first.
pub fn find_matches(video: &VideoMeta, repo_dir: &Path) -> Vec<CodeMatch> {
    let mut found: Vec<(PathBuf, u32)> = Vec::new();

    for year_dir in [format!("_{}", video.year), video.year.to_string()] {
        let year_path = repo_dir.join(year_dir);
        if !year_path.is_dir() {
            continue;
        }
        for item in sorted_entries(&year_path) {
            if item.is_dir() {
                for entry in WalkDir::new(&item).into_iter().filter_map(|e| e.ok()) {
                    let p = entry.path();
                    if entry.file_type().is_file()
                        && p.extension().and_then(|e| e.to_str()) == Some("py")
                    {
                        let score = file_score(p, &video.title);
                        if score > MIN_SCORE {
                            found.push((p.to_path_buf(), score));
                        }
                    }
                }
            }
            let score = file_score(&item, &video.title);
            if score > MIN_SCORE {
                found.push((item, score));
            }
        }
    }

    found.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    found
        .into_iter()
        .take(MAX_MATCHES)
        .map(|(path, score)| CodeMatch {
            path: path
                .strip_prefix(repo_dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned(),
            score,
        })
        .collect()
}

/// Record `matches` on the video, resetting the fields when empty.
pub fn apply_matches(video: &mut VideoMeta, matches: Vec<CodeMatch>, repo_dir: &Path) {
    match matches.first() {
        Some(best) => {
            video.best_match = Some(best.path.clone());
            video.match_confidence = Some(best.score);
            video.match_type = Some(MatchType::of(&repo_dir.join(&best.path)));
        }
        None => {
            video.best_match = None;
            video.match_confidence = Some(0);
            video.match_type = None;
        }
    }
    video.manim_code_matches = Some(matches);
}

pub fn with_code_path(videos_file: &Path) -> PathBuf {
    let stem = videos_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "videos".to_string());
    videos_file.with_file_name(format!("{}_with_code.json", stem))
}

#[derive(Debug, Default, PartialEq)]
pub struct MatchSummary {
    pub total: usize,
    pub matched: usize,
    pub high_confidence: usize,
    pub low_confidence: usize,
}

/// Match every video and write `{stem}_with_code.json` next to the input.
pub fn match_all(videos_file: &Path, repo_dir: &Path) -> Result<(PathBuf, MatchSummary)> {
    let mut videos = load_videos(videos_file)?;
    let total = videos.len();

    for (i, video) in videos.iter_mut().enumerate() {
        info!("[DATASET] Processing {}/{}: {}", i + 1, total, video.title);
        let matches = find_matches(video, repo_dir);
        apply_matches(video, matches, repo_dir);
    }

    let out = with_code_path(videos_file);
    save_videos(&out, &videos)?;

    let confidence = |v: &VideoMeta| v.match_confidence.unwrap_or(0);
    let summary = MatchSummary {
        total,
        matched: videos.iter().filter(|v| v.best_match.is_some()).count(),
        high_confidence: videos.iter().filter(|v| confidence(v) >= HIGH_CONFIDENCE).count(),
        low_confidence: videos
            .iter()
            .filter(|v| (1..MIN_SCORE).contains(&confidence(v)))
            .count(),
    };

    info!(
        "[DATASET] Matching complete. Found potential code for {}/{} videos.",
        summary.matched, summary.total
    );
    info!("[DATASET] High confidence matches: {}", summary.high_confidence);
    info!(
        "[DATASET] Low confidence matches: {} (may need manual review)",
        summary.low_confidence
    );
    Ok((out, summary))
}

/// Clone `url` into `dir`, or pull if it's already there.
pub async fn sync_repo(url: &str, dir: &Path) -> Result<()> {
    let mut cmd = Command::new("git");
    if dir.exists() {
        info!("[DATASET] Repository already exists at {}, pulling", dir.display());
        cmd.arg("-C").arg(dir).arg("pull");
    } else {
        info!("[DATASET] Cloning {} to {}", url, dir.display());
        cmd.arg("clone").arg(url).arg(dir);
    }

    let status = cmd.status().await.context("failed to run git")?;
    if !status.success() {
        bail!("git exited with {}", status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(title: &str, year: i32) -> VideoMeta {
        VideoMeta {
            video_id: "vid".into(),
            title: title.into(),
            year,
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("But what IS a Neural Network? | Ch. 1"), "but what is a neural network  ch 1");
        assert_eq!(clean_title("e^(iπ) in 3.14 minutes"), "eiπ in 314 minutes");
    }

    #[test]
    fn test_fuzz_ratio() {
        assert_eq!(fuzz_ratio("", ""), 100);
        assert_eq!(fuzz_ratio("abc", ""), 0);
        assert_eq!(fuzz_ratio("fourier", "fourier"), 100);
        // lcs("kitten", "sitting") = 4 -> 2*4/13
        assert_eq!(fuzz_ratio("kitten", "sitting"), 62);
    }

    #[test]
    fn test_file_score_bonuses() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fourier_series.py");
        std::fs::write(&file, "# Fourier series drawing\nclass FourierCirclesScene: pass\n").unwrap();

        // exact stem 100 + py 10 + title in content 30 + "fourier" 5 + "series" 5
        assert_eq!(file_score(&file, "Fourier Series"), 150);
        assert_eq!(file_score(&dir.path().join("missing.py"), "Fourier Series"), 0);
    }

    #[test]
    fn test_find_matches_scans_year_dirs() {
        let repo = tempfile::tempdir().unwrap();
        let y = repo.path().join("_2019/diffyq");
        std::fs::create_dir_all(&y).unwrap();
        std::fs::write(y.join("part1.py"), "differential equations intro").unwrap();
        std::fs::write(repo.path().join("_2019/unrelated.py"), "nothing").unwrap();
        std::fs::create_dir_all(repo.path().join("_2018")).unwrap();
        std::fs::write(repo.path().join("_2018/diffyq.py"), "").unwrap();

        let v = video("Differential equations", 2019);
        let matches = find_matches(&v, repo.path());
        assert!(!matches.is_empty());
        assert!(matches.len() <= 3);
        assert_eq!(matches[0].path, "_2019/diffyq/part1.py");
        assert!(matches.iter().all(|m| m.score > MIN_SCORE));
        assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(!matches.iter().any(|m| m.path.starts_with("_2018")));
    }

    #[test]
    fn test_match_all_writes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join("_2020")).unwrap();
        std::fs::write(repo.join("_2020/hamming_codes.py"), "hamming codes and parity").unwrap();

        let videos_file = dir.path().join("videos.json");
        save_videos(
            &videos_file,
            &[video("Hamming codes", 2020), video("Something else entirely", 2020)],
        )
        .unwrap();

        let (out, summary) = match_all(&videos_file, &repo).unwrap();
        assert_eq!(out, dir.path().join("videos_with_code.json"));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.matched, 1);

        let written = load_videos(&out).unwrap();
        assert_eq!(written[0].best_match.as_deref(), Some("_2020/hamming_codes.py"));
        assert_eq!(written[0].match_type, Some(MatchType::File));
        assert_eq!(written[1].best_match, None);
        assert_eq!(written[1].match_confidence, Some(0));
    }
}
