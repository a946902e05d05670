// ManimGen Dataset Reports
// Copyright (c) 2026 ManimGen
//
// Read-only reports over a built `index.json`. Charts are not produced; every
// number that would feed one is in the returned structs.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use super::{watch_url, write_json, DatasetIndex, IndexEntry};

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "on", "in", "to", "for", "of", "with",
];
const TOP_WORDS: usize = 15;
const SAMPLES_PER_BUCKET: usize = 3;

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

// ---------------------------------------------------------------------------
// Missing videos
// ---------------------------------------------------------------------------

pub fn missing_by_year(index: &DatasetIndex) -> BTreeMap<i32, Vec<&IndexEntry>> {
    let mut by_year: BTreeMap<i32, Vec<&IndexEntry>> = BTreeMap::new();
    for v in index.unmatched() {
        by_year.entry(v.year).or_default().push(v);
    }
    by_year
}

pub fn format_missing(index: &DatasetIndex) -> String {
    if index.videos.is_empty() {
        return "No videos found in dataset\n".to_string();
    }
    let by_year = missing_by_year(index);
    if by_year.is_empty() {
        return "All videos have matching code!\n".to_string();
    }

    let missing: usize = by_year.values().map(Vec::len).sum();
    let mut out = format!(
        "Found {} videos without matching code out of {} total videos\n\n=== Videos Missing Code By Year ===\n",
        missing,
        index.videos.len()
    );
    for (year, videos) in &by_year {
        out.push_str(&format!("\n== {} ({} videos) ==\n", year, videos.len()));
        for (i, v) in videos.iter().enumerate() {
            out.push_str(&format!("{}. {}\n   URL: {}\n\n", i + 1, v.title, watch_url(&v.video_id)));
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct YearRatio {
    pub year: i32,
    pub unmatched: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NearMiss {
    pub title: String,
    pub score: u32,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MissingAnalysis {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub by_year: Vec<YearRatio>,
    pub top_words: Vec<(String, usize)>,
    pub near_misses: Vec<NearMiss>,
    /// (threshold, videos whose best rejected candidate reaches it)
    pub thresholds: Vec<(u32, usize)>,
    pub recommendations: Vec<String>,
}

/// Look for patterns among unmatched videos and write
/// `unmatched_videos.json` into `out_dir`.
pub fn analyze_missing(index: &DatasetIndex, out_dir: &Path) -> Result<MissingAnalysis> {
    std::fs::create_dir_all(out_dir)?;
    let unmatched = index.unmatched();

    let mut totals: BTreeMap<i32, usize> = BTreeMap::new();
    for v in &index.videos {
        *totals.entry(v.year).or_default() += 1;
    }
    let by_year: Vec<YearRatio> = missing_by_year(index)
        .into_iter()
        .map(|(year, vs)| YearRatio {
            year,
            unmatched: vs.len(),
            total: totals.get(&year).copied().unwrap_or(0),
        })
        .collect();

    let mut word_counts: HashMap<String, usize> = HashMap::new();
    for v in &unmatched {
        for w in v.title.to_lowercase().split_whitespace() {
            if !STOPWORDS.contains(&w) {
                *word_counts.entry(w.to_string()).or_default() += 1;
            }
        }
    }
    let mut top_words: Vec<(String, usize)> = word_counts.into_iter().collect();
    top_words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_words.truncate(TOP_WORDS);

    let mut near_misses: Vec<NearMiss> = unmatched
        .iter()
        .filter_map(|v| {
            v.manim_code_matches
                .iter()
                .max_by_key(|m| m.score)
                .map(|m| NearMiss {
                    title: v.title.clone(),
                    score: m.score,
                    path: m.path.clone(),
                })
        })
        .collect();
    near_misses.sort_by(|a, b| b.score.cmp(&a.score));

    let thresholds: Vec<(u32, usize)> = if near_misses.is_empty() {
        Vec::new()
    } else {
        (10..50)
            .step_by(5)
            .map(|t| (t, near_misses.iter().filter(|m| m.score >= t).count()))
            .collect()
    };

    let mut recommendations = Vec::new();
    if let Some(worst) = by_year
        .iter()
        .max_by(|a, b| a.unmatched.cmp(&b.unmatched).then_with(|| b.year.cmp(&a.year)))
    {
        recommendations.push(format!(
            "Focus on {} videos which have the most unmatched content.",
            worst.year
        ));
    }
    if near_misses.iter().any(|m| m.score > 30) {
        recommendations.push(
            "Consider lowering the confidence threshold to 30-40 for more matches (with manual verification)."
                .to_string(),
        );
    }
    if !unmatched.is_empty() {
        let first: Vec<&str> = unmatched.iter().take(5).map(|v| v.title.as_str()).collect();
        recommendations.push(format!(
            "For manual matching, start with: {}",
            first.join("; ")
        ));
    }

    write_json(&out_dir.join("unmatched_videos.json"), &unmatched)?;

    Ok(MissingAnalysis {
        total: index.videos.len(),
        matched: index.videos.len() - unmatched.len(),
        unmatched: unmatched.len(),
        by_year,
        top_words,
        near_misses,
        thresholds,
        recommendations,
    })
}

impl fmt::Display for MissingAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total videos: {}", self.total)?;
        writeln!(f, "Matched videos: {} ({:.1}%)", self.matched, pct(self.matched, self.total))?;
        writeln!(f, "Unmatched videos: {} ({:.1}%)", self.unmatched, pct(self.unmatched, self.total))?;
        if self.unmatched == 0 {
            return Ok(());
        }

        writeln!(f, "\n===== ANALYSIS OF UNMATCHED VIDEOS =====\n\nDistribution by year:")?;
        for y in &self.by_year {
            writeln!(
                f,
                "  {}: {}/{} videos unmatched ({:.1}%)",
                y.year,
                y.unmatched,
                y.total,
                pct(y.unmatched, y.total)
            )?;
        }

        writeln!(f, "\nCommon words in unmatched video titles:")?;
        for (word, count) in &self.top_words {
            writeln!(f, "  {}: {} occurrences", word, count)?;
        }

        if !self.near_misses.is_empty() {
            writeln!(f, "\nVideos that had potential matches but below threshold:")?;
            for m in &self.near_misses {
                writeln!(f, "  {} (score: {}) -> {}", m.title, m.score, m.path)?;
            }
            for (t, n) in &self.thresholds {
                writeln!(f, "  With threshold {}: {} additional matches", t, n)?;
            }
        }

        writeln!(f, "\nRECOMMENDATIONS:")?;
        for (i, r) in self.recommendations.iter().enumerate() {
            writeln!(f, "{}. {}", i + 1, r)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Match quality
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Sample {
    pub title: String,
    pub best_match: Option<String>,
    pub confidence: u32,
    pub match_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QualityReport {
    pub total: usize,
    pub matched: usize,
    pub average: f64,
    pub min: u32,
    pub max: u32,
    pub very_high: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub type_counts: BTreeMap<String, usize>,
    pub year_dir_counts: BTreeMap<String, usize>,
    pub samples: Vec<(String, Vec<Sample>)>,
}

fn bucket(confidence: u32) -> usize {
    match confidence {
        100.. => 0,
        80..=99 => 1,
        60..=79 => 2,
        _ => 3,
    }
}

const BUCKET_NAMES: [&str; 4] = [
    "VERY HIGH CONFIDENCE",
    "HIGH CONFIDENCE",
    "MEDIUM CONFIDENCE",
    "LOW CONFIDENCE",
];

/// Year directory a match path lives in (`_2019/x.py` -> `2019`).
pub fn year_dir(path: &str) -> String {
    if path.starts_with("_20") || path.starts_with("20") {
        path.split('/').next().unwrap_or_default().replace('_', "")
    } else {
        "unknown".to_string()
    }
}

/// `None` when nothing in the index has code.
pub fn match_quality(index: &DatasetIndex, seed: u64) -> Option<QualityReport> {
    let matched: Vec<&IndexEntry> = index.videos.iter().filter(|v| v.has_code).collect();
    if matched.is_empty() {
        return None;
    }

    let scores: Vec<u32> = matched.iter().map(|v| v.match_confidence).collect();
    let mut buckets: [Vec<&IndexEntry>; 4] = Default::default();
    for &v in &matched {
        buckets[bucket(v.match_confidence)].push(v);
    }

    let mut type_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut year_dir_counts: BTreeMap<String, usize> = BTreeMap::new();
    for v in &matched {
        let t = v.match_type.map(|t| t.as_str()).unwrap_or("unknown");
        *type_counts.entry(t.to_string()).or_default() += 1;
        let y = year_dir(v.best_match.as_deref().unwrap_or_default());
        *year_dir_counts.entry(y).or_default() += 1;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let samples = buckets
        .iter()
        .zip(BUCKET_NAMES)
        .filter(|(b, _)| !b.is_empty())
        .map(|(b, name)| {
            let picked = b
                .choose_multiple(&mut rng, SAMPLES_PER_BUCKET)
                .map(|v| Sample {
                    title: v.title.clone(),
                    best_match: v.best_match.clone(),
                    confidence: v.match_confidence,
                    match_type: v.match_type.map(|t| t.as_str()).unwrap_or("unknown").to_string(),
                    url: watch_url(&v.video_id),
                })
                .collect();
            (name.to_string(), picked)
        })
        .collect();

    Some(QualityReport {
        total: index.videos.len(),
        matched: matched.len(),
        average: scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64,
        min: scores.iter().copied().min().unwrap_or(0),
        max: scores.iter().copied().max().unwrap_or(0),
        very_high: buckets[0].len(),
        high: buckets[1].len(),
        medium: buckets[2].len(),
        low: buckets[3].len(),
        type_counts,
        year_dir_counts,
        samples,
    })
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.matched;
        writeln!(f, "Analyzing {} matched videos out of {} total videos\n", n, self.total)?;
        writeln!(f, "=== Confidence Score Analysis ===")?;
        writeln!(f, "Average confidence: {:.2}", self.average)?;
        writeln!(f, "Minimum confidence: {}", self.min)?;
        writeln!(f, "Maximum confidence: {}", self.max)?;
        for (label, count) in [
            ("Very high confidence (>=100)", self.very_high),
            ("High confidence (80-99)", self.high),
            ("Medium confidence (60-79)", self.medium),
            ("Low confidence (<60)", self.low),
        ] {
            writeln!(f, "{}: {} videos ({:.1}%)", label, count, pct(count, n))?;
        }

        writeln!(f, "\n=== Directory vs File Analysis ===")?;
        for (t, c) in &self.type_counts {
            writeln!(f, "{}: {} videos ({:.1}%)", t, c, pct(*c, n))?;
        }

        writeln!(f, "\n=== Match Path Analysis ===\nMatch distribution by year directory:")?;
        for (y, c) in &self.year_dir_counts {
            writeln!(f, "{}: {} videos ({:.1}%)", y, c, pct(*c, n))?;
        }

        writeln!(f, "\n=== Random Sample of Matches for Verification ===")?;
        for (name, samples) in &self.samples {
            writeln!(f, "\n--- {} SAMPLES ---", name)?;
            for s in samples {
                writeln!(f, "Video: {}", s.title)?;
                writeln!(f, "Match: {}", s.best_match.as_deref().unwrap_or("None"))?;
                writeln!(f, "Confidence: {}", s.confidence)?;
                writeln!(f, "Type: {}", s.match_type)?;
                writeln!(f, "URL: {}\n", s.url)?;
            }
        }
        Ok(())
    }
}
