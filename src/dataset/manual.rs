// ManimGen Manual Matcher
// Copyright (c) 2026 ManimGen
//
// Interactive terminal loop for pairing the videos the heuristic matcher
// missed. Input and output are generic so the loop can be scripted.

use anyhow::{bail, Result};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{copy_tree, read_json, watch_url, write_json, DatasetIndex, MatchType};

const PAGE_SIZE: usize = 20;

/// Year directories (`2016`, `_2019`, ...) at the top of the repo, sorted.
pub fn year_dirs(repo_dir: &Path) -> Vec<String> {
    let mut dirs: Vec<String> = std::fs::read_dir(repo_dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().to_str().map(String::from))
                .filter(|name| {
                    let year = name.strip_prefix('_').unwrap_or(name);
                    !year.is_empty() && year.chars().all(|c| c.is_ascii_digit())
                })
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}

fn dirs_for_year(all: &[String], year: i32) -> Vec<String> {
    let y = year.to_string();
    all.iter()
        .filter(|d| d.strip_prefix('_').unwrap_or(d) == y)
        .cloned()
        .collect()
}

/// Directories first, then `.py` files, then everything else.
fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    names.sort_by_key(|n| {
        let p = dir.join(n);
        let rank = if p.is_dir() {
            0
        } else if n.ends_with(".py") {
            1
        } else {
            2
        };
        (rank, n.clone())
    });
    names
}

/// Record a manual match in `index` and copy the code into the dataset.
pub fn add_match(
    index: &mut DatasetIndex,
    video_id: &str,
    rel_path: &str,
    repo_dir: &Path,
    dataset_dir: &Path,
) -> Result<()> {
    let src = repo_dir.join(rel_path);
    if !src.exists() {
        bail!("Path {} does not exist", src.display());
    }
    let match_type = MatchType::of(&src);

    let Some(entry) = index.videos.iter_mut().find(|v| v.video_id == video_id) else {
        bail!("Video {} is not in the index", video_id);
    };
    entry.has_code = true;
    entry.best_match = Some(rel_path.to_string());
    entry.match_type = Some(match_type);
    entry.match_confidence = 100;
    entry.manually_matched = true;
    let title = entry.title.clone();
    index.recount();

    let code_dir = dataset_dir.join(video_id).join("code");
    std::fs::create_dir_all(&code_dir)?;
    std::fs::write(
        code_dir.join("README.md"),
        format!(
            "# Code for: {}\n\n- Match confidence: 100 (manually matched)\n- Match type: {}\n- Path: {}\n",
            title,
            match_type.as_str(),
            rel_path
        ),
    )?;

    if src.is_dir() {
        copy_tree(&src, &code_dir)?;
    } else if let Some(name) = src.file_name() {
        std::fs::copy(&src, code_dir.join(name))?;
    }
    info!("[DATASET] Matched {} -> {}", title, rel_path);
    Ok(())
}

enum Step {
    Next,
    Again,
    Quit,
}

pub struct ManualMatcher<R, W> {
    input: R,
    out: W,
    dataset_dir: PathBuf,
    repo_dir: PathBuf,
}

impl<R: BufRead, W: Write> ManualMatcher<R, W> {
    pub fn new(input: R, out: W, dataset_dir: &Path, repo_dir: &Path) -> Self {
        Self {
            input,
            out,
            dataset_dir: dataset_dir.to_path_buf(),
            repo_dir: repo_dir.to_path_buf(),
        }
    }

    // `None` on end of input.
    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.out, "{}", prompt)?;
        self.out.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn confirm(&mut self, rel: &str) -> Result<bool> {
        Ok(self
            .ask(&format!("Use '{}' as the match? (y/n): ", rel))?
            .is_some_and(|a| a.eq_ignore_ascii_case("y")))
    }

    /// Walk every unmatched video. Returns the number of matches saved.
    pub fn run(&mut self) -> Result<usize> {
        let index_path = self.dataset_dir.join("index.json");
        let mut index: DatasetIndex = read_json(&index_path)?;

        let unmatched: Vec<(String, String, i32)> = index
            .unmatched()
            .iter()
            .map(|v| (v.video_id.clone(), v.title.clone(), v.year))
            .collect();
        if unmatched.is_empty() {
            writeln!(self.out, "All videos have been matched! Nothing to do.")?;
            return Ok(0);
        }
        writeln!(self.out, "Found {} unmatched videos.", unmatched.len())?;

        let years = year_dirs(&self.repo_dir);
        if years.is_empty() {
            bail!("No year directories found in {}", self.repo_dir.display());
        }
        writeln!(self.out, "\nAvailable year directories in the repository:")?;
        for d in &years {
            writeln!(self.out, "  - {}", d)?;
        }

        let backup = index_path.with_file_name(format!(
            "index.json.bak.{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ));
        std::fs::copy(&index_path, &backup)?;
        writeln!(self.out, "\nBackup of index saved to {}", backup.display())?;

        let mut made = 0;
        'videos: for (i, (video_id, title, year)) in unmatched.iter().enumerate() {
            writeln!(self.out, "\n{}", "=".repeat(80))?;
            writeln!(self.out, "Video {}/{}: {} ({})", i + 1, unmatched.len(), title, year)?;
            writeln!(self.out, "YouTube URL: {}", watch_url(video_id))?;

            let mut candidates = dirs_for_year(&years, *year);
            if candidates.is_empty() {
                writeln!(self.out, "No matching year directory found for {}.", year)?;
                candidates = [year - 1, year + 1]
                    .iter()
                    .flat_map(|y| dirs_for_year(&years, *y))
                    .collect();
                if !candidates.is_empty() {
                    writeln!(self.out, "Suggesting nearby years: {}", candidates.join(", "))?;
                }
            }

            loop {
                writeln!(
                    self.out,
                    "\nOptions:\n  1. Open YouTube video\n  2. Browse repository\n  3. Enter code path manually\n  4. Skip this video\n  5. Quit"
                )?;
                let Some(choice) = self.ask("\nEnter your choice (1-5): ")? else {
                    break 'videos;
                };
                let step = match choice.as_str() {
                    "1" => {
                        writeln!(self.out, "Open {} in your browser.", watch_url(video_id))?;
                        Step::Again
                    }
                    "2" => self.browse(&mut index, video_id, &candidates, &mut made)?,
                    "3" => self.enter_path(&mut index, video_id, &mut made)?,
                    "4" => {
                        writeln!(self.out, "Skipping video: {}", title)?;
                        Step::Next
                    }
                    "5" => Step::Quit,
                    _ => {
                        writeln!(self.out, "Invalid choice. Please try again.")?;
                        Step::Again
                    }
                };
                match step {
                    Step::Next => continue 'videos,
                    Step::Again => continue,
                    Step::Quit => break 'videos,
                }
            }
        }

        if made > 0 {
            write_json(&index_path, &index)?;
            writeln!(self.out, "\nSaved {} new matches to the dataset index.", made)?;
        } else {
            writeln!(self.out, "\nNo new matches were made.")?;
        }
        Ok(made)
    }

    fn enter_path(&mut self, index: &mut DatasetIndex, video_id: &str, made: &mut usize) -> Result<Step> {
        writeln!(
            self.out,
            "\nEnter the path to the code file or directory, relative to repository root.\nExamples: '_2018/fourier/main.py' or '_2018/fourier'"
        )?;
        let Some(path) = self.ask("Path: ")? else {
            return Ok(Step::Quit);
        };
        if path.is_empty() || !self.repo_dir.join(&path).exists() {
            writeln!(self.out, "Error: Path {} does not exist.", self.repo_dir.join(&path).display())?;
            return Ok(Step::Again);
        }
        if self.confirm(&path)? {
            add_match(index, video_id, &path, &self.repo_dir, &self.dataset_dir)?;
            *made += 1;
            return Ok(Step::Next);
        }
        Ok(Step::Again)
    }

    fn browse(
        &mut self,
        index: &mut DatasetIndex,
        video_id: &str,
        candidates: &[String],
        made: &mut usize,
    ) -> Result<Step> {
        if candidates.is_empty() {
            writeln!(self.out, "No potential year directories found.")?;
            return Ok(Step::Again);
        }
        writeln!(self.out, "\nPotential year directories:")?;
        for (i, d) in candidates.iter().enumerate() {
            writeln!(self.out, "  {}. {}", i + 1, d)?;
        }
        let Some(pick) = self.ask("\nSelect a directory (number) or enter another directory name: ")? else {
            return Ok(Step::Quit);
        };
        let selected = match pick.parse::<usize>() {
            Ok(n) if (1..=candidates.len()).contains(&n) => candidates[n - 1].clone(),
            _ => pick,
        };

        let mut dir = self.repo_dir.join(&selected);
        if selected.is_empty() || !dir.is_dir() {
            writeln!(self.out, "Directory {} not found.", dir.display())?;
            return Ok(Step::Again);
        }

        let mut items = listing(&dir);
        let mut page = 0;
        loop {
            let pages = items.len().div_ceil(PAGE_SIZE).max(1);
            writeln!(self.out, "\nBrowsing {} (page {}/{}):", dir.display(), page + 1, pages)?;
            let start = page * PAGE_SIZE;
            for (i, item) in items.iter().enumerate().skip(start).take(PAGE_SIZE) {
                let tag = if dir.join(item).is_dir() { "[DIR] " } else { "" };
                writeln!(self.out, "  {}. {}{}", i + 1, tag, item)?;
            }

            let Some(nav) = self.ask(
                "\nEnter item number to select, 'n' for next page, 'p' for previous, or 'q' to go back: ",
            )?
            else {
                return Ok(Step::Quit);
            };
            match nav.as_str() {
                "n" if page + 1 < pages => page += 1,
                "p" if page > 0 => page -= 1,
                "q" => return Ok(Step::Again),
                _ => {
                    let Some(item) = nav
                        .parse::<usize>()
                        .ok()
                        .filter(|n| (1..=items.len()).contains(n))
                        .map(|n| items[n - 1].clone())
                    else {
                        continue;
                    };
                    let path = dir.join(&item);
                    if path.is_dir() {
                        dir = path;
                        items = listing(&dir);
                        page = 0;
                        continue;
                    }
                    let rel = path
                        .strip_prefix(&self.repo_dir)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .into_owned();
                    if self.confirm(&rel)? {
                        add_match(index, video_id, &rel, &self.repo_dir, &self.dataset_dir)?;
                        *made += 1;
                        return Ok(Step::Next);
                    }
                }
            }
        }
    }
}
