// ManimGen Data Collector
// Copyright (c) 2026 ManimGen
//
// Append-only JSON-lines log of generation attempts, one file per UTC month.
// Feedback arrives later and is patched in by rewriting the whole file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::agent::task_store::TaskStatus;
use crate::error::{Error, Result};

const FILE_PREFIX: &str = "generation_attempts_";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutcome {
    pub status: TaskStatus,
    pub error: Option<String>,
    pub video_url: Option<String>,
    /// Seconds from pipeline start to the outcome.
    pub render_time: f64,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    pub model: String,
    pub quality: String,
    pub resolution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationMetadata {
    pub llm_response_time: f64,
    pub used_fallback_template: bool,
    pub sanitization_changes: Vec<String>,
    pub llm_config: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub is_positive: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub model_version: String,
    pub system_prompt: String,
    pub user_query: String,
    pub generated_code: String,
    pub execution_outcome: ExecutionOutcome,
    pub generation_metadata: GenerationMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

pub struct DataCollector {
    data_dir: PathBuf,
    // Serializes appends against whole-file rewrites.
    write_lock: Mutex<()>,
}

impl DataCollector {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn file_for(&self, when: DateTime<Utc>) -> PathBuf {
        self.data_dir
            .join(format!("{}{}{}", FILE_PREFIX, when.format("%Y%m"), FILE_SUFFIX))
    }

    /// Append one record to its month's file. Ids must be unique per file.
    pub async fn log_attempt(&self, record: &AttemptRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.file_for(record.timestamp);

        if tokio::fs::try_exists(&path).await? {
            let existing = tokio::fs::read_to_string(&path).await?;
            if find_line(&existing, &record.id).is_some() {
                return Err(Error::InvalidRequest(format!(
                    "attempt {} already logged in {:?}",
                    record.id, path
                )));
            }
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!(
            "[COLLECTOR] Logged attempt {} ({}) to {:?}",
            record.id, record.execution_outcome.status, path
        );
        Ok(())
    }

    /// Set (or clear, with `remove`) the feedback on the record with this id.
    /// The newest monthly file is searched first. Returns the patched record,
    /// or `None` when the line is patched but is an older shape that no longer
    /// parses as an `AttemptRecord`.
    pub async fn update_feedback(
        &self,
        task_id: &str,
        is_positive: bool,
        remove: bool,
    ) -> Result<Option<AttemptRecord>> {
        let _guard = self.write_lock.lock().await;

        let feedback = (!remove).then(|| Feedback {
            is_positive,
            timestamp: Utc::now(),
        });

        let files = self.monthly_files()?;
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || {
            for path in files.iter().rev() {
                if let Some(patched) = patch_file(path, &task_id, feedback.as_ref())? {
                    info!(
                        "[COLLECTOR] Feedback for {} {} in {:?}",
                        task_id,
                        if feedback.is_some() { "recorded" } else { "removed" },
                        path
                    );
                    return Ok(match serde_json::from_value::<AttemptRecord>(patched) {
                        Ok(record) => Some(record),
                        Err(e) => {
                            debug!("[COLLECTOR] Patched legacy record {}: {}", task_id, e);
                            None
                        }
                    });
                }
            }
            Err(Error::NotFound(format!("No generation attempt found for task {}", task_id)))
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    /// Every monthly file, oldest first.
    pub fn monthly_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX) {
                files.push(path);
            }
        }
        // YYYYMM sorts lexically.
        files.sort();
        Ok(files)
    }

    /// All records across all months. Lines that fail to parse are skipped.
    pub fn load_attempts(&self) -> Result<Vec<AttemptRecord>> {
        let mut attempts = Vec::new();
        for path in self.monthly_files()? {
            let content = std::fs::read_to_string(&path)?;
            for (n, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AttemptRecord>(line) {
                    Ok(record) => attempts.push(record),
                    Err(e) => warn!("[COLLECTOR] Skipping {:?}:{}: {}", path, n + 1, e),
                }
            }
        }
        Ok(attempts)
    }
}

// Index of the line whose record carries this id.
fn find_line(content: &str, id: &str) -> Option<usize> {
    content.lines().position(|line| {
        serde_json::from_str::<Value>(line)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(|s| s == id))
            .unwrap_or(false)
    })
}

// Rewrites `path` with the matching record's feedback replaced. Other lines
// are written back byte-for-byte. Returns the patched line as raw JSON, or
// None if the id isn't in this file.
fn patch_file(path: &Path, id: &str, feedback: Option<&Feedback>) -> Result<Option<Value>> {
    let content = std::fs::read_to_string(path)?;
    let Some(index) = find_line(&content, id) else {
        return Ok(None);
    };

    let lines: Vec<&str> = content.lines().collect();
    let mut value: Value = serde_json::from_str(lines[index])?;
    match (feedback, value.as_object_mut()) {
        (Some(fb), Some(obj)) => {
            obj.insert("feedback".to_string(), serde_json::to_value(fb)?);
        }
        (None, Some(obj)) => {
            obj.remove("feedback");
        }
        (_, None) => {
            return Err(Error::InvalidRequest(format!("record {} is not a JSON object", id)));
        }
    }
    let patched_line = serde_json::to_string(&value)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    for (i, line) in lines.iter().enumerate() {
        if i == index {
            writeln!(tmp, "{}", patched_line)?;
        } else {
            writeln!(tmp, "{}", line)?;
        }
    }
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    debug!("[COLLECTOR] Rewrote {:?} ({} lines)", path, lines.len());

    Ok(Some(value))
}

/// Success/failure pairs for the same user query, for preference training.
pub fn preference_pairs(attempts: &[AttemptRecord]) -> Vec<(&AttemptRecord, &AttemptRecord)> {
    let mut by_query: BTreeMap<&str, Vec<&AttemptRecord>> = BTreeMap::new();
    for attempt in attempts {
        by_query.entry(attempt.user_query.as_str()).or_default().push(attempt);
    }

    let mut pairs = Vec::new();
    for group in by_query.values() {
        let successes = group
            .iter()
            .filter(|a| a.execution_outcome.status == TaskStatus::Completed);
        for success in successes {
            for failure in group
                .iter()
                .filter(|a| a.execution_outcome.status == TaskStatus::Failed)
            {
                pairs.push((*success, *failure));
            }
        }
    }
    pairs
}

/// Scalar reward: outcome dominates, user feedback nudges it.
pub fn reward(attempt: &AttemptRecord) -> f64 {
    let base = match attempt.execution_outcome.status {
        TaskStatus::Completed => 1.0,
        TaskStatus::Failed => -1.0,
        _ => 0.0,
    };
    let nudge = match &attempt.feedback {
        Some(fb) if fb.is_positive => 0.5,
        Some(_) => -0.5,
        None => 0.0,
    };
    base + nudge
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn record(id: &str, query: &str, status: TaskStatus, when: DateTime<Utc>) -> AttemptRecord {
        AttemptRecord {
            id: id.to_string(),
            timestamp: when,
            model_version: "mistral".to_string(),
            system_prompt: "SYSTEM".to_string(),
            user_query: query.to_string(),
            generated_code: "from manim import *".to_string(),
            execution_outcome: ExecutionOutcome {
                status,
                error: (status == TaskStatus::Failed).then(|| "Manim error".to_string()),
                video_url: None,
                render_time: 1.5,
                stdout: None,
                stderr: None,
            },
            generation_metadata: GenerationMetadata {
                llm_response_time: 0.2,
                used_fallback_template: false,
                sanitization_changes: vec![],
                llm_config: LlmConfig {
                    model: "mistral".to_string(),
                    quality: "low".to_string(),
                    resolution: "720p".to_string(),
                },
            },
            feedback: None,
            extensions: None,
        }
    }

    fn march() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn april() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_monthly_file_naming() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataCollector::new(dir.path()).unwrap();
        let path = c.file_for(march());
        assert_eq!(path.file_name().unwrap(), "generation_attempts_202603.jsonl");
    }

    #[tokio::test]
    async fn test_append_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataCollector::new(dir.path()).unwrap();
        c.log_attempt(&record("a", "circle", TaskStatus::Completed, march())).await.unwrap();
        c.log_attempt(&record("b", "circle", TaskStatus::Failed, march())).await.unwrap();
        c.log_attempt(&record("c", "square", TaskStatus::Completed, april())).await.unwrap();

        assert_eq!(c.monthly_files().unwrap().len(), 2);
        let all = c.load_attempts().unwrap();
        assert_eq!(all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataCollector::new(dir.path()).unwrap();
        c.log_attempt(&record("a", "q", TaskStatus::Completed, march())).await.unwrap();
        let err = c
            .log_attempt(&record("a", "q", TaskStatus::Failed, march()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(c.load_attempts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_patch_keeps_file_valid() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataCollector::new(dir.path()).unwrap();
        for id in ["a", "b", "c"] {
            c.log_attempt(&record(id, "q", TaskStatus::Completed, march())).await.unwrap();
        }
        let path = c.file_for(march());
        let before = std::fs::read_to_string(&path).unwrap();

        let patched = c.update_feedback("b", true, false).await.unwrap().unwrap();
        assert!(patched.feedback.as_ref().unwrap().is_positive);

        let after = std::fs::read_to_string(&path).unwrap();
        let before_lines: Vec<&str> = before.lines().collect();
        let after_lines: Vec<&str> = after.lines().collect();
        assert_eq!(after_lines.len(), 3);
        assert_eq!(after_lines[0], before_lines[0]);
        assert_eq!(after_lines[2], before_lines[2]);
        for line in &after_lines {
            serde_json::from_str::<AttemptRecord>(line).unwrap();
        }
        assert!(after.ends_with('\n'));

        let removed = c.update_feedback("b", true, true).await.unwrap().unwrap();
        assert!(removed.feedback.is_none());
        let again = std::fs::read_to_string(&path).unwrap();
        assert!(!again.lines().nth(1).unwrap().contains("feedback"));
    }

    #[tokio::test]
    async fn test_feedback_preserves_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataCollector::new(dir.path()).unwrap();
        let mut value = serde_json::to_value(record("x", "q", TaskStatus::Failed, march())).unwrap();
        value["annotator_note"] = Value::String("keep me".into());
        std::fs::write(c.file_for(march()), format!("{}\n", value)).unwrap();

        c.update_feedback("x", false, false).await.unwrap();
        let content = std::fs::read_to_string(c.file_for(march())).unwrap();
        assert!(content.contains("\"annotator_note\":\"keep me\""));
        assert!(content.contains("\"is_positive\":false"));
    }

    #[tokio::test]
    async fn test_feedback_on_legacy_record() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataCollector::new(dir.path()).unwrap();
        let mut value = serde_json::to_value(record("legacy", "q", TaskStatus::Completed, march())).unwrap();
        value.as_object_mut().unwrap().remove("generation_metadata");
        std::fs::write(c.file_for(march()), format!("{}\n", value)).unwrap();

        let patched = c.update_feedback("legacy", true, false).await.unwrap();
        assert!(patched.is_none());

        let content = std::fs::read_to_string(c.file_for(march())).unwrap();
        let line: Value = serde_json::from_str(content.trim_end()).unwrap();
        assert_eq!(line["feedback"]["is_positive"], Value::Bool(true));
        assert!(line.get("generation_metadata").is_none());
        assert_eq!(line["user_query"], "q");
    }

    #[tokio::test]
    async fn test_feedback_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataCollector::new(dir.path()).unwrap();
        c.log_attempt(&record("a", "q", TaskStatus::Completed, march())).await.unwrap();
        let err = c.update_feedback("zzz", true, false).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_feedback_searches_older_months() {
        let dir = tempfile::tempdir().unwrap();
        let c = DataCollector::new(dir.path()).unwrap();
        c.log_attempt(&record("old", "q", TaskStatus::Completed, march())).await.unwrap();
        c.log_attempt(&record("new", "q", TaskStatus::Completed, april())).await.unwrap();

        c.update_feedback("old", true, false).await.unwrap();
        let march_content = std::fs::read_to_string(c.file_for(march())).unwrap();
        assert!(march_content.contains("feedback"));
        let april_content = std::fs::read_to_string(c.file_for(april())).unwrap();
        assert!(!april_content.contains("feedback"));
    }

    #[test]
    fn test_preference_pairs() {
        let t = march();
        let attempts = vec![
            record("1", "circle", TaskStatus::Completed, t),
            record("2", "circle", TaskStatus::Failed, t),
            record("3", "circle", TaskStatus::Failed, t),
            record("4", "square", TaskStatus::Failed, t),
        ];
        let pairs = preference_pairs(&attempts);
        let ids: Vec<(&str, &str)> = pairs.iter().map(|(a, b)| (a.id.as_str(), b.id.as_str())).collect();
        assert_eq!(ids, vec![("1", "2"), ("1", "3")]);
    }

    #[test]
    fn test_reward() {
        let t = march();
        let mut ok = record("1", "q", TaskStatus::Completed, t);
        assert_eq!(reward(&ok), 1.0);
        ok.feedback = Some(Feedback { is_positive: false, timestamp: t });
        assert_eq!(reward(&ok), 0.5);
        assert_eq!(reward(&record("2", "q", TaskStatus::Failed, t)), -1.0);
        assert_eq!(reward(&record("3", "q", TaskStatus::Pending, t)), 0.0);
    }
}
