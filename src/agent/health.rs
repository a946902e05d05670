// ManimGen Dependency Check
// Copyright (c) 2026 ManimGen
//
// Reports whether the external programs the service shells out to are
// reachable, plus the Ollama server.

use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::Config;

/// Health status of a subsystem
#[derive(Debug, Clone, PartialEq)]
pub enum SubsystemStatus {
    Healthy(String),
    Down(String),
}

impl SubsystemStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, SubsystemStatus::Healthy(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependencyReport {
    pub name: String,
    pub required_for: &'static str,
    pub status: SubsystemStatus,
}

/// Run `<binary> --version` and keep the first line of output.
pub async fn probe_binary(binary: &str) -> SubsystemStatus {
    match Command::new(binary).arg("--version").output().await {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            let first = text.lines().next().unwrap_or("").trim();
            SubsystemStatus::Healthy(if first.is_empty() {
                "ok".to_string()
            } else {
                first.to_string()
            })
        }
        Ok(out) => SubsystemStatus::Down(format!("exited with {}", out.status)),
        Err(e) => SubsystemStatus::Down(e.to_string()),
    }
}

async fn probe_ollama(host: &str) -> SubsystemStatus {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(e) => return SubsystemStatus::Down(e.to_string()),
    };
    let url = format!("{}/api/version", host.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            SubsystemStatus::Healthy(
                body["version"].as_str().unwrap_or("reachable").to_string(),
            )
        }
        Ok(resp) => SubsystemStatus::Down(format!("HTTP {}", resp.status())),
        Err(e) => SubsystemStatus::Down(e.to_string()),
    }
}

pub async fn check_dependencies(config: &Config) -> Vec<DependencyReport> {
    let mut reports = Vec::new();
    for (name, required_for) in [
        (config.manim_bin.as_str(), "rendering"),
        ("git", "dataset match"),
        ("yt-dlp", "dataset transcripts"),
    ] {
        reports.push(DependencyReport {
            name: name.to_string(),
            required_for,
            status: probe_binary(name).await,
        });
    }
    reports.push(DependencyReport {
        name: format!("ollama ({})", config.ollama_host),
        required_for: "code generation",
        status: probe_ollama(&config.ollama_host).await,
    });

    for r in &reports {
        match &r.status {
            SubsystemStatus::Healthy(v) => info!("[HEALTH] {} OK: {}", r.name, v),
            SubsystemStatus::Down(why) => {
                warn!("[HEALTH] {} unavailable ({}): {}", r.name, r.required_for, why)
            }
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_down() {
        let status = probe_binary("manimgen-definitely-not-installed").await;
        assert!(!status.is_healthy());
    }

    #[tokio::test]
    async fn test_failing_binary_is_down() {
        // `false` ignores its arguments and exits 1.
        assert!(matches!(probe_binary("false").await, SubsystemStatus::Down(_)));
    }

    #[tokio::test]
    async fn test_unreachable_ollama() {
        let status = probe_ollama("http://127.0.0.1:9").await;
        assert!(!status.is_healthy());
    }
}
