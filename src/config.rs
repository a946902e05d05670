// ManimGen Configuration
// Copyright (c) 2026 ManimGen
//
// Everything is read from the environment (after dotenv has run).

use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Used when `SYSTEM_PROMPT_PATH` does not point at a readable file.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a Manim code generator. Your task is to output ONLY valid Python code for Manim animations - no explanations, no markdown, no code blocks. Just the raw Python code that can be saved directly to a .py file and executed.

Required format:
from manim import *

class [DescriptiveName](Scene):
    def construct(self):
        # Your animation code here

Rules:
1. No markdown code blocks or formatting
2. No comments except essential ones
3. Use only standard Manim objects (Circle, Square, Text, etc.)
4. Use standard Manim animations (Create, Transform, FadeIn, etc.)";

/// Credentials and addressing for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct SpacesConfig {
    pub key: String,
    pub secret: String,
    pub bucket: String,
    pub region: String,
    pub endpoint: String,
    pub cdn_domain: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_host: String,
    pub model: String,
    pub llm_timeout: Duration,
    pub system_prompt_path: PathBuf,
    pub manim_bin: String,
    pub media_dir: PathBuf,
    pub training_data_dir: PathBuf,
    pub cors_origins: Vec<String>,
    pub spaces: Option<SpacesConfig>,
    pub youtube_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_host: "http://localhost:11434".to_string(),
            model: "mistral".to_string(),
            llm_timeout: Duration::from_secs(60),
            system_prompt_path: PathBuf::from("backend/system_prompt.txt"),
            manim_bin: "manim".to_string(),
            media_dir: PathBuf::from("./media"),
            training_data_dir: PathBuf::from("./training_data"),
            cors_origins: vec!["http://localhost:3000".to_string()],
            spaces: None,
            youtube_api_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup so tests don't have to touch the process env.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |k: &str| get(k).filter(|v| !v.trim().is_empty());

        let llm_timeout = get("LLM_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.llm_timeout);

        let cors_origins = get("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        let spaces = match (get("SPACES_KEY"), get("SPACES_SECRET"), get("SPACES_BUCKET")) {
            (Some(key), Some(secret), Some(bucket)) => {
                let region = get("SPACES_REGION").unwrap_or_else(|| "sfo3".to_string());
                let endpoint = get("SPACES_ENDPOINT")
                    .unwrap_or_else(|| format!("https://{}.digitaloceanspaces.com", region));
                Some(SpacesConfig {
                    key,
                    secret,
                    bucket,
                    region,
                    endpoint,
                    cdn_domain: get("SPACES_CDN_DOMAIN"),
                })
            }
            _ => None,
        };

        Self {
            ollama_host: get("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            model: get("OLLAMA_MODEL").unwrap_or(defaults.model),
            llm_timeout,
            system_prompt_path: get("SYSTEM_PROMPT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.system_prompt_path),
            manim_bin: get("MANIM_BIN").unwrap_or(defaults.manim_bin),
            media_dir: get("MEDIA_DIR").map(PathBuf::from).unwrap_or(defaults.media_dir),
            training_data_dir: get("TRAINING_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.training_data_dir),
            cors_origins,
            spaces,
            youtube_api_key: get("YOUTUBE_API_KEY"),
        }
    }

    /// Read the system prompt file, falling back to the built-in prompt.
    /// Called once at startup; edits need a restart.
    pub fn load_system_prompt(&self) -> String {
        match std::fs::read_to_string(&self.system_prompt_path) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(
                    "[CONFIG] Could not read system prompt at {:?} ({}). Using built-in prompt.",
                    self.system_prompt_path, e
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        }
    }

    pub fn log_summary(&self) {
        info!("[CONFIG] Ollama: {} (model: {})", self.ollama_host, self.model);
        info!("[CONFIG] System prompt: {:?}", self.system_prompt_path);
        info!("[CONFIG] Media dir: {:?}", self.media_dir);
        match &self.spaces {
            Some(s) => info!("[CONFIG] Storage: Spaces bucket '{}' ({})", s.bucket, s.region),
            None => info!("[CONFIG] Storage: local media dir"),
        }
    }
}
