// ManimGen Code Generation
// Copyright (c) 2026 ManimGen
//
// Turns a natural-language prompt into Manim scene source. The LLM path talks
// to Ollama's native API; any failure there drops to a fixed template so the
// renderer always has something to run.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Model identifier recorded alongside every attempt.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
    model: String,
    system_prompt: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(host: &str, model: &str, system_prompt: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout + Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            system_prompt,
            timeout,
        }
    }

    /// The full prompt sent to the model.
    pub fn build_prompt(&self, prompt: &str) -> String {
        format!(
            "{}\n\nUser request: {}\n\nGenerate Manim code for this request.",
            self.system_prompt, prompt
        )
    }

    async fn probe_version(&self) {
        let url = format!("{}/api/version", self.host);
        match self.client.get(&url).send().await {
            Ok(resp) => debug!("[LLM] Version check response: {}", resp.status()),
            Err(e) => debug!("[LLM] Version check failed: {}", e),
        }
    }
}

#[async_trait]
impl CodeGenerator for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        info!("[LLM] Requesting code from {} ({})", self.host, self.model);
        self.probe_version().await;

        let payload = json!({
            "model": self.model,
            "prompt": self.build_prompt(prompt),
            "stream": false,
        });

        let endpoint = format!("{}/api/generate", self.host);
        let resp = self
            .client
            .post(&endpoint)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("[LLM] Ollama API error: {} - {}", status, body);
            return Err(Error::Llm(format!(
                "Ollama API returned status code {}",
                status.as_u16()
            )));
        }

        let parsed: GenerateResponse = resp.json().await?;
        Ok(parsed.response)
    }
}

/// Result of a cleaned LLM response.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub code: String,
    pub changes: Vec<String>,
}

/// Strip markdown fences and stray artifacts from model output.
pub fn sanitize_manim_code(raw: &str) -> Sanitized {
    let mut changes = Vec::new();
    let mut code = raw.trim();
    if code.len() != raw.len() {
        changes.push("trimmed_whitespace".to_string());
    }

    if let Some(rest) = code.strip_prefix("```python") {
        code = rest;
        changes.push("removed_python_fence".to_string());
    }
    if let Some(rest) = code.strip_prefix("```") {
        code = rest;
        changes.push("removed_opening_fence".to_string());
    }
    if let Some(rest) = code.strip_suffix("```") {
        code = rest;
        changes.push("removed_closing_fence".to_string());
    }

    let mut lines: Vec<&str> = code.split('\n').collect();

    let leading = lines.iter().take_while(|l| l.trim().is_empty()).count();
    if leading > 0 {
        lines.drain(..leading);
        changes.push("removed_leading_blank_lines".to_string());
    }

    let trailing = lines.iter().rev().take_while(|l| l.trim().is_empty()).count();
    if trailing > 0 {
        lines.truncate(lines.len() - trailing);
        changes.push("removed_trailing_blank_lines".to_string());
    }

    // Lone "n" lines come from models emitting escaped newlines.
    let before = lines.len();
    lines.retain(|l| l.trim() != "n");
    if lines.len() != before {
        changes.push("removed_stray_n_lines".to_string());
    }

    Sanitized {
        code: lines.join("\n"),
        changes,
    }
}

/// Python class name derived from the prompt.
pub fn sanitize_class_name(prompt: &str) -> String {
    let sanitized: String = title_case(prompt)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();

    match sanitized.chars().next() {
        Some(c) if c.is_alphabetic() => format!("{}Scene", sanitized),
        _ => format!("Animation{}Scene", sanitized),
    }
}

// Uppercase the first letter of every alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn python_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Minimal scene that writes the prompt on screen.
pub fn template_code(prompt: &str) -> String {
    format!(
        "from manim import *\n\nclass {}(Scene):\n    def construct(self):\n        text = Text({})\n        self.play(Write(text))\n        self.wait()\n",
        sanitize_class_name(prompt),
        python_string_literal(prompt)
    )
}

#[derive(Debug, Clone)]
pub struct GeneratedCode {
    pub code: String,
    pub used_fallback: bool,
    pub changes: Vec<String>,
    pub elapsed: Duration,
}

/// Ask the generator for code; on any failure use the template instead.
pub async fn generate_with_fallback(generator: &dyn CodeGenerator, prompt: &str) -> GeneratedCode {
    let started = Instant::now();
    match generator.generate(prompt).await {
        Ok(raw) => {
            let sanitized = sanitize_manim_code(&raw);
            if sanitized.code.trim().is_empty() {
                warn!("[LLM] Model returned no usable code, falling back to template");
                return GeneratedCode {
                    code: template_code(prompt),
                    used_fallback: true,
                    changes: sanitized.changes,
                    elapsed: started.elapsed(),
                };
            }
            GeneratedCode {
                code: sanitized.code,
                used_fallback: false,
                changes: sanitized.changes,
                elapsed: started.elapsed(),
            }
        }
        Err(e) => {
            warn!("[LLM] Generation failed: {}, falling back to template", e);
            GeneratedCode {
                code: template_code(prompt),
                used_fallback: true,
                changes: Vec::new(),
                elapsed: started.elapsed(),
            }
        }
    }
}
