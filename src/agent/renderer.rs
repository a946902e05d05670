// ManimGen Renderer
// Copyright (c) 2026 ManimGen
//
// Thin wrapper over the `manim` CLI. The render itself is entirely external;
// this module builds the argument list and checks the exit code.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Low,
    Medium,
    High,
}

impl Quality {
    /// Anything that is not a known level renders at high quality.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Quality::Low,
            "medium" => Quality::Medium,
            _ => Quality::High,
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            Quality::Low => "-ql",
            Quality::Medium => "-qm",
            Quality::High => "-qh",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

fn deserialize_quality<'de, D>(d: D) -> std::result::Result<Quality, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    Ok(Quality::parse(&s))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderOptions {
    #[serde(default, deserialize_with = "deserialize_quality")]
    pub quality: Quality,
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_resolution() -> String {
    "720p".to_string()
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            quality: Quality::Low,
            resolution: default_resolution(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `scene_file` into `output_file`. A non-zero exit is an error.
    async fn render(
        &self,
        scene_file: &Path,
        output_file: &Path,
        options: &RenderOptions,
    ) -> Result<RenderOutput>;
}

pub struct ManimRenderer {
    binary: String,
    media_dir: PathBuf,
}

impl ManimRenderer {
    pub fn new(binary: &str, media_dir: &Path) -> Self {
        Self {
            binary: binary.to_string(),
            media_dir: media_dir.to_path_buf(),
        }
    }

    pub fn build_args(
        &self,
        scene_file: &Path,
        output_file: &Path,
        options: &RenderOptions,
    ) -> Vec<String> {
        vec![
            scene_file.to_string_lossy().into_owned(),
            options.quality.flag().to_string(),
            "--media_dir".to_string(),
            absolute(&self.media_dir).to_string_lossy().into_owned(),
            "--output_file".to_string(),
            absolute(output_file).to_string_lossy().into_owned(),
        ]
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[async_trait]
impl Renderer for ManimRenderer {
    async fn render(
        &self,
        scene_file: &Path,
        output_file: &Path,
        options: &RenderOptions,
    ) -> Result<RenderOutput> {
        let args = self.build_args(scene_file, output_file, options);
        info!("[RENDER] {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let result = RenderOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("[RENDER] stdout:\n{}", result.stdout);

        if !output.status.success() {
            error!("[RENDER] manim exited with {}", output.status);
            return Err(Error::Render(result.stderr));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parse() {
        assert_eq!(Quality::parse("low"), Quality::Low);
        assert_eq!(Quality::parse(" LOW "), Quality::Low);
        assert_eq!(Quality::parse("medium"), Quality::Medium);
        assert_eq!(Quality::parse("ultra"), Quality::High);
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let opts: RenderOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, RenderOptions::default());

        let opts: RenderOptions =
            serde_json::from_str(r#"{"quality": "4k", "resolution": "1080p"}"#).unwrap();
        assert_eq!(opts.quality, Quality::High);
        assert_eq!(opts.resolution, "1080p");
    }

    #[test]
    fn test_build_args() {
        let r = ManimRenderer::new("manim", Path::new("/srv/media"));
        let args = r.build_args(
            Path::new("/tmp/x/scene.py"),
            Path::new("/srv/media/t1/animation.mp4"),
            &RenderOptions::default(),
        );
        assert_eq!(
            args,
            vec![
                "/tmp/x/scene.py",
                "-ql",
                "--media_dir",
                "/srv/media",
                "--output_file",
                "/srv/media/t1/animation.mp4",
            ]
        );
    }

    #[test]
    fn test_relative_media_dir_made_absolute() {
        let r = ManimRenderer::new("manim", Path::new("media"));
        let args = r.build_args(
            Path::new("scene.py"),
            Path::new("media/t/animation.mp4"),
            &RenderOptions::default(),
        );
        assert!(Path::new(&args[3]).is_absolute());
        assert!(Path::new(&args[5]).is_absolute());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_render_error() {
        // `false` ignores its arguments and exits 1.
        let r = ManimRenderer::new("false", Path::new("/tmp"));
        let err = r
            .render(
                Path::new("scene.py"),
                Path::new("/tmp/out.mp4"),
                &RenderOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let r = ManimRenderer::new("manimgen-no-such-binary", Path::new("/tmp"));
        let err = r
            .render(
                Path::new("scene.py"),
                Path::new("/tmp/out.mp4"),
                &RenderOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
