// ManimGen Generation Pipeline
// Copyright (c) 2026 ManimGen
//
// One linear run per task:
//   prompt -> LLM (template fallback) -> scene.py in a temp dir -> manim
//   -> upload -> task completed | failed -> attempt logged

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::agent::code_gen::{generate_with_fallback, CodeGenerator, GeneratedCode};
use crate::agent::data_collector::{
    AttemptRecord, DataCollector, ExecutionOutcome, GenerationMetadata, LlmConfig,
};
use crate::agent::renderer::{RenderOptions, Renderer};
use crate::agent::storage::ObjectStore;
use crate::agent::task_store::{GenerationTask, TaskStore};
use crate::error::{Error, Result};

pub struct Pipeline {
    pub generator: Arc<dyn CodeGenerator>,
    pub renderer: Arc<dyn Renderer>,
    pub storage: Arc<dyn ObjectStore>,
    pub collector: Arc<DataCollector>,
    pub tasks: Arc<TaskStore>,
    pub media_dir: PathBuf,
    pub system_prompt: String,
}

// What we learned along the way, for the attempt record.
#[derive(Default)]
struct Trace {
    generated: Option<GeneratedCode>,
    stdout: Option<String>,
    stderr: Option<String>,
}

impl Pipeline {
    /// Run in the background. The caller polls the task store for progress.
    pub fn spawn(self: &Arc<Self>, task_id: String, prompt: String, options: RenderOptions) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.run(&task_id, &prompt, &options).await;
        });
    }

    /// Drive one task to a terminal state. Never returns an error: failures
    /// are recorded on the task.
    pub async fn run(&self, task_id: &str, prompt: &str, options: &RenderOptions) -> Option<GenerationTask> {
        info!("[PIPELINE] Task {} started: {:?}", task_id, prompt);
        let started = Instant::now();
        let mut trace = Trace::default();
        let output_dir = self.media_dir.join(task_id);

        let result = self
            .execute(task_id, prompt, options, &output_dir, &mut trace)
            .await;

        let settled = match result {
            Ok(url) => {
                info!("[PIPELINE] Task {} completed: {}", task_id, url);
                self.tasks.complete(task_id, &url)
            }
            Err(e) => {
                error!("[PIPELINE] Task {} failed: {}", task_id, e);
                if let Err(cleanup) = remove_dir_if_present(&output_dir).await {
                    warn!("[PIPELINE] Could not clean {:?}: {}", output_dir, cleanup);
                }
                self.tasks.fail(task_id, &e.to_string())
            }
        };

        let task = match settled {
            Ok(task) => task,
            Err(e) => {
                warn!("[PIPELINE] Task {} could not be settled: {}", task_id, e);
                self.tasks.get(task_id)?
            }
        };

        let record = self.attempt_record(&task, prompt, options, trace, started);
        if let Err(e) = self.collector.log_attempt(&record).await {
            warn!("[PIPELINE] Failed to log attempt {}: {}", task_id, e);
        }
        Some(task)
    }

    async fn execute(
        &self,
        task_id: &str,
        prompt: &str,
        options: &RenderOptions,
        output_dir: &Path,
        trace: &mut Trace,
    ) -> Result<String> {
        let generated = generate_with_fallback(self.generator.as_ref(), prompt).await;
        let code = generated.code.clone();
        trace.generated = Some(generated);
        self.tasks.mark_processing(task_id, &code)?;

        let scratch = tempfile::tempdir()?;
        let scene_file = scratch.path().join("scene.py");
        tokio::fs::write(&scene_file, &code).await?;
        info!("[PIPELINE] Wrote scene to {:?}", scene_file);

        tokio::fs::create_dir_all(output_dir).await?;
        let output_file = output_dir.join("animation.mp4");

        match self.renderer.render(&scene_file, &output_file, options).await {
            Ok(out) => {
                trace.stdout = Some(out.stdout);
                trace.stderr = Some(out.stderr);
            }
            Err(Error::Render(stderr)) => {
                trace.stderr = Some(stderr.clone());
                return Err(Error::Render(stderr));
            }
            Err(e) => return Err(e),
        }

        if !tokio::fs::try_exists(&output_file).await? {
            return Err(Error::NotFound("Video file not generated".to_string()));
        }

        let url = self.storage.upload_video(&output_file, task_id).await?;

        if !self.storage.keeps_local_copy() {
            if let Err(e) = remove_dir_if_present(output_dir).await {
                warn!("[PIPELINE] Uploaded but could not remove {:?}: {}", output_dir, e);
            }
        }

        Ok(url)
    }

    fn attempt_record(
        &self,
        task: &GenerationTask,
        prompt: &str,
        options: &RenderOptions,
        trace: Trace,
        started: Instant,
    ) -> AttemptRecord {
        let (llm_response_time, used_fallback, changes) = match &trace.generated {
            Some(g) => (g.elapsed.as_secs_f64(), g.used_fallback, g.changes.clone()),
            None => (started.elapsed().as_secs_f64(), false, Vec::new()),
        };

        AttemptRecord {
            id: task.task_id.clone(),
            timestamp: Utc::now(),
            model_version: self.generator.model().to_string(),
            system_prompt: self.system_prompt.clone(),
            user_query: prompt.to_string(),
            generated_code: task.code.clone().unwrap_or_default(),
            execution_outcome: ExecutionOutcome {
                status: task.status,
                error: task.error.clone(),
                video_url: task.video_url.clone(),
                render_time: started.elapsed().as_secs_f64(),
                stdout: trace.stdout,
                stderr: trace.stderr,
            },
            generation_metadata: GenerationMetadata {
                llm_response_time,
                used_fallback_template: used_fallback,
                sanitization_changes: changes,
                llm_config: LlmConfig {
                    model: self.generator.model().to_string(),
                    quality: options.quality.as_str().to_string(),
                    resolution: options.resolution.clone(),
                },
            },
            feedback: None,
            extensions: None,
        }
    }
}

async fn remove_dir_if_present(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::renderer::RenderOutput;
    use crate::agent::task_store::TaskStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeLlm(Option<&'static str>);

    #[async_trait]
    impl CodeGenerator for FakeLlm {
        fn model(&self) -> &str {
            "fake-llm"
        }
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| Error::Llm("offline".into()))
        }
    }

    enum RenderMode {
        Writes,
        Fails,
        Silent,
    }

    struct FakeRenderer(RenderMode);

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, scene: &Path, out: &Path, _o: &RenderOptions) -> Result<RenderOutput> {
            assert!(scene.exists(), "scene file must exist during render");
            match self.0 {
                RenderMode::Writes => {
                    std::fs::write(out, b"mp4").unwrap();
                    Ok(RenderOutput {
                        stdout: "File ready".into(),
                        stderr: String::new(),
                    })
                }
                RenderMode::Fails => Err(Error::Render("NameError: name 'Circl' is not defined".into())),
                RenderMode::Silent => Ok(RenderOutput::default()),
            }
        }
    }

    #[derive(Default)]
    struct FakeStore {
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn upload_video(&self, path: &Path, task_id: &str) -> Result<String> {
            assert!(path.exists());
            self.uploads.lock().unwrap().push(task_id.to_string());
            Ok(format!("https://cdn.test/videos/{}/animation.mp4", task_id))
        }
        async fn video_url(&self, _task_id: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn delete_video(&self, _task_id: &str) -> Result<bool> {
            Ok(false)
        }
        fn keeps_local_copy(&self) -> bool {
            false
        }
    }

    fn pipeline(llm: FakeLlm, mode: RenderMode, root: &Path) -> (Arc<Pipeline>, Arc<FakeStore>) {
        let store = Arc::new(FakeStore::default());
        let p = Pipeline {
            generator: Arc::new(llm),
            renderer: Arc::new(FakeRenderer(mode)),
            storage: store.clone(),
            collector: Arc::new(DataCollector::new(&root.join("training_data")).unwrap()),
            tasks: Arc::new(TaskStore::new()),
            media_dir: root.join("media"),
            system_prompt: "SYSTEM".into(),
        };
        (Arc::new(p), store)
    }

    #[tokio::test]
    async fn test_successful_run_uploads_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (p, store) = pipeline(FakeLlm(Some("from manim import *")), RenderMode::Writes, dir.path());
        let task = p.tasks.create();

        let done = p.run(&task.task_id, "a circle", &RenderOptions::default()).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(
            done.video_url.as_deref(),
            Some(format!("https://cdn.test/videos/{}/animation.mp4", task.task_id).as_str())
        );
        assert_eq!(store.uploads.lock().unwrap().len(), 1);
        assert!(!dir.path().join("media").join(&task.task_id).exists());

        let attempts = p.collector.load_attempts().unwrap();
        assert_eq!(attempts.len(), 1);
        let a = &attempts[0];
        assert_eq!(a.id, task.task_id);
        assert_eq!(a.execution_outcome.status, TaskStatus::Completed);
        assert_eq!(a.execution_outcome.stdout.as_deref(), Some("File ready"));
        assert!(!a.generation_metadata.used_fallback_template);
        assert_eq!(a.generation_metadata.llm_config.model, "fake-llm");
        assert_eq!(a.system_prompt, "SYSTEM");
    }

    #[tokio::test]
    async fn test_llm_failure_uses_template() {
        let dir = tempfile::tempdir().unwrap();
        let (p, _) = pipeline(FakeLlm(None), RenderMode::Writes, dir.path());
        let task = p.tasks.create();

        let done = p.run(&task.task_id, "draw a circle", &RenderOptions::default()).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.code.unwrap().contains("class DrawACircleScene(Scene):"));

        let a = &p.collector.load_attempts().unwrap()[0];
        assert!(a.generation_metadata.used_fallback_template);
    }

    #[tokio::test]
    async fn test_render_failure_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let (p, store) = pipeline(FakeLlm(Some("bad code")), RenderMode::Fails, dir.path());
        let task = p.tasks.create();

        let done = p.run(&task.task_id, "x", &RenderOptions::default()).await.unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.code.as_deref(), Some("bad code"));
        assert!(done.error.unwrap().starts_with("Manim error: NameError"));
        assert!(store.uploads.lock().unwrap().is_empty());

        let a = &p.collector.load_attempts().unwrap()[0];
        assert_eq!(a.execution_outcome.status, TaskStatus::Failed);
        assert!(a.execution_outcome.stderr.as_deref().unwrap().contains("Circl"));
    }

    #[tokio::test]
    async fn test_missing_output_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (p, _) = pipeline(FakeLlm(Some("code")), RenderMode::Silent, dir.path());
        let task = p.tasks.create();

        let done = p.run(&task.task_id, "x", &RenderOptions::default()).await.unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("Video file not generated"));
    }

    #[tokio::test]
    async fn test_spawn_reaches_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let (p, _) = pipeline(FakeLlm(Some("code")), RenderMode::Writes, dir.path());
        let task = p.tasks.create();
        p.spawn(task.task_id.clone(), "x".into(), RenderOptions::default());

        for _ in 0..200 {
            if p.tasks.get(&task.task_id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(p.tasks.get(&task.task_id).unwrap().status, TaskStatus::Completed);
    }
}
