// ManimGen Server State
// Copyright (c) 2026 ManimGen

use std::sync::Arc;

use crate::agent::code_gen::OllamaClient;
use crate::agent::data_collector::DataCollector;
use crate::agent::pipeline::Pipeline;
use crate::agent::renderer::ManimRenderer;
use crate::agent::storage::{LocalStorage, ObjectStore, SpacesStorage};
use crate::agent::task_store::TaskStore;
use crate::config::Config;
use crate::error::Result;

pub struct KernelState {
    pub config: Config,
    pub tasks: Arc<TaskStore>,
    pub collector: Arc<DataCollector>,
    pub pipeline: Arc<Pipeline>,
}

impl KernelState {
    /// Wire up the real collaborators from configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.media_dir)?;
        let system_prompt = config.load_system_prompt();

        let generator = Arc::new(OllamaClient::new(
            &config.ollama_host,
            &config.model,
            system_prompt.clone(),
            config.llm_timeout,
        ));
        let renderer = Arc::new(ManimRenderer::new(&config.manim_bin, &config.media_dir));
        let storage: Arc<dyn ObjectStore> = match &config.spaces {
            Some(spaces) => Arc::new(SpacesStorage::new(spaces.clone())),
            None => Arc::new(LocalStorage::new(&config.media_dir)),
        };
        let collector = Arc::new(DataCollector::new(&config.training_data_dir)?);
        let tasks = Arc::new(TaskStore::new());

        let pipeline = Arc::new(Pipeline {
            generator,
            renderer,
            storage,
            collector: collector.clone(),
            tasks: tasks.clone(),
            media_dir: config.media_dir.clone(),
            system_prompt,
        });

        Ok(Self {
            config,
            tasks,
            collector,
            pipeline,
        })
    }

    /// Build around an already-assembled pipeline (tests swap collaborators this way).
    pub fn with_pipeline(config: Config, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            tasks: pipeline.tasks.clone(),
            collector: pipeline.collector.clone(),
            pipeline,
        }
    }
}
