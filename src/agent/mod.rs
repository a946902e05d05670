// ManimGen Agent Modules
// Copyright (c) 2026 ManimGen

pub mod code_gen;
pub mod data_collector;
pub mod health;
pub mod pipeline;
pub mod renderer;
pub mod storage;
pub mod task_store;
