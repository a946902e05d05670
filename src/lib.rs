// ManimGen Library Root
// Copyright (c) 2026 ManimGen

pub mod agent;
pub mod config;
pub mod dataset;
pub mod error;
pub mod server;
pub mod state;

pub use error::{Error, Result};
