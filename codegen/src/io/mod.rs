//! I/O helpers for the pipeline.

pub mod config;
pub mod output;
pub mod process;
pub mod prompt;
pub mod python_syntax;
pub mod sandbox;
pub mod service;
pub mod workspace;
