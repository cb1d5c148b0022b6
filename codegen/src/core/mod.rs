//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod extract;
pub mod naming;
pub mod plan;
pub mod syntax;
pub mod types;
pub mod vars;
