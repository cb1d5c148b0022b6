//! Bounded plan/generate/validate pipeline for code generation.
//!
//! One activation drives a fixed sequence of phases (plan, generate items,
//! periodic re-plan, tests, syntax validation, sandboxed execution) under a
//! hard step ceiling, then persists whatever was produced. The crate keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan parsing, budgeting, naming,
//!   syntax checks). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (generative backends, child
//!   processes, workspace files, configuration).
//!
//! [`agents`] wrap the generative service with prompt rendering, and
//! [`pipeline`] is the state machine that ties everything together.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
