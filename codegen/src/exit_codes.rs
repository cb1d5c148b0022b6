//! Stable exit codes for `codegen` CLI commands.

/// Pipeline completed (or `check` found no syntax errors).
pub const OK: i32 = 0;
/// Invalid configuration, unreadable input, or other errors before any step ran.
pub const INVALID: i32 = 1;
/// The step ceiling was reached before the pipeline finished.
pub const STEP_LIMIT: i32 = 2;
/// A phase failed (service error, syntax error) and the pipeline stopped.
pub const FAILED: i32 = 3;
