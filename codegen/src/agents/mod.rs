//! Agents that turn prompts into service calls and parsed results.
//!
//! Each agent renders its instruction, sends it through a
//! [`GenerativeService`](crate::io::service::GenerativeService) and parses the
//! reply. Budget accounting stays with the pipeline.

pub mod coder;
pub mod planner;
