//! Tool executor capability and its reference tool implementations
//! (spec §6 "Tool executor capability").
//!
//! The core (orchestrator, sub-agent manager) depends only on
//! [`executor::ToolExecutor`] and [`executor::tool_definitions`]; it makes
//! no assumption about tool semantics beyond the string return value.

pub mod exec;
pub mod executor;
pub mod file_ops;

pub use executor::{tool_definitions, DefaultToolExecutor, ToolExecutor};
