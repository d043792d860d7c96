//! I/O helpers: configuration, external services, actuation and logs.

pub mod actuator;
pub mod attempt_log;
pub mod config;
pub mod critic;
pub mod kinematic;
pub mod llm;
pub mod planner;
pub mod prompt;
