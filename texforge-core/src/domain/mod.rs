//! Core domain types
//!
//! These types describe a compilation job and what it produced. They are
//! shared between the orchestrator (admission, persistence) and the runner
//! (execution).

pub mod artifact;
pub mod job;
pub mod result;
