//! Data Transfer Objects
//!
//! Bodies exchanged over HTTP between the service and its clients that are
//! not themselves domain entities.

pub mod health;
pub mod job;
