//! TexForge Core
//!
//! Core types shared by the TexForge compile service.
//!
//! This crate contains:
//! - Domain types: jobs, toolchains, lifecycle status and compile results
//! - DTOs: bodies exchanged between the service and its clients

pub mod domain;
pub mod dto;
