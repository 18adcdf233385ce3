//! Service Module
//!
//! Business logic layer behind the HTTP API.

pub mod job;

pub use job as job_service;
