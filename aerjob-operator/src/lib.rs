//! aerjob operator
//!
//! Reconciles quantum simulation jobs into worker executions. Each pass
//! recomputes the next step from persisted job status, with bounded
//! retries, an absolute deadline and TTL-based cleanup of finished jobs.

pub mod api;
pub mod builder;
pub mod config;
pub mod controller;
pub mod db;
pub mod reconciler;
pub mod runtime;
pub mod service;
pub mod store;
