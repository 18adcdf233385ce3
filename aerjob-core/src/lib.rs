//! Aerjob Core
//!
//! Core types and abstractions for the Aerjob operator.
//!
//! This crate contains:
//! - Domain types: the persisted Job and Worker records and their phases
//! - DTOs: Data transfer objects for the HTTP surface
//! - Errors: the failure taxonomy every object store reports

pub mod domain;
pub mod dto;
pub mod error;
