//! Core domain types
//!
//! This module contains the records the operator persists and reconciles.
//! Jobs carry the desired state (spec) and the observed state (status);
//! Workers are the ephemeral execution units a Job owns.

pub mod job;
pub mod worker;
