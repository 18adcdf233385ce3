//! Worker runtime
//!
//! Turns worker records into podman containers and reports their state
//! back. Optional: without it, worker phases are driven through the store
//! by whatever runtime owns the workers.

pub mod launcher;
pub mod podman;

pub use launcher::WorkerLauncher;
pub use podman::PodmanClient;
