//! Data Transfer Objects for the operator API
//!
//! DTOs are the request shapes accepted over HTTP. Responses use the
//! domain records directly, since the Job record is the wire contract.

pub mod job;
