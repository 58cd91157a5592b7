//! Core domain types and logic: data model, lifecycle state machine, content fingerprint,
//! backoff arithmetic, and document rendering.
pub mod document;
pub mod error;
pub mod fingerprint;
pub mod hashing;
pub mod lifecycle;
pub mod model;
pub mod retry;
