//! Application layer: the shared context, the sync pipeline and local retry.
pub mod context;
pub mod pipeline;
pub mod retry;
