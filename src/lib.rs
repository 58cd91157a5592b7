//! postmirror: mirrors recent forum posts and their reply threads into a full-text
//! document store, re-syncing each item on a fixed daily lifecycle until it freezes.
pub mod app;
pub mod domain;
pub mod infra;
pub mod ports;
