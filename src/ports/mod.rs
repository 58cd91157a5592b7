//! Ports: async traits for everything the pipeline talks to.
pub mod clock;
pub mod documents;
pub mod random;
pub mod repo;
pub mod source;
