pub mod consumer;
pub mod worker;

// Re-export for convenience
pub use worker::{Dependencies, Worker};
