//! Shared pipeline code for the sandbox submission and analysis services

// Re-export common dependencies
pub use anyhow;
pub use async_trait;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tracing;
pub use uuid;

pub mod config;
pub mod crypto;
pub mod messaging;
pub mod observability;
pub mod pipeline;
pub mod sandbox;
pub mod storage;
pub mod types;

pub use messaging::{Channel, Delivery, WorkQueue, WorkQueueExt};
pub use pipeline::{IngestionService, PollOutcome, PollWorker, ReportLookup, ScanOutcome, ScanWorker};
pub use sandbox::SandboxClient;
pub use storage::{BlobStore, InFlightRegistry, ReportStore};
pub use types::error::{PipelineError, PipelineResult};
pub use types::{ContentHash, JobId, JobState, JobStatus, PollRequest, Report, ScanRequest, Submission};
