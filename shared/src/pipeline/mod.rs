/// Pipeline operations
///
/// Each operation depends only on the capability traits (stores, queue,
/// sandbox client) it is constructed with:
/// - `IngestionService`: store a submitted file and request a scan
/// - `ScanWorker`: submit a stored file to the sandbox and request polling
/// - `PollWorker`: the polling state machine; requeue while pending, persist the report when done
/// - `ReportLookup`: read-through to the report store

pub mod ingestion;
pub mod lookup;
pub mod poll;
pub mod scan;

pub use ingestion::IngestionService;
pub use lookup::ReportLookup;
pub use poll::{PollOutcome, PollWorker};
pub use scan::{ScanOutcome, ScanWorker};
