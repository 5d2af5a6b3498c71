//! Export pipeline stages.
//!
//! Each station runs in its own thread, connected by bounded crossbeam
//! channels for backpressure. Groupers are plain source threads; everything
//! downstream of them is a [`Station`].

pub mod aggregator_station;
pub mod combine_station;
pub mod error;
pub mod grouper_worker;
pub mod orchestrator;
pub mod signal;
pub mod station;
pub mod types;
pub mod writer_station;

pub use aggregator_station::AggregatorStation;
pub use combine_station::CombineStation;
pub use error::{
    ErrorKey, ErrorRecord, ErrorReport, ErrorReporter, ErrorTable, Fault, LogReporter, Stage,
    StationError,
};
pub use grouper_worker::{GrouperSettings, GrouperStats, GrouperWorker};
pub use orchestrator::{ExportPipeline, ExportSummary};
pub use signal::Signal;
pub use station::{Station, StationContext, StationRunner, WorkerState};
pub use types::{Bundle, LabelKind, RecordingExport};
pub use writer_station::WriterStation;
