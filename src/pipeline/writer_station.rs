//! Writer pool member: hands finished recordings to the export sink.

use crate::export::{ExportSink, WrittenRecording};
use crate::pipeline::error::{ErrorKey, ErrorRecord, Fault, StationError};
use crate::pipeline::station::Station;
use crate::pipeline::types::RecordingExport;
use std::sync::Arc;

/// Station that writes each recording it receives.
///
/// A failed write is recorded against the recording and the station moves on
/// to the next one.
pub struct WriterStation {
    index: usize,
    sink: Arc<dyn ExportSink>,
    written: Vec<WrittenRecording>,
}

impl WriterStation {
    pub fn new(index: usize, sink: Arc<dyn ExportSink>) -> Self {
        Self {
            index,
            sink,
            written: Vec::new(),
        }
    }

    /// Recordings written by this writer.
    pub fn written(&self) -> &[WrittenRecording] {
        &self.written
    }

    pub fn into_written(self) -> Vec<WrittenRecording> {
        self.written
    }
}

impl Station for WriterStation {
    type Input = RecordingExport;
    type Output = WrittenRecording;

    fn process(&mut self, export: RecordingExport) -> Result<Option<WrittenRecording>, StationError> {
        match self.sink.write(&export) {
            Ok(written) => {
                tracing::debug!(
                    writer = self.index,
                    sink = self.sink.name(),
                    recording = %written.recording,
                    intervals = written.intervals,
                    complete = written.complete,
                    "recording exported"
                );
                self.written.push(written.clone());
                Ok(Some(written))
            }
            Err(e) => Err(StationError::Recoverable(ErrorRecord::new(
                ErrorKey::recording(export.recording()),
                Fault::ExportWrite(e.to_string()),
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "Writer"
    }
}
