//! Core station abstraction and runner for the export pipeline.

use crate::error::{Result, TiergridError};
use crate::pipeline::error::{ErrorRecord, ErrorReporter, StationError};
use crate::pipeline::signal::Signal;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One stage of the export pipeline, owned by a [`StationRunner`] thread.
///
/// A station consumes messages from its upstream channel and may hold state
/// across them (a combine worker waits for both streams, the aggregator for
/// every speaker).
pub trait Station: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Handles one message.
    ///
    /// `Ok(None)` means the input was absorbed into buffered state. A
    /// [`StationError::Recoverable`] is reported and the next message is
    /// processed; [`StationError::Fatal`] ends the loop.
    fn process(&mut self, input: Self::Input) -> std::result::Result<Option<Self::Output>, StationError>;

    /// Stage label used in logs and error reports.
    fn name(&self) -> &'static str;

    /// Flushes partial state once input is exhausted.
    fn drain(&mut self) -> Vec<std::result::Result<Self::Output, StationError>> {
        Vec::new()
    }

    /// Error recorded when `output` cannot be handed downstream.
    ///
    /// Returning `None` only logs the loss.
    fn undelivered(&self, _output: &Self::Output) -> Option<ErrorRecord> {
        None
    }

    /// Last call before the thread exits.
    fn shutdown(&mut self) {}
}

/// Lifecycle of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Init = 0,
    Running = 1,
    Draining = 2,
    Done = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            3 => WorkerState::Done,
            _ => WorkerState::Init,
        }
    }
}

/// Observable worker state shared with the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Shared signals and settings a station runs under.
#[derive(Clone)]
pub struct StationContext {
    /// Run-wide stop request; inputs received after it is set are discarded
    /// and the final drain is skipped.
    pub stop: Signal,
    /// Set once every worker of the upstream stage has been joined.
    pub upstream_finished: Signal,
    pub poll_timeout: Duration,
    pub error_reporter: Arc<dyn ErrorReporter>,
}

/// Where a station's outputs go.
pub enum Outlet<T> {
    Channel(Sender<T>),
    /// Terminal stations; outputs are dropped.
    Discard,
}

impl<T> Outlet<T> {
    /// Hands the item back once the receiving side is gone.
    fn send(&self, item: T) -> std::result::Result<(), T> {
        match self {
            Outlet::Channel(tx) => tx.send(item).map_err(|e| e.into_inner()),
            Outlet::Discard => Ok(()),
        }
    }
}

/// Runs a station in a dedicated thread.
pub struct StationRunner<S: Station> {
    handle: Option<JoinHandle<S>>,
    worker_name: String,
    state: StateCell,
}

impl<S: Station> StationRunner<S> {
    /// Spawns a station whose outputs are sent to `output_tx`.
    pub fn spawn(
        station: S,
        worker_name: impl Into<String>,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        context: StationContext,
    ) -> Result<Self> {
        Self::spawn_with_outlet(
            station,
            worker_name.into(),
            input_rx,
            Outlet::Channel(output_tx),
            context,
        )
    }

    /// Spawns a station at the end of the pipeline.
    pub fn spawn_terminal(
        station: S,
        worker_name: impl Into<String>,
        input_rx: Receiver<S::Input>,
        context: StationContext,
    ) -> Result<Self> {
        Self::spawn_with_outlet(station, worker_name.into(), input_rx, Outlet::Discard, context)
    }

    fn spawn_with_outlet(
        mut station: S,
        worker_name: String,
        input_rx: Receiver<S::Input>,
        outlet: Outlet<S::Output>,
        context: StationContext,
    ) -> Result<Self> {
        let state = StateCell::default();
        let thread_state = state.clone();

        let handle = thread::Builder::new()
            .name(worker_name.clone())
            .spawn(move || {
                run_station(&mut station, input_rx, outlet, context, thread_state);
                station
            })?;

        Ok(Self {
            handle: Some(handle),
            worker_name,
            state,
        })
    }

    /// Waits for the station thread and hands the station back.
    pub fn join(mut self) -> Result<S> {
        let handle = self.handle.take().ok_or_else(|| TiergridError::WorkerPanicked {
            worker: self.worker_name.clone(),
        })?;
        handle.join().map_err(|_| TiergridError::WorkerPanicked {
            worker: self.worker_name.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.worker_name
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }
}

/// Main processing loop: RUNNING until input is exhausted, then DRAINING.
fn run_station<S: Station>(
    station: &mut S,
    input_rx: Receiver<S::Input>,
    outlet: Outlet<S::Output>,
    context: StationContext,
    state: StateCell,
) {
    let station_name = station.name();
    state.set(WorkerState::Running);
    tracing::debug!(station = station_name, "running");

    let mut open = true;
    while open {
        match input_rx.recv_timeout(context.poll_timeout) {
            Ok(input) => {
                if context.stop.is_set() {
                    tracing::debug!(station = station_name, "stop requested, discarding input");
                    continue;
                }
                match station.process(input) {
                    Ok(Some(output)) => {
                        if let Err(output) = outlet.send(output) {
                            report_undelivered(station, &output, &context);
                            open = false;
                        }
                    }
                    Ok(None) => {}
                    Err(error @ StationError::Recoverable(_)) => {
                        context.error_reporter.report(station_name, &error);
                    }
                    Err(error @ StationError::Fatal(_)) => {
                        context.error_reporter.report(station_name, &error);
                        open = false;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if context.upstream_finished.is_set() && input_rx.is_empty() {
                    open = false;
                }
            }
            Err(RecvTimeoutError::Disconnected) => open = false,
        }
    }

    state.set(WorkerState::Draining);
    if context.stop.is_set() {
        // Partial state is abandoned along with the run.
        tracing::debug!(station = station_name, "stop requested, skipping drain");
    } else {
        let mut closed = false;
        for item in station.drain() {
            match item {
                Ok(output) if closed => report_undelivered(station, &output, &context),
                Ok(output) => {
                    if let Err(output) = outlet.send(output) {
                        report_undelivered(station, &output, &context);
                        closed = true;
                    }
                }
                Err(error) => context.error_reporter.report(station_name, &error),
            }
        }
    }

    station.shutdown();
    state.set(WorkerState::Done);
    tracing::debug!(station = station_name, "done");
}

fn report_undelivered<S: Station>(station: &S, output: &S::Output, context: &StationContext) {
    match station.undelivered(output) {
        Some(record) => context
            .error_reporter
            .report(station.name(), &StationError::Recoverable(record)),
        None => tracing::debug!(station = station.name(), "output closed, item dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::{ErrorKey, ErrorRecord, Fault};
    use crossbeam_channel::bounded;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    // Mock station that doubles integers
    struct DoublerStation {
        shutdown_called: Arc<AtomicBool>,
    }

    impl Station for DoublerStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> std::result::Result<Option<i32>, StationError> {
            Ok(Some(input * 2))
        }

        fn name(&self) -> &'static str {
            "Doubler"
        }

        fn shutdown(&mut self) {
            self.shutdown_called.store(true, Ordering::SeqCst);
        }
    }

    // Mock station that sums its inputs and emits the total when drained
    #[derive(Default)]
    struct SumStation {
        total: i32,
    }

    impl Station for SumStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> std::result::Result<Option<i32>, StationError> {
            self.total += input;
            Ok(None)
        }

        fn name(&self) -> &'static str {
            "Sum"
        }

        fn drain(&mut self) -> Vec<std::result::Result<i32, StationError>> {
            vec![Ok(self.total)]
        }

        fn undelivered(&self, total: &i32) -> Option<ErrorRecord> {
            Some(ErrorRecord::new(
                ErrorKey::recording("sum"),
                Fault::ExportWrite(format!("total {} lost", total)),
            ))
        }
    }

    // Mock station that leaves a gap for every input still buffered at drain
    #[derive(Default)]
    struct PendingStation {
        pending: Vec<i32>,
    }

    impl Station for PendingStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> std::result::Result<Option<i32>, StationError> {
            self.pending.push(input);
            Ok(None)
        }

        fn name(&self) -> &'static str {
            "Pending"
        }

        fn drain(&mut self) -> Vec<std::result::Result<i32, StationError>> {
            self.pending
                .drain(..)
                .map(|input| {
                    Err(StationError::Recoverable(ErrorRecord::new(
                        ErrorKey::recording(format!("rec{}", input)),
                        Fault::JoinIntegrityGap("never completed".to_string()),
                    )))
                })
                .collect()
        }
    }

    // Mock station that fails on certain inputs
    struct FailingStation {
        fail_on: i32,
        fatal: bool,
    }

    impl Station for FailingStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> std::result::Result<Option<i32>, StationError> {
            if input != self.fail_on {
                return Ok(Some(input));
            }
            let record = ErrorRecord::new(
                ErrorKey::recording(format!("rec{}", input)),
                Fault::Parse(format!("Failed on {}", input)),
            );
            if self.fatal {
                Err(StationError::Fatal(record))
            } else {
                Err(StationError::Recoverable(record))
            }
        }

        fn name(&self) -> &'static str {
            "Failing"
        }
    }

    // Mock error reporter that collects errors
    #[derive(Default)]
    struct MockReporter {
        errors: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ErrorReporter for MockReporter {
        fn report(&self, station: &str, error: &StationError) {
            let mut errors = self.errors.lock().unwrap();
            errors.push((station.to_string(), error.to_string()));
        }
    }

    fn context(reporter: Arc<dyn ErrorReporter>) -> StationContext {
        StationContext {
            stop: Signal::new(),
            upstream_finished: Signal::new(),
            poll_timeout: Duration::from_millis(10),
            error_reporter: reporter,
        }
    }

    #[test]
    fn test_station_runner_basic_processing() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let station = DoublerStation {
            shutdown_called: shutdown_flag.clone(),
        };
        let runner = StationRunner::spawn(
            station,
            "doubler-0",
            input_rx,
            output_tx,
            context(Arc::new(MockReporter::default())),
        )
        .unwrap();
        assert_eq!(runner.name(), "doubler-0");

        input_tx.send(1).unwrap();
        input_tx.send(2).unwrap();
        input_tx.send(3).unwrap();
        drop(input_tx); // Close channel to trigger shutdown

        let outputs: Vec<i32> = output_rx.iter().collect();
        assert_eq!(outputs, vec![2, 4, 6]);

        runner.join().unwrap();
        assert!(shutdown_flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_upstream_finished_ends_polling() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let ctx = context(Arc::new(MockReporter::default()));
        let upstream = ctx.upstream_finished.clone();

        let runner =
            StationRunner::spawn(SumStation::default(), "sum", input_rx, output_tx, ctx).unwrap();

        input_tx.send(4).unwrap();
        input_tx.send(5).unwrap();
        // Sender stays alive; only the finished signal can end the loop
        upstream.set();

        let station = runner.join().unwrap();
        assert_eq!(station.total, 9);
        assert_eq!(output_rx.try_recv().unwrap(), 9);
        drop(input_tx);
    }

    #[test]
    fn test_stop_discards_unprocessed_input() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let ctx = context(Arc::new(MockReporter::default()));
        ctx.stop.set();

        let runner =
            StationRunner::spawn(SumStation::default(), "sum", input_rx, output_tx, ctx).unwrap();
        input_tx.send(7).unwrap();
        drop(input_tx);

        let station = runner.join().unwrap();
        assert_eq!(station.total, 0);
        // Drained state is abandoned too
        assert!(output_rx.iter().next().is_none());
    }

    #[test]
    fn test_stop_mid_run_skips_drain_errors() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded::<i32>(10);
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();
        let ctx = context(reporter);
        let stop = ctx.stop.clone();

        let runner =
            StationRunner::spawn(PendingStation::default(), "pending", input_rx, output_tx, ctx)
                .unwrap();
        input_tx.send(1).unwrap();
        input_tx.send(2).unwrap();
        while !input_tx.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        stop.set();
        drop(input_tx);

        runner.join().unwrap();
        assert!(errors.lock().unwrap().is_empty());
        assert!(output_rx.try_recv().is_err());
    }

    #[test]
    fn test_drain_without_stop_reports_gaps() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, _output_rx) = bounded::<i32>(10);
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();

        let runner = StationRunner::spawn(
            PendingStation::default(),
            "pending",
            input_rx,
            output_tx,
            context(reporter),
        )
        .unwrap();
        input_tx.send(1).unwrap();
        input_tx.send(2).unwrap();
        drop(input_tx);

        runner.join().unwrap();
        let reported = errors.lock().unwrap();
        assert_eq!(reported.len(), 2);
        assert!(reported[0].1.contains("rec1"));
    }

    #[test]
    fn test_undelivered_output_is_reported() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();

        let runner = StationRunner::spawn(
            SumStation::default(),
            "sum",
            input_rx,
            output_tx,
            context(reporter),
        )
        .unwrap();
        drop(output_rx);
        input_tx.send(3).unwrap();
        input_tx.send(4).unwrap();
        drop(input_tx);

        runner.join().unwrap();
        let reported = errors.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, "Sum");
        assert!(reported[0].1.contains("sum: export write error: total 7 lost"));
    }

    #[test]
    fn test_station_runner_error_handling() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();

        let station = FailingStation {
            fail_on: 2,
            fatal: false,
        };
        let runner =
            StationRunner::spawn(station, "failing", input_rx, output_tx, context(reporter))
                .unwrap();

        input_tx.send(1).unwrap();
        input_tx.send(2).unwrap(); // This will fail
        input_tx.send(3).unwrap();
        drop(input_tx);

        let outputs: Vec<i32> = output_rx.iter().collect();
        assert_eq!(outputs, vec![1, 3]);

        let reported = errors.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, "Failing");
        assert!(reported[0].1.contains("Failed on 2"));
        drop(reported);

        runner.join().unwrap();
    }

    #[test]
    fn test_fatal_error_stops_station() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let reporter = Arc::new(MockReporter::default());

        let station = FailingStation {
            fail_on: 2,
            fatal: true,
        };
        let runner =
            StationRunner::spawn(station, "failing", input_rx, output_tx, context(reporter))
                .unwrap();

        input_tx.send(1).unwrap();
        input_tx.send(2).unwrap();
        input_tx.send(3).unwrap();

        runner.join().unwrap();
        let outputs: Vec<i32> = output_rx.try_iter().collect();
        assert_eq!(outputs, vec![1]);
    }

    #[test]
    fn test_terminal_station_reaches_done() {
        let (input_tx, input_rx) = bounded(10);
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let station = DoublerStation {
            shutdown_called: shutdown_flag.clone(),
        };

        let runner = StationRunner::spawn_terminal(
            station,
            "sink",
            input_rx,
            context(Arc::new(MockReporter::default())),
        )
        .unwrap();
        input_tx.send(1).unwrap();
        drop(input_tx);

        let state = runner.state.clone();
        runner.join().unwrap();
        assert_eq!(state.get(), WorkerState::Done);
        assert!(shutdown_flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_station_runner_output_channel_closed() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let station = DoublerStation {
            shutdown_called: shutdown_flag.clone(),
        };
        let runner = StationRunner::spawn(
            station,
            "doubler",
            input_rx,
            output_tx,
            context(Arc::new(MockReporter::default())),
        )
        .unwrap();

        drop(output_rx);
        input_tx.send(1).unwrap();

        runner.join().unwrap();
        assert!(shutdown_flag.load(Ordering::SeqCst));
        drop(input_tx);
    }

    #[test]
    fn test_worker_state_round_trips_through_cell() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), WorkerState::Init);
        cell.set(WorkerState::Draining);
        assert_eq!(cell.get(), WorkerState::Draining);
    }
}
