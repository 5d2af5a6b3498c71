//! Default configuration constants for tiergrid.
//!
//! Shared by the config layer, the pipeline and the exporters so that the
//! same values are used wherever a setting is not supplied.

/// How long a worker blocks on its input channel before rechecking the
/// stop flag and its upstream finished signal.
///
/// Bounds shutdown latency: a worker notices shutdown at most this long after
/// its upstream stage has been joined.
pub const POLL_TIMEOUT_MS: u64 = 100;

/// Capacity of each job-local bundle channel (groupers → combine worker).
pub const JOB_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the shared fragment channel (combine workers → aggregator).
pub const EXPORT_CHANNEL_CAPACITY: usize = 128;

/// Capacity of the write channel (aggregator → writer pool).
pub const WRITE_CHANNEL_CAPACITY: usize = 32;

/// Number of export writer threads.
pub const WRITER_COUNT: usize = 2;

/// How long a grouper waits for its label file to appear before giving up.
pub const FILE_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Interval between file presence checks while waiting for backend output.
pub const FILE_POLL_INTERVAL_MS: u64 = 50;

/// Default alignment frame shift in seconds (10ms frames).
pub const FRAME_SHIFT: f64 = 0.01;

/// Decimal places kept when parsing label record times.
pub const TIME_DECIMALS: i32 = 4;

/// Positional suffixes appended to phone symbols by word-position-dependent models.
pub const POSITION_MARKERS: &[&str] = &["_B", "_E", "_I", "_S"];

/// Word labels dropped by the cleanup pass.
pub const SILENCE_WORDS: &[&str] = &["<eps>", "sil", "sp"];

/// Phone labels dropped by the cleanup pass.
pub const SILENCE_PHONES: &[&str] = &["sil", "sp", "spn"];

/// Word symbol the lexicon uses for out-of-vocabulary transcript words.
pub const OOV_WORD: &str = "<unk>";

/// Configuration file looked up in the working directory when `--config` is absent.
pub const CONFIG_FILENAME: &str = "tiergrid.toml";

/// File written to the output directory when a run records errors.
pub const ERROR_REPORT_FILENAME: &str = "output_errors.txt";

/// Markers that identify a backend failure in a job log.
pub const BACKEND_ERROR_MARKERS: &[&str] = &[
    "ERROR (",
    "ASSERTION_FAILED",
    "error while loading shared libraries",
    "Segmentation fault",
];

/// Seconds → frame-shift conversion for values given in milliseconds.
///
/// Frame shifts above one are interpreted as milliseconds (`10` → `0.01`).
pub fn normalize_frame_shift(frame_shift: f64) -> f64 {
    if frame_shift > 1.0 {
        round_to(frame_shift / 1000.0, TIME_DECIMALS)
    } else {
        frame_shift
    }
}

/// Rounds `value` to `decimals` decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
