//! Interaction with the alignment backend's on-disk outputs.

use crate::defaults::BACKEND_ERROR_MARKERS;
use crate::error::Result;
use crate::pipeline::signal::Signal;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Blocks until `path` exists, `timeout` elapses or `stop` is set.
///
/// Returns whether the file is present.
pub fn wait_for_file(path: &Path, timeout: Duration, poll_interval: Duration, stop: &Signal) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if path.is_file() {
            return true;
        }
        if stop.is_set() || Instant::now() >= deadline {
            return false;
        }
        thread::sleep(poll_interval);
    }
}

/// Lines of a backend log that carry a failure marker.
pub fn scan_log(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut hits = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if BACKEND_ERROR_MARKERS.iter().any(|marker| line.contains(marker)) {
            hits.push(line.trim().to_string());
        }
    }
    Ok(hits)
}
