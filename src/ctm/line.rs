//! Parser for single alignment label records.
//!
//! A record is one line of five whitespace-separated fields:
//! `<utterance_id> <channel> <begin> <duration> <label>`.

use crate::defaults::{TIME_DECIMALS, round_to};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a label record could not be parsed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LineError {
    #[error("expected 5 fields, found {found}")]
    FieldCount { found: usize },

    #[error("{field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("negative duration {value}")]
    NegativeDuration { value: f64 },
}

/// A labelled time span belonging to one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Utterance the interval was aligned in.
    pub utterance: String,
    /// Start time in seconds.
    pub begin: f64,
    /// End time in seconds.
    pub end: f64,
    /// Label: a numeric symbol id straight from the backend, or a symbol once mapped.
    pub label: String,
}

impl Interval {
    pub fn new(utterance: impl Into<String>, begin: f64, end: f64, label: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            begin,
            end,
            label: label.into(),
        }
    }

    /// Moves the interval by `offset` seconds.
    pub fn shift(&mut self, offset: f64) {
        self.begin = round_to(self.begin + offset, TIME_DECIMALS);
        self.end = round_to(self.end + offset, TIME_DECIMALS);
    }

    pub fn duration(&self) -> f64 {
        self.end - self.begin
    }
}

/// Parses one trimmed, non-empty label record.
///
/// Times are rounded to four decimals; `end` is `begin + duration`.
pub fn parse_line(line: &str) -> Result<Interval, LineError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [utterance, _channel, begin, duration, label] = fields.as_slice() else {
        return Err(LineError::FieldCount {
            found: fields.len(),
        });
    };

    let begin = parse_number("begin", begin)?;
    let duration = parse_number("duration", duration)?;
    if duration < 0.0 {
        return Err(LineError::NegativeDuration { value: duration });
    }

    let begin = round_to(begin, TIME_DECIMALS);
    let end = round_to(begin + duration, TIME_DECIMALS);
    Ok(Interval::new(*utterance, begin, end, *label))
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, LineError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LineError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}
