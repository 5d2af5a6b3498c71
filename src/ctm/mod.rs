//! Alignment label streams: record parsing, symbol mapping and grouping.

pub mod grouper;
pub mod line;
pub mod mapping;

pub use grouper::{GroupError, GroupOutput, StreamGrouper};
pub use line::{Interval, LineError, parse_line};
pub use mapping::{LabelMapper, Lexicon, MappingError};
