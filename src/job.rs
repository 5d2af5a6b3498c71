//! Job descriptions handed to the pipeline.

use crate::ctm::mapping::Lexicon;
use crate::pipeline::types::LabelKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One dictionary's share of a job: its label files and symbol tables.
#[derive(Debug, Clone)]
pub struct Partition {
    pub name: String,
    pub word_path: PathBuf,
    pub phone_path: PathBuf,
    pub lexicon: Arc<Lexicon>,
}

impl Partition {
    pub fn new(
        name: impl Into<String>,
        word_path: impl Into<PathBuf>,
        phone_path: impl Into<PathBuf>,
        lexicon: Arc<Lexicon>,
    ) -> Self {
        Self {
            name: name.into(),
            word_path: word_path.into(),
            phone_path: phone_path.into(),
            lexicon,
        }
    }

    /// Label file of the given stream.
    pub fn path(&self, kind: LabelKind) -> &Path {
        match kind {
            LabelKind::Word => &self.word_path,
            LabelKind::Phone => &self.phone_path,
        }
    }
}

/// A corpus partition processed by its own grouper pair and combine worker.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: usize,
    pub partitions: Vec<Partition>,
    /// Backend log scanned for failure markers once the job's groupers finish.
    pub log_path: Option<PathBuf>,
}

impl JobSpec {
    pub fn new(id: usize, partitions: Vec<Partition>) -> Self {
        Self {
            id,
            partitions,
            log_path: None,
        }
    }

    pub fn with_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}
