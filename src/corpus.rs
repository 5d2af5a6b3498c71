//! Read-only recording registry shared by every pipeline worker.
//!
//! Holds the speaker ordering and output location of each recording and the
//! recording/speaker/offset of each utterance. Fully populated before a run.

use crate::config::OutputFormat;
use crate::error::{Result, TiergridError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One utterance of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: String,
    pub recording: String,
    pub speaker: String,
    /// Offset of the utterance inside its recording, in seconds.
    #[serde(default)]
    pub begin: f64,
    /// Orthographic transcript, used to restore surface word forms.
    #[serde(default)]
    pub text: Option<String>,
}

/// A recording and the speakers registered for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub name: String,
    /// Subdirectory of the output directory the annotation is written to.
    #[serde(default)]
    pub relative_dir: PathBuf,
    /// Duration in seconds, when known.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Speaker ordering; an export is complete once every speaker has tier data.
    pub speakers: Vec<String>,
}

impl Recording {
    pub fn new(name: impl Into<String>, speakers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            relative_dir: PathBuf::new(),
            duration: None,
            speakers,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_relative_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.relative_dir = dir.into();
        self
    }

    /// Where this recording's annotation lives under `root`.
    pub fn output_path(&self, root: &Path, format: OutputFormat) -> PathBuf {
        root.join(&self.relative_dir)
            .join(format!("{}.{}", self.name, format.extension()))
    }

    pub fn is_multi_speaker(&self) -> bool {
        self.speakers.len() > 1
    }
}

/// Registry of recordings and utterances.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    recordings: HashMap<String, Recording>,
    utterances: HashMap<String, Utterance>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry, validating every utterance against its recording.
    pub fn from_parts(recordings: Vec<Recording>, utterances: Vec<Utterance>) -> Result<Self> {
        let mut corpus = Self::new();
        for recording in recordings {
            corpus.add_recording(recording);
        }
        for utterance in utterances {
            corpus.add_utterance(utterance)?;
        }
        Ok(corpus)
    }

    pub fn add_recording(&mut self, recording: Recording) {
        self.recordings.insert(recording.name.clone(), recording);
    }

    /// Registers an utterance; its recording must exist and list its speaker.
    pub fn add_utterance(&mut self, utterance: Utterance) -> Result<()> {
        let recording = self.recordings.get(&utterance.recording).ok_or_else(|| {
            TiergridError::UnknownRecording {
                name: utterance.recording.clone(),
            }
        })?;
        if !recording.speakers.contains(&utterance.speaker) {
            return Err(TiergridError::Other(format!(
                "utterance {} has speaker {} not in the speaker ordering of {}",
                utterance.id, utterance.speaker, recording.name
            )));
        }
        self.utterances.insert(utterance.id.clone(), utterance);
        Ok(())
    }

    pub fn recording(&self, name: &str) -> Option<&Recording> {
        self.recordings.get(name)
    }

    pub fn utterance(&self, id: &str) -> Option<&Utterance> {
        self.utterances.get(id)
    }

    /// Number of speakers an export of `recording` must cover.
    pub fn speaker_count(&self, recording: &str) -> Option<usize> {
        self.recordings.get(recording).map(|r| r.speakers.len())
    }

    pub fn recordings(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.values()
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }
}
