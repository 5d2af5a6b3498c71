//! Run manifest: the registry, lexicons and job layout of one export.
//!
//! ```toml
//! [lexicons.english]
//! words = { hello = 1, world = 2 }
//! phones = { HH_B = 1, OW_E = 2 }
//!
//! [[recordings]]
//! name = "interview"
//! speakers = ["alice", "bob"]
//!
//! [[utterances]]
//! id = "alice-1"
//! recording = "interview"
//! speaker = "alice"
//! begin = 0.0
//!
//! [[jobs]]
//! id = 0
//! log = "logs/align.0.log"
//!
//! [[jobs.partitions]]
//! lexicon = "english"
//! words = "ctm/word.0.ctm"
//! phones = "ctm/phone.0.ctm"
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use crate::corpus::{Corpus, Recording, Utterance};
use crate::ctm::mapping::Lexicon;
use crate::error::{Result, TiergridError};
use crate::job::{JobSpec, Partition};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Symbol tables of one dictionary.
#[derive(Debug, Clone, Deserialize)]
pub struct LexiconEntry {
    pub words: HashMap<String, u32>,
    pub phones: HashMap<String, u32>,
    #[serde(default)]
    pub splits: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub oov_word: Option<String>,
}

impl LexiconEntry {
    fn build(&self) -> Lexicon {
        let lexicon = Lexicon::new(self.words.clone(), self.phones.clone())
            .with_splits(self.splits.clone());
        match &self.oov_word {
            Some(oov) => lexicon.with_oov_word(oov.clone()),
            None => lexicon,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionEntry {
    pub lexicon: String,
    pub words: PathBuf,
    pub phones: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobEntry {
    pub id: usize,
    #[serde(default)]
    pub log: Option<PathBuf>,
    pub partitions: Vec<PartitionEntry>,
}

/// Deserialized run manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub lexicons: BTreeMap<String, LexiconEntry>,
    pub recordings: Vec<Recording>,
    #[serde(default)]
    pub utterances: Vec<Utterance>,
    #[serde(default)]
    pub jobs: Vec<JobEntry>,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Registry and jobs ready for a pipeline run.
#[derive(Debug)]
pub struct Run {
    pub corpus: Arc<Corpus>,
    pub jobs: Vec<JobSpec>,
}

impl Manifest {
    /// Reads a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut manifest = Self::parse(&contents).map_err(|e| TiergridError::Manifest {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        manifest.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(manifest)
    }

    pub fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Builds the registry and job specs, resolving lexicons and paths.
    pub fn into_run(self) -> Result<Run> {
        let invalid = |message: String| TiergridError::Manifest {
            path: self.base_dir.display().to_string(),
            message,
        };

        let lexicons: HashMap<&str, Arc<Lexicon>> = self
            .lexicons
            .iter()
            .map(|(name, entry)| (name.as_str(), Arc::new(entry.build())))
            .collect();

        let mut jobs = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let mut partitions = Vec::with_capacity(job.partitions.len());
            for entry in &job.partitions {
                let lexicon = lexicons.get(entry.lexicon.as_str()).ok_or_else(|| {
                    invalid(format!(
                        "job {} references unknown lexicon {:?}",
                        job.id, entry.lexicon
                    ))
                })?;
                partitions.push(Partition::new(
                    entry.lexicon.clone(),
                    self.resolve(&entry.words),
                    self.resolve(&entry.phones),
                    Arc::clone(lexicon),
                ));
            }
            let mut spec = JobSpec::new(job.id, partitions);
            if let Some(log) = &job.log {
                spec = spec.with_log(self.resolve(log));
            }
            jobs.push(spec);
        }

        let corpus = Corpus::from_parts(self.recordings, self.utterances)?;
        Ok(Run {
            corpus: Arc::new(corpus),
            jobs,
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::LabelKind;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[lexicons.english]
words = { hello = 1, world = 2 }
phones = { HH_B = 1, OW_E = 2 }

[[recordings]]
name = "interview"
relative_dir = "set1"
speakers = ["alice", "bob"]

[[utterances]]
id = "alice-1"
recording = "interview"
speaker = "alice"
begin = 1.5
text = "hello world"

[[jobs]]
id = 0
log = "logs/align.0.log"

[[jobs.partitions]]
lexicon = "english"
words = "ctm/word.0.ctm"
phones = "/abs/phone.0.ctm"
"#;

    #[test]
    fn test_load_builds_corpus_and_jobs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, MANIFEST).unwrap();

        let run = Manifest::load(&path).unwrap().into_run().unwrap();

        assert_eq!(run.corpus.speaker_count("interview"), Some(2));
        let utterance = run.corpus.utterance("alice-1").unwrap();
        assert_eq!(utterance.begin, 1.5);
        assert_eq!(utterance.text.as_deref(), Some("hello world"));

        assert_eq!(run.jobs.len(), 1);
        let job = &run.jobs[0];
        assert_eq!(job.log_path, Some(dir.path().join("logs/align.0.log")));
        let partition = &job.partitions[0];
        assert_eq!(partition.path(LabelKind::Word), dir.path().join("ctm/word.0.ctm"));
        assert_eq!(partition.path(LabelKind::Phone), Path::new("/abs/phone.0.ctm"));
        assert_eq!(partition.lexicon.word(2), Some("world"));
    }

    #[test]
    fn test_unknown_lexicon_is_rejected() {
        let renamed = MANIFEST.replace("lexicon = \"english\"", "lexicon = \"french\"");
        let manifest = Manifest::parse(&renamed).unwrap();
        let err = manifest.into_run().unwrap_err();
        assert!(err.to_string().contains("unknown lexicon \"french\""));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "recordings = 5").unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, TiergridError::Manifest { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_utterance_for_unknown_recording_fails() {
        let manifest = Manifest::parse(
            r#"
recordings = []

[[utterances]]
id = "u1"
recording = "nowhere"
speaker = "x"
"#,
        )
        .unwrap();
        assert!(matches!(
            manifest.into_run().unwrap_err(),
            TiergridError::UnknownRecording { .. }
        ));
    }
}
