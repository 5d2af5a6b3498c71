//! Label symbol mapping: numeric backend ids back to words and phones.

use crate::ctm::line::Interval;
use crate::defaults;
use crate::pipeline::types::LabelKind;
use std::collections::HashMap;
use thiserror::Error;

/// Reasons an utterance's labels could not be mapped to symbols.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("unknown {kind} id {id}")]
    UnknownId { kind: LabelKind, id: u32 },

    #[error("transcript word {word:?} needs more labels than the {available} aligned")]
    TranscriptOverrun { word: String, available: usize },
}

/// Symbol tables of one pronunciation dictionary.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    word_ids: HashMap<String, u32>,
    words: HashMap<u32, String>,
    phones: HashMap<u32, String>,
    /// Transcript words the dictionary splits into several lexicon words (clitics, compounds).
    splits: HashMap<String, Vec<String>>,
    oov_word: String,
}

impl Lexicon {
    /// Builds a lexicon from `symbol → id` tables.
    pub fn new(word_ids: HashMap<String, u32>, phone_ids: HashMap<String, u32>) -> Self {
        let words = word_ids.iter().map(|(w, id)| (*id, w.clone())).collect();
        let phones = phone_ids.into_iter().map(|(p, id)| (id, p)).collect();
        Self {
            word_ids,
            words,
            phones,
            splits: HashMap::new(),
            oov_word: defaults::OOV_WORD.to_string(),
        }
    }

    /// Registers transcript words that align as several lexicon words.
    pub fn with_splits(mut self, splits: HashMap<String, Vec<String>>) -> Self {
        self.splits = splits;
        self
    }

    pub fn with_oov_word(mut self, oov_word: impl Into<String>) -> Self {
        self.oov_word = oov_word.into();
        self
    }

    pub fn word(&self, id: u32) -> Option<&str> {
        self.words.get(&id).map(String::as_str)
    }

    pub fn phone(&self, id: u32) -> Option<&str> {
        self.phones.get(&id).map(String::as_str)
    }

    /// Lexicon ids a transcript word aligns as, in order.
    ///
    /// Unknown words align as the OOV word.
    pub fn to_ids(&self, word: &str) -> Vec<u32> {
        let single = |w: &str| {
            self.word_ids
                .get(w)
                .or_else(|| self.word_ids.get(&self.oov_word))
                .copied()
        };
        match self.splits.get(word) {
            Some(parts) => parts.iter().filter_map(|p| single(p.as_str())).collect(),
            None => single(word).into_iter().collect(),
        }
    }
}

/// Maps one utterance's raw intervals to symbolic labels.
#[derive(Debug, Clone)]
pub struct LabelMapper {
    kind: LabelKind,
    positions: Vec<String>,
    use_transcript: bool,
}

impl LabelMapper {
    pub fn new(kind: LabelKind) -> Self {
        Self {
            kind,
            positions: defaults::POSITION_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            use_transcript: false,
        }
    }

    /// Positional suffixes stripped from phone symbols.
    pub fn with_positions(mut self, positions: Vec<String>) -> Self {
        self.positions = positions;
        self
    }

    /// Rebuild word intervals from the utterance transcript when one is available.
    pub fn with_transcript_cleanup(mut self, enabled: bool) -> Self {
        self.use_transcript = enabled;
        self
    }

    pub fn kind(&self) -> LabelKind {
        self.kind
    }

    /// Maps `intervals` in place of their numeric labels.
    pub fn map(
        &self,
        intervals: Vec<Interval>,
        transcript: Option<&str>,
        lexicon: &Lexicon,
    ) -> Result<Vec<Interval>, MappingError> {
        match (self.kind, transcript) {
            (LabelKind::Phone, _) => self.map_phones(intervals, lexicon),
            (LabelKind::Word, Some(text)) if self.use_transcript => {
                map_words_from_transcript(intervals, text, lexicon)
            }
            (LabelKind::Word, _) => map_words(intervals, lexicon),
        }
    }

    fn map_phones(
        &self,
        intervals: Vec<Interval>,
        lexicon: &Lexicon,
    ) -> Result<Vec<Interval>, MappingError> {
        intervals
            .into_iter()
            .map(|mut interval| {
                if let Ok(id) = interval.label.parse::<u32>() {
                    let phone = lexicon.phone(id).ok_or(MappingError::UnknownId {
                        kind: LabelKind::Phone,
                        id,
                    })?;
                    interval.label = phone.to_string();
                }
                interval.label = strip_position(&interval.label, &self.positions).to_string();
                Ok(interval)
            })
            .collect()
    }
}

/// Removes the first matching positional suffix from a phone symbol.
pub fn strip_position<'a>(phone: &'a str, positions: &[String]) -> &'a str {
    positions
        .iter()
        .find_map(|p| phone.strip_suffix(p.as_str()).filter(|s| !s.is_empty()))
        .unwrap_or(phone)
}

fn map_words(intervals: Vec<Interval>, lexicon: &Lexicon) -> Result<Vec<Interval>, MappingError> {
    intervals
        .into_iter()
        .map(|mut interval| {
            if let Ok(id) = interval.label.parse::<u32>() {
                let word = lexicon.word(id).ok_or(MappingError::UnknownId {
                    kind: LabelKind::Word,
                    id,
                })?;
                interval.label = word.to_string();
            }
            Ok(interval)
        })
        .collect()
}

/// Walks the transcript, consuming one aligned interval per lexicon id.
///
/// The emitted interval carries the transcript's surface form and spans the
/// consumed intervals whose id matched (all consumed ones if none matched).
fn map_words_from_transcript(
    intervals: Vec<Interval>,
    transcript: &str,
    lexicon: &Lexicon,
) -> Result<Vec<Interval>, MappingError> {
    let mut mapped = Vec::new();
    let mut cursor = 0;

    for word in transcript.split_whitespace() {
        let ids = lexicon.to_ids(word);
        if ids.is_empty() {
            continue;
        }
        let Some(consumed) = intervals.get(cursor..cursor + ids.len()) else {
            return Err(MappingError::TranscriptOverrun {
                word: word.to_string(),
                available: intervals.len(),
            });
        };
        cursor += ids.len();

        let matched: Vec<&Interval> = consumed
            .iter()
            .zip(&ids)
            .filter(|(interval, id)| interval.label.parse::<u32>().ok() == Some(**id))
            .map(|(interval, _)| interval)
            .collect();
        let span: Vec<&Interval> = if matched.is_empty() {
            consumed.iter().collect()
        } else {
            matched
        };

        let begin = span.iter().map(|i| i.begin).fold(f64::INFINITY, f64::min);
        let end = span.iter().map(|i| i.end).fold(f64::NEG_INFINITY, f64::max);
        mapped.push(Interval::new(consumed[0].utterance.clone(), begin, end, word));
    }

    if let Some(rest) = intervals.get(cursor..).filter(|rest| !rest.is_empty()) {
        tracing::debug!(
            utterance = %rest[0].utterance,
            leftover = rest.len(),
            transcript_words = mapped.len(),
            "transcript exhausted before alignment, trailing intervals dropped"
        );
    }

    Ok(mapped)
}
