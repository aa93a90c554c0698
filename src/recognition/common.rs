use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lyric::Normalizer;

/// One recognized word (or character, for CJK output) with its timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiWord {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A recognized phrase and the words it is made of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub words: Vec<AiWord>,
}

/// Recognizer output after ingestion; format-independent and read-only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub segments: Vec<AiSegment>,
    pub language: Option<String>,
}

/// A single normalized character sliced out of an [`AiWord`]
#[derive(Debug, Clone, PartialEq)]
pub struct AiChar {
    pub text: char,
    pub start: f64,
    /// Index of the source word in [`Recognition::words`] order
    pub word_index: usize,
}

/// Converts a service-specific recognizer output into a [`Recognition`]
pub trait RecognitionMapper<T> {
    fn to_recognition(service_result: T) -> Result<Recognition>;
}

impl Recognition {
    /// Every word of every segment, in order
    pub fn words(&self) -> impl Iterator<Item = &AiWord> {
        self.segments.iter().flat_map(|segment| segment.words.iter())
    }

    pub fn word_count(&self) -> usize {
        self.segments.iter().map(|segment| segment.words.len()).sum()
    }

    /// Character stream used as the alignment granularity. Each word's
    /// duration is split evenly across its normalized characters; words that
    /// normalize to nothing contribute no characters.
    pub fn chars(&self, normalizer: &mut Normalizer) -> Vec<AiChar> {
        let mut chars = Vec::new();

        for (word_index, word) in self.words().enumerate() {
            let clean = normalizer.normalize(&word.text);
            let count = clean.chars().count();
            if count == 0 {
                continue;
            }

            let char_duration = (word.end - word.start) / count as f64;
            for (i, c) in clean.chars().enumerate() {
                chars.push(AiChar {
                    text: c,
                    start: word.start + i as f64 * char_duration,
                    word_index,
                });
            }
        }

        chars
    }
}
