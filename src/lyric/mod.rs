// Reference lyric handling
//
// - parser: raw LRC / plain text into a LyricDocument
// - tokenizer: lines into alignable tokens with a memoized comparison form

pub mod parser;
pub mod tokenizer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub use parser::LyricParser;
pub use tokenizer::{Normalizer, Token, TokenizedLine, space_cjk, tokenize_line};

/// Value reported for lines without a usable timestamp
pub const UNKNOWN_TIMESTAMP: f64 = -1.0;

/// Input format hint, only used for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricFormat {
    Lrc,
    Text,
}

impl LyricFormat {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("lrc") => LyricFormat::Lrc,
            _ => LyricFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub index: usize,
    pub text: String,
    /// Original (trusted) timestamp in seconds
    pub timestamp: Option<f64>,
}

impl LyricLine {
    pub fn timestamp_or_sentinel(&self) -> f64 {
        self.timestamp.unwrap_or(UNKNOWN_TIMESTAMP)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LyricDocument {
    pub headers: Vec<String>,
    pub lines: Vec<LyricLine>,
    pub translations: BTreeMap<usize, Vec<String>>,
}

impl LyricDocument {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Original timestamp of line `index`, if known
    pub fn anchor(&self, index: usize) -> Option<f64> {
        self.lines.get(index).and_then(|line| line.timestamp)
    }

    /// Original timestamp of the line after `index`, if known
    pub fn next_anchor(&self, index: usize) -> Option<f64> {
        self.anchor(index + 1)
    }

    pub fn translations_for(&self, index: usize) -> &[String] {
        self.translations.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Clean lyric text of every line, in order
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|line| line.text.as_str()).collect()
    }

    /// Reference text joined with newlines, as handed to a recognizer prompt
    pub fn reference_text(&self) -> String {
        self.texts().join("\n")
    }

    pub fn anchored_count(&self) -> usize {
        self.lines.iter().filter(|line| line.timestamp.is_some()).count()
    }
}
