// whisper.cpp full JSON output (`-ojf`)
//
// Times are integer millisecond offsets and words arrive as sub-word tokens;
// a token starting with a space opens a new word.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use super::common::{AiSegment, AiWord, Recognition, RecognitionMapper};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOutput {
    #[serde(default)]
    pub result: Option<WhisperCppResult>,
    pub transcription: Vec<WhisperCppSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppResult {
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppSegment {
    pub offsets: WhisperCppOffsets,
    pub text: String,
    #[serde(default)]
    pub tokens: Vec<WhisperCppToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppToken {
    pub text: String,
    pub offsets: WhisperCppOffsets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOffsets {
    pub from: i64,
    pub to: i64,
}

/// Mapper for whisper.cpp format
pub struct WhisperCppMapper;

impl RecognitionMapper<WhisperCppOutput> for WhisperCppMapper {
    fn to_recognition(whisper_output: WhisperCppOutput) -> Result<Recognition> {
        let language = whisper_output.result.map(|r| r.language);

        let segments = whisper_output
            .transcription
            .into_iter()
            .map(|seg| AiSegment {
                start: millis_to_seconds(seg.offsets.from),
                end: millis_to_seconds(seg.offsets.to),
                text: seg.text.trim().to_string(),
                words: merge_tokens(&seg.tokens),
            })
            .collect();

        Ok(Recognition { segments, language })
    }
}

fn millis_to_seconds(ms: i64) -> f64 {
    ms as f64 / 1000.0
}

/// Join sub-word tokens into words, dropping special tokens like `[_BEG_]`
fn merge_tokens(tokens: &[WhisperCppToken]) -> Vec<AiWord> {
    let mut words: Vec<AiWord> = Vec::new();

    for token in tokens {
        if token.text.starts_with("[_") || token.text.trim().is_empty() {
            continue;
        }

        let start = millis_to_seconds(token.offsets.from);
        let end = millis_to_seconds(token.offsets.to);
        match words.last_mut() {
            Some(word) if !token.text.starts_with(' ') => {
                word.text.push_str(&token.text);
                word.end = end;
            }
            _ => words.push(AiWord {
                start,
                end,
                text: token.text.trim_start().to_string(),
            }),
        }
    }

    words
}
