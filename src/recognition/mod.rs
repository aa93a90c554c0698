// Speech recognition boundary
//
// Recognizer results enter the crate through exactly one ingestion step:
// a RecognitionMapper turns a service-specific JSON shape into a Recognition.
// - whisper_json: openai-whisper / stable-ts output, plus the CLI recognizer
// - whisper_cpp: whisper.cpp full JSON output
//
// To support another recognizer output, add serde structs for it, implement
// RecognitionMapper, and teach Recognition::from_json to detect the shape.

pub mod common;
pub mod whisper_cpp;
pub mod whisper_json;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use common::*;
use crate::config::RecognizerConfig;
use crate::error::{LrcSyncError, Result};
use whisper_cpp::{WhisperCppMapper, WhisperCppOutput};
use whisper_json::{WhisperJsonMapper, WhisperJsonOutput};

/// A loaded (or resolved) recognition model, cached by the worker
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHandle {
    pub id: String,
    pub model_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub audio_path: PathBuf,
    pub language: String,
    /// User supplied prompt
    pub prompt: Option<String>,
    /// Reference lyrics, already spaced for CJK
    pub reference_text: Option<String>,
}

impl RecognitionRequest {
    /// User prompt, else the reference text, else a per-language default
    pub fn initial_prompt(&self) -> String {
        [&self.prompt, &self.reference_text]
            .into_iter()
            .flatten()
            .map(|p| p.trim())
            .find(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| RecognizerConfig::default_prompt(&self.language).to_string())
    }
}

/// Main trait for speech recognition engines
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Load or resolve the model identified by `model_id`
    async fn load_model(&self, model_id: &str) -> Result<ModelHandle>;

    /// Recognize speech with word-level timestamps
    async fn recognize(&self, model: &ModelHandle, request: &RecognitionRequest) -> Result<Recognition>;
}

impl Recognition {
    /// Ingest recognizer JSON of either supported shape
    pub fn from_json(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;

        if value.get("transcription").is_some() {
            let output: WhisperCppOutput = serde_json::from_value(value)?;
            return WhisperCppMapper::to_recognition(output);
        }

        if value.get("segments").is_some() || value.is_array() {
            let output: WhisperJsonOutput = serde_json::from_value(value)?;
            return WhisperJsonMapper::to_recognition(output);
        }

        Err(LrcSyncError::UnsupportedFormat(
            "recognition JSON has neither 'segments' nor 'transcription'".to_string(),
        ))
    }

    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LrcSyncError::FileNotFound(path.display().to_string()));
        }
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }
}
