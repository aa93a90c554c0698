// OpenAI Whisper / stable-ts JSON support
// Also hosts the recognizer that drives the `whisper` command line tool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RecognizerConfig;
use crate::error::{LrcSyncError, Result};
use super::{
    ModelHandle, RecognitionRequest, Recognizer,
    common::{AiSegment, AiWord, Recognition, RecognitionMapper},
};

/// Whisper JSON output; some tools write the bare segment list instead
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhisperJsonOutput {
    Full {
        #[serde(default)]
        text: String,
        segments: Vec<WhisperJsonSegment>,
        #[serde(default)]
        language: Option<String>,
    },
    Segments(Vec<WhisperJsonSegment>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperJsonSegment {
    #[serde(default)]
    pub id: Option<u64>,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub words: Option<Vec<WhisperJsonWord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperJsonWord {
    #[serde(alias = "text")]
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub probability: Option<f64>,
}

/// Mapper for Whisper JSON format
pub struct WhisperJsonMapper;

impl RecognitionMapper<WhisperJsonOutput> for WhisperJsonMapper {
    fn to_recognition(whisper_output: WhisperJsonOutput) -> Result<Recognition> {
        let (segments, language) = match whisper_output {
            WhisperJsonOutput::Full { segments, language, .. } => (segments, language),
            WhisperJsonOutput::Segments(segments) => (segments, None),
        };

        let segments = segments
            .into_iter()
            .map(|seg| AiSegment {
                start: seg.start,
                end: seg.end,
                text: seg.text.trim().to_string(),
                words: seg
                    .words
                    .unwrap_or_default()
                    .into_iter()
                    .map(|w| AiWord { start: w.start, end: w.end, text: w.word })
                    .collect(),
            })
            .collect();

        Ok(Recognition { segments, language })
    }
}

/// Runs the `whisper` command line tool with word timestamps enabled
pub struct WhisperCliRecognizer {
    config: RecognizerConfig,
}

impl WhisperCliRecognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }

    /// Check if the whisper command is available
    pub async fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("--help")
            .output()
            .await
            .map_err(|e| LrcSyncError::Recognition(format!("{} command not found: {}", self.config.binary_path, e)))?;

        if output.status.success() {
            debug!("{} command-line tool is available", self.config.binary_path);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(LrcSyncError::Recognition(format!(
                "{} not available. Install with: pip install openai-whisper\nError: {}",
                self.config.binary_path, stderr
            )))
        }
    }
}

#[async_trait]
impl Recognizer for WhisperCliRecognizer {
    async fn load_model(&self, model_id: &str) -> Result<ModelHandle> {
        self.check_availability().await?;

        let model_dir = self.config.model_dir.as_ref().map(PathBuf::from);
        if let Some(dir) = &model_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        info!("Prepared whisper model {}", model_id);
        Ok(ModelHandle { id: model_id.to_string(), model_dir })
    }

    async fn recognize(&self, model: &ModelHandle, request: &RecognitionRequest) -> Result<Recognition> {
        info!("Recognizing {} with model {}", request.audio_path.display(), model.id);

        let temp_dir = tempfile::tempdir()
            .map_err(|e| LrcSyncError::Recognition(format!("Failed to create temp directory: {}", e)))?;
        let output_dir = temp_dir.path();

        let mut cmd = Command::new(&self.config.binary_path);
        cmd.arg(&request.audio_path)
            .arg("--model").arg(&model.id)
            .arg("--output_dir").arg(output_dir)
            .arg("--output_format").arg("json")
            .arg("--word_timestamps").arg("True")
            .arg("--language").arg(&request.language)
            .arg("--initial_prompt").arg(request.initial_prompt());

        if let Some(dir) = &model.model_dir {
            cmd.arg("--model_dir").arg(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| LrcSyncError::Recognition(format!("Failed to execute whisper command: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LrcSyncError::Recognition(format!("Whisper recognition failed: {}", stderr)));
        }

        let audio_stem = request
            .audio_path
            .file_stem()
            .ok_or_else(|| LrcSyncError::Recognition("Invalid audio filename".to_string()))?;
        let json_file = output_dir.join(format!("{}.json", audio_stem.to_string_lossy()));

        let json_content = tokio::fs::read_to_string(&json_file)
            .await
            .map_err(|e| LrcSyncError::Recognition(format!("Failed to read whisper JSON output: {}", e)))?;

        let whisper_output: WhisperJsonOutput = serde_json::from_str(&json_content)?;
        let recognition = WhisperJsonMapper::to_recognition(whisper_output)?;

        info!(
            "Recognition produced {} segments, {} words",
            recognition.segments.len(),
            recognition.word_count()
        );
        Ok(recognition)
    }
}
