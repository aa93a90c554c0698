use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, LrcSyncError};

/// Smallest spacing between two consecutive character tags (seconds)
pub const MIN_DURATION: f64 = 0.06;

/// Gap between matched times inside one line that marks the earlier one as spurious
pub const HALLUCINATION_GAP: f64 = 3.0;

/// Anchor gap above which holes snap to the next anchor instead of interpolating
pub const RIGHT_SNAP_GAP: f64 = 2.5;

/// Drift from the trusted line timestamp tolerated before the line is shifted
pub const CALIBRATION_TOLERANCE: f64 = 1.5;

/// Gap kept before the next line's anchor by the final boundary check
pub const BOUNDARY_GAP: f64 = 0.05;

/// Gap kept before the next line's anchor by the overlap and distribution passes
pub const OVERLAP_GAP: f64 = 0.1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub align: AlignConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlignStrategy {
    /// Global: one diff over the whole document, robust against drift
    Global,
    /// Windowed: per-line bounded look-ahead constrained by recognizer segments
    Windowed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Matching strategy used to assign raw times
    pub strategy: AlignStrategy,
    /// Offset in seconds added to every emitted timestamp
    pub time_offset: f64,
    /// Shift lines that drift away from their original timestamp
    pub force_calibration: bool,
    /// Respace calibrated lines evenly instead of keeping the recognized rhythm
    pub average_distribution: bool,

    pub min_duration: f64,
    pub hallucination_gap: f64,
    pub right_snap_gap: f64,
    /// Estimated duration of one token when snapping to the next anchor
    pub right_snap_step: f64,
    /// Smallest distance a snapped hole keeps from the time before it
    pub right_snap_floor: f64,
    pub max_interpolation_step: f64,
    /// Step used for trailing holes with no anchor after them
    pub left_snap_step: f64,
    pub calibration_tolerance: f64,
    /// Cadence of tokens synthesized from a trusted timestamp
    pub synthesized_step: f64,
    pub overlap_gap: f64,
    /// Per-token estimate for average distribution without a usable next anchor
    pub average_step: f64,
    /// Per-token estimate when the next anchor leaves too short a span
    pub short_span_step: f64,
    pub min_average_span: f64,
    /// Recognized seconds per token above which the recognized span is trusted
    pub slow_rate_threshold: f64,
    pub boundary_gap: f64,
    pub boundary_min_span: f64,
    /// Span reserved when a line starts past its hard limit
    pub boundary_back_off: f64,

    /// Words searched ahead of the pool cursor (windowed strategy)
    pub search_window: usize,
    /// Recognizer segments considered ahead when mapping a line (windowed strategy)
    pub segment_lookahead: usize,
    /// Minimum similarity for a line to be mapped to a segment (windowed strategy)
    pub segment_match_ratio: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            strategy: AlignStrategy::Global,
            time_offset: 0.0,
            force_calibration: true,
            average_distribution: false,
            min_duration: MIN_DURATION,
            hallucination_gap: HALLUCINATION_GAP,
            right_snap_gap: RIGHT_SNAP_GAP,
            right_snap_step: 0.3,
            right_snap_floor: 0.1,
            max_interpolation_step: 0.4,
            left_snap_step: 0.25,
            calibration_tolerance: CALIBRATION_TOLERANCE,
            synthesized_step: 0.25,
            overlap_gap: OVERLAP_GAP,
            average_step: 0.3,
            short_span_step: 0.25,
            min_average_span: 0.2,
            slow_rate_threshold: 0.5,
            boundary_gap: BOUNDARY_GAP,
            boundary_min_span: 0.1,
            boundary_back_off: 0.2,
            search_window: 20,
            segment_lookahead: 3,
            segment_match_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Path to the whisper command line tool
    pub binary_path: String,
    /// Model name or identifier passed to the recognizer
    pub model: String,
    /// Language of the sung lyrics
    pub language: String,
    /// Initial prompt; falls back to the reference text, then a per-language default
    pub prompt: Option<String>,
    /// Directory holding downloaded model files
    pub model_dir: Option<String>,
    /// Drop the cached model after every task
    pub release_model: bool,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            binary_path: "whisper".to_string(),
            model: "large-v2".to_string(),
            language: "ja".to_string(),
            prompt: None,
            model_dir: None,
            release_model: true,
        }
    }
}

impl RecognizerConfig {
    /// Prompt used when neither a user prompt nor a reference text is available
    pub fn default_prompt(language: &str) -> &'static str {
        match language {
            "zh" => "这是一首中文歌曲，歌词包含标点符号。",
            "ja" => "这是一首日语歌曲，包含汉字和假名。",
            "en" => "This is a pop song with clear lyrics.",
            "yue" => "这是一首粤语歌曲。",
            "ko" => "This is a Korean song.",
            _ => "Music lyrics.",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for generated files; defaults to the input's directory
    pub output_dir: Option<String>,
    /// Suffix inserted before the extension of generated lyric files
    pub suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            suffix: "aligned".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LrcSyncError::Config(format!("Failed to read config file: {}", e)))?;

        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LrcSyncError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| LrcSyncError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [align]
            average_distribution = true
            time_offset = -0.5

            [recognizer]
            language = "zh"
            "#,
        )
        .unwrap();

        assert!(config.align.average_distribution);
        assert!(config.align.force_calibration);
        assert_eq!(config.align.time_offset, -0.5);
        assert_eq!(config.align.hallucination_gap, HALLUCINATION_GAP);
        assert_eq!(config.align.strategy, AlignStrategy::Global);
        assert_eq!(config.recognizer.language, "zh");
        assert_eq!(config.recognizer.binary_path, "whisper");
        assert_eq!(config.output.suffix, "aligned");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lrcsync.toml");

        let mut config = Config::default();
        config.align.strategy = AlignStrategy::Windowed;
        config.recognizer.prompt = Some("prompt".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.align.strategy, AlignStrategy::Windowed);
        assert_eq!(loaded.recognizer.prompt.as_deref(), Some("prompt"));
    }

    #[test]
    fn test_malformed_config_is_a_toml_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lrcsync.toml");
        std::fs::write(&path, "[align\ntime_offset = ").unwrap();

        assert!(matches!(Config::from_file(&path), Err(LrcSyncError::Toml(_))));
        assert!(matches!(
            Config::from_file(dir.path().join("missing.toml")),
            Err(LrcSyncError::Config(_))
        ));
    }

    #[test]
    fn test_default_prompt_falls_back() {
        assert_eq!(RecognizerConfig::default_prompt("en"), "This is a pop song with clear lyrics.");
        assert_eq!(RecognizerConfig::default_prompt("xx"), "Music lyrics.");
    }
}
