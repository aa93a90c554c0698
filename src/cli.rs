use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{AlignStrategy, Config};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Align a lyric file against a recognizer transcript (JSON)
    Align {
        /// Reference lyrics (.lrc or plain text)
        #[arg(short, long)]
        lyrics: PathBuf,

        /// Recognizer transcript with word timestamps
        #[arg(short, long)]
        transcript: PathBuf,

        /// Output LRC file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        tuning: AlignOverrides,
    },

    /// Convert a transcript into line-level LRC without reference lyrics
    Raw {
        /// Recognizer transcript
        #[arg(short, long)]
        transcript: PathBuf,

        /// Output LRC file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        tuning: AlignOverrides,
    },

    /// Align every lyric file in a directory that has a matching transcript
    Batch {
        /// Directory containing <name>.lrc and <name>.json pairs
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Output directory for aligned files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[command(flatten)]
        tuning: AlignOverrides,
    },

    /// Recognize an audio file with whisper and align the result
    Transcribe {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,

        /// Reference lyrics; without them the raw transcript is emitted
        #[arg(short, long)]
        lyrics: Option<PathBuf>,

        /// Output LRC file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Language of the lyrics
        #[arg(long)]
        language: Option<String>,

        /// Whisper model name
        #[arg(short, long)]
        model: Option<String>,

        /// Initial prompt for the recognizer
        #[arg(long)]
        prompt: Option<String>,

        #[command(flatten)]
        tuning: AlignOverrides,
    },

    /// Print the parsed lyric document as JSON
    Inspect {
        /// Lyric file
        #[arg(short, long)]
        lyrics: PathBuf,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "lrcsync.toml")]
        output: PathBuf,
    },
}

/// Alignment settings that can be overridden per run
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct AlignOverrides {
    /// Offset in seconds added to every emitted timestamp
    #[arg(long, allow_hyphen_values = true)]
    pub offset: Option<f64>,

    /// Keep recognized times even when they drift from the original timestamps
    #[arg(long)]
    pub no_force_calibration: bool,

    /// Spread calibrated lines evenly up to the next line
    #[arg(long)]
    pub average_distribution: bool,

    /// Matching strategy
    #[arg(long, value_enum)]
    pub strategy: Option<AlignStrategy>,
}

impl AlignOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(offset) = self.offset {
            config.align.time_offset = offset;
        }
        if self.no_force_calibration {
            config.align.force_calibration = false;
        }
        if self.average_distribution {
            config.align.average_distribution = true;
        }
        if let Some(strategy) = self.strategy {
            config.align.strategy = strategy;
        }
    }
}
