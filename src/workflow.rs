use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::align::{AlignOutcome, Aligner, StopFlag};
use crate::config::Config;
use crate::error::{LrcSyncError, Result};
use crate::lyric::{LyricDocument, LyricFormat, LyricParser};
use crate::recognition::{Recognition, Recognizer};
use crate::recognition::whisper_json::WhisperCliRecognizer;
use crate::worker::{Task, TaskOutcome, Worker, WorkerCommand, WorkerEvent};

/// Lyric file extensions picked up by batch processing
const LYRIC_EXTENSIONS: [&str; 2] = ["lrc", "txt"];

/// How a transcription run ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum TranscribeOutcome {
    Written(PathBuf),
    /// Stopped on request; no file was written
    Stopped,
}

pub struct Workflow {
    config: Config,
    parser: LyricParser,
}

impl Workflow {
    pub fn new(config: Config) -> Self {
        Self { config, parser: LyricParser::new() }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn load_lyrics<P: AsRef<Path>>(&self, path: P) -> Result<LyricDocument> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LrcSyncError::FileNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path).await?;
        Ok(self.parser.parse(&content, LyricFormat::from_path(path)))
    }

    /// Align a lyric file against an existing recognizer transcript
    pub async fn align_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        lyrics_path: P,
        transcript_path: Q,
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf> {
        let lyrics_path = lyrics_path.as_ref();
        info!("Aligning {} with {}", lyrics_path.display(), transcript_path.as_ref().display());

        let document = self.load_lyrics(lyrics_path).await?;
        let recognition = Recognition::from_file(transcript_path).await?;
        let lyrics = self.align(&document, &recognition)?;

        let output_path = match output_path {
            Some(path) => path,
            None => self.output_path_for(lyrics_path)?,
        };
        self.write_output(&output_path, &lyrics).await?;
        Ok(output_path)
    }

    /// Render a transcript as line-level LRC without reference lyrics
    pub async fn raw_transcript<P: AsRef<Path>>(&self, transcript_path: P, output_path: Option<PathBuf>) -> Result<PathBuf> {
        let transcript_path = transcript_path.as_ref();
        let recognition = Recognition::from_file(transcript_path).await?;
        let lyrics = self.align(&LyricDocument::default(), &recognition)?;

        let output_path = match output_path {
            Some(path) => path,
            None => self.output_path_for(transcript_path)?,
        };
        self.write_output(&output_path, &lyrics).await?;
        Ok(output_path)
    }

    /// Align every lyric file in a directory that has a `<stem>.json` transcript next to it
    pub async fn process_directory<P: AsRef<Path>>(&self, input_dir: P) -> Result<Vec<PathBuf>> {
        let input_dir = input_dir.as_ref();
        info!("Processing directory: {}", input_dir.display());

        if !input_dir.is_dir() {
            return Err(LrcSyncError::Config("Input path is not a directory".to_string()));
        }

        let generated_marker = format!(".{}.", self.config.output.suffix);
        let mut pairs = Vec::new();
        for entry in WalkDir::new(input_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_lyric = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| LYRIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
            let is_generated = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().contains(&generated_marker));
            if !is_lyric || is_generated {
                continue;
            }

            let transcript = path.with_extension("json");
            if transcript.exists() {
                pairs.push((path.to_path_buf(), transcript));
            } else {
                warn!("No transcript found for {}", path.display());
            }
        }

        info!("Found {} lyric files with transcripts", pairs.len());

        let mut written = Vec::new();
        for (lyrics_path, transcript_path) in pairs {
            match self.align_files(&lyrics_path, &transcript_path, None).await {
                Ok(output) => {
                    info!("Successfully aligned: {}", lyrics_path.display());
                    written.push(output);
                }
                Err(e) => warn!("Failed to align {}: {}", lyrics_path.display(), e),
            }
        }

        Ok(written)
    }

    /// Recognize an audio file with whisper and align it against optional lyrics.
    /// Ctrl-C stops the run.
    pub async fn transcribe_audio<P: AsRef<Path>>(
        &self,
        audio_path: P,
        lyrics_path: Option<PathBuf>,
        output_path: Option<PathBuf>,
    ) -> Result<TranscribeOutcome> {
        let recognizer = WhisperCliRecognizer::new(self.config.recognizer.clone());
        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.transcribe_with(recognizer, audio_path, lyrics_path, output_path, interrupted)
            .await
    }

    /// Run one task through a worker; `cancel` completing stops it
    pub async fn transcribe_with<R, P, C>(
        &self,
        recognizer: R,
        audio_path: P,
        lyrics_path: Option<PathBuf>,
        output_path: Option<PathBuf>,
        cancel: C,
    ) -> Result<TranscribeOutcome>
    where
        R: Recognizer + 'static,
        P: AsRef<Path>,
        C: Future<Output = ()>,
    {
        let audio_path = audio_path.as_ref();
        if !audio_path.exists() {
            return Err(LrcSyncError::FileNotFound(audio_path.display().to_string()));
        }

        let document = match &lyrics_path {
            Some(path) => self.load_lyrics(path).await?,
            None => LyricDocument::default(),
        };

        let worker = Worker::new(recognizer);
        let stop = worker.stop_flag();
        let (command_tx, command_rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::channel(32);
        let handle = tokio::spawn(worker.run(command_rx, event_tx));

        let task = Task::new(
            audio_path.to_path_buf(),
            document,
            self.config.recognizer.clone(),
            self.config.align.clone(),
        );
        command_tx
            .send(WorkerCommand::Run(Box::new(task)))
            .await
            .map_err(|e| LrcSyncError::Worker(format!("Failed to submit task: {}", e)))?;
        command_tx
            .send(WorkerCommand::Exit)
            .await
            .map_err(|e| LrcSyncError::Worker(format!("Failed to stop worker: {}", e)))?;

        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        tokio::pin!(cancel);
        let mut stopping = false;
        let mut outcome = None;
        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(WorkerEvent::Progress { message, percent, .. }) => {
                        pb.set_position(percent as u64);
                        pb.set_message(message);
                    }
                    Some(WorkerEvent::Finished { outcome: finished, .. }) => outcome = Some(finished),
                    None => break,
                },
                _ = &mut cancel, if !stopping => {
                    info!("Stop requested, waiting for the current step to finish");
                    pb.set_message("Stopping...");
                    stop.stop();
                    stopping = true;
                }
            }
        }
        pb.finish_and_clear();

        handle
            .await
            .map_err(|e| LrcSyncError::Worker(format!("Worker task panicked: {}", e)))?;

        let lyrics = match outcome {
            Some(TaskOutcome::Success(lyrics)) => lyrics,
            Some(TaskOutcome::Error(message)) => return Err(LrcSyncError::Recognition(message)),
            Some(TaskOutcome::Aborted) => {
                info!("Transcription stopped, nothing written");
                return Ok(TranscribeOutcome::Stopped);
            }
            None => return Err(LrcSyncError::Worker("Worker exited without a result".to_string())),
        };

        let output_path = match output_path {
            Some(path) => path,
            None => self.output_path_for(lyrics_path.as_deref().unwrap_or(audio_path))?,
        };
        self.write_output(&output_path, &lyrics).await?;
        Ok(TranscribeOutcome::Written(output_path))
    }

    /// Parsed document as pretty JSON
    pub async fn inspect<P: AsRef<Path>>(&self, lyrics_path: P) -> Result<String> {
        let document = self.load_lyrics(lyrics_path).await?;
        Ok(serde_json::to_string_pretty(&document)?)
    }

    fn align(&self, document: &LyricDocument, recognition: &Recognition) -> Result<String> {
        match Aligner::new(self.config.align.clone()).run(document, recognition, &StopFlag::new()) {
            AlignOutcome::Completed(lyrics) => Ok(lyrics),
            AlignOutcome::Aborted => Err(LrcSyncError::Worker("Alignment was aborted".to_string())),
        }
    }

    /// `<output_dir or input dir>/<stem>.<suffix>.lrc`
    pub fn output_path_for(&self, input_path: &Path) -> Result<PathBuf> {
        let stem = input_path
            .file_stem()
            .ok_or_else(|| LrcSyncError::Config("Invalid input filename".to_string()))?
            .to_string_lossy();

        let output_dir = match &self.config.output.output_dir {
            Some(dir) => PathBuf::from(dir),
            None => input_path
                .parent()
                .ok_or_else(|| LrcSyncError::Config("Cannot determine output directory".to_string()))?
                .to_path_buf(),
        };

        Ok(output_dir.join(format!("{}.{}.lrc", stem, self.config.output.suffix)))
    }

    async fn write_output(&self, path: &Path, lyrics: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, lyrics).await?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}
