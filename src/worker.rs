// Background alignment worker
//
// Owns the recognizer and a model cache, receives tasks over a channel and
// reports progress plus exactly one Finished event per task.

use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::align::{AlignOutcome, Aligner, StopFlag};
use crate::config::{AlignConfig, RecognizerConfig};
use crate::lyric::{LyricDocument, space_cjk};
use crate::recognition::{ModelHandle, RecognitionRequest, Recognizer};

/// Holds at most one loaded model, keyed by its id
#[derive(Debug)]
pub struct ModelCache<M> {
    entry: Option<(String, M)>,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached model, only if it was loaded under `model_id`
    pub fn get(&self, model_id: &str) -> Option<&M> {
        self.entry
            .as_ref()
            .filter(|(id, _)| id == model_id)
            .map(|(_, model)| model)
    }

    pub fn set(&mut self, model_id: &str, model: M) {
        self.entry = Some((model_id.to_string(), model));
    }

    pub fn clear(&mut self) {
        if let Some((id, _)) = self.entry.take() {
            debug!("Released cached model {}", id);
        }
    }

    pub fn current_id(&self) -> Option<&str> {
        self.entry.as_ref().map(|(id, _)| id.as_str())
    }
}

/// One audio file to recognize and align against its reference lyrics
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub audio_path: PathBuf,
    pub document: LyricDocument,
    pub recognizer: RecognizerConfig,
    pub align: AlignConfig,
}

impl Task {
    pub fn new(audio_path: PathBuf, document: LyricDocument, recognizer: RecognizerConfig, align: AlignConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            audio_path,
            document,
            recognizer,
            align,
        }
    }
}

#[derive(Debug)]
pub enum WorkerCommand {
    Run(Box<Task>),
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(String),
    Error(String),
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Progress { task_id: Uuid, message: String, percent: u8 },
    Finished { task_id: Uuid, outcome: TaskOutcome },
}

pub struct Worker<R: Recognizer> {
    recognizer: R,
    cache: ModelCache<ModelHandle>,
    stop: StopFlag,
}

impl<R: Recognizer> Worker<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            cache: ModelCache::new(),
            stop: StopFlag::new(),
        }
    }

    /// Handle for cancelling the running task, or the next one when idle
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Process commands until `Exit` or until every sender is dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<WorkerCommand>, events: mpsc::Sender<WorkerEvent>) {
        info!("Worker started");

        while let Some(command) = commands.recv().await {
            match command {
                WorkerCommand::Run(task) => {
                    let task_id = task.id;
                    let outcome = self.process(*task, &events).await;
                    // A stop request covers the task that was running when it arrived
                    self.stop.reset();
                    match &outcome {
                        TaskOutcome::Success(_) => info!("Task {} completed", task_id),
                        TaskOutcome::Error(message) => error!("Task {} failed: {}", task_id, message),
                        TaskOutcome::Aborted => info!("Task {} aborted", task_id),
                    }
                    send(&events, WorkerEvent::Finished { task_id, outcome }).await;
                }
                WorkerCommand::Exit => break,
            }
        }

        self.cache.clear();
        info!("Worker stopped");
    }

    async fn process(&mut self, task: Task, events: &mpsc::Sender<WorkerEvent>) -> TaskOutcome {
        let progress = |message: &str, percent: u8| WorkerEvent::Progress {
            task_id: task.id,
            message: message.to_string(),
            percent,
        };

        if self.stop.is_stopped() {
            return TaskOutcome::Aborted;
        }

        send(events, progress("Loading model", 10)).await;
        let model = match self.load_model(&task.recognizer.model).await {
            Ok(model) => model,
            Err(e) => return TaskOutcome::Error(e.to_string()),
        };
        if self.stop.is_stopped() {
            return TaskOutcome::Aborted;
        }

        send(events, progress("Recognizing speech", 30)).await;
        let reference_text = (!task.document.is_empty()).then(|| space_cjk(&task.document.reference_text()));
        let request = RecognitionRequest {
            audio_path: task.audio_path.clone(),
            language: task.recognizer.language.clone(),
            prompt: task.recognizer.prompt.clone(),
            reference_text,
        };
        let recognized = self.recognizer.recognize(&model, &request).await;

        if task.recognizer.release_model {
            self.cache.clear();
        }

        let recognition = match recognized {
            Ok(recognition) => recognition,
            Err(e) => return TaskOutcome::Error(e.to_string()),
        };
        if self.stop.is_stopped() {
            return TaskOutcome::Aborted;
        }
        if recognition.segments.is_empty() {
            warn!("Recognizer returned no segments for {}", task.audio_path.display());
        }

        send(events, progress("Aligning lyrics", 80)).await;
        match Aligner::new(task.align).run(&task.document, &recognition, &self.stop) {
            AlignOutcome::Completed(lyrics) => {
                send(events, progress("Done", 100)).await;
                TaskOutcome::Success(lyrics)
            }
            AlignOutcome::Aborted => TaskOutcome::Aborted,
        }
    }

    async fn load_model(&mut self, model_id: &str) -> crate::error::Result<ModelHandle> {
        if let Some(model) = self.cache.get(model_id) {
            debug!("Reusing cached model {}", model_id);
            return Ok(model.clone());
        }

        if let Some(current) = self.cache.current_id() {
            info!("Switching model from {} to {}", current, model_id);
            self.cache.clear();
        }

        let model = self.recognizer.load_model(model_id).await?;
        self.cache.set(model_id, model.clone());
        Ok(model)
    }
}

async fn send(events: &mpsc::Sender<WorkerEvent>, event: WorkerEvent) {
    if events.send(event).await.is_err() {
        debug!("Event receiver dropped");
    }
}
