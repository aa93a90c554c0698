//! lrcsync - word-level lyric timing
//!
//! Entry point for the command line tool: aligns reference lyrics against
//! speech recognition output and writes enhanced LRC files.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lrcsync::cli::{Args, Commands};
use lrcsync::config::Config;
use lrcsync::workflow::{TranscribeOutcome, Workflow};

const DEFAULT_CONFIG_FILE: &str = "lrcsync.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Align { lyrics, transcript, output, tuning } => {
            tuning.apply(&mut config);
            let workflow = Workflow::new(config);
            let written = workflow.align_files(&lyrics, &transcript, output).await?;
            println!("{}", written.display());
        }
        Commands::Raw { transcript, output, tuning } => {
            tuning.apply(&mut config);
            let workflow = Workflow::new(config);
            let written = workflow.raw_transcript(&transcript, output).await?;
            println!("{}", written.display());
        }
        Commands::Batch { input_dir, output_dir, tuning } => {
            tuning.apply(&mut config);
            if let Some(dir) = output_dir {
                config.output.output_dir = Some(dir.display().to_string());
            }
            let workflow = Workflow::new(config);
            let written = workflow.process_directory(&input_dir).await?;
            info!("Aligned {} files", written.len());
            for path in written {
                println!("{}", path.display());
            }
        }
        Commands::Transcribe { input, lyrics, output, language, model, prompt, tuning } => {
            tuning.apply(&mut config);
            if let Some(language) = language {
                config.recognizer.language = language;
            }
            if let Some(model) = model {
                config.recognizer.model = model;
            }
            if prompt.is_some() {
                config.recognizer.prompt = prompt;
            }
            let workflow = Workflow::new(config);
            match workflow.transcribe_audio(&input, lyrics, output).await? {
                TranscribeOutcome::Written(written) => println!("{}", written.display()),
                TranscribeOutcome::Stopped => eprintln!("Stopped before completion; no file was written"),
            }
        }
        Commands::Inspect { lyrics } => {
            let workflow = Workflow::new(config);
            println!("{}", workflow.inspect(&lyrics).await?);
        }
        Commands::InitConfig { output } => {
            config.save_to_file(&output)?;
            info!("Configuration written to {}", output.display());
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".lrcsync").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "lrcsync.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // The writer must outlive main
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr; stdout carries command results
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("lrcsync.log").display());

    Ok(())
}
