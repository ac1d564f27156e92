use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{error, info};
use std::io;
use std::path::PathBuf;
use std::process;

use repo_chat::chat::run_chat_loop;
use repo_chat::config::Config;
use repo_chat::pipeline::{run_pipeline, OllamaBackend};
use repo_chat::repository::clone_repository;
use repo_chat::session::SessionState;

/// Ask questions about a source repository using a local Ollama model
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Repository to index (`owner/name` on GitHub, or a clone URL)
    #[arg(index = 1, default_value = "krmeljalen/kdeploy")]
    repo: String,

    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Working directory; the repository is checked out into `<work-dir>/data`
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Index an already populated `<work-dir>/data` instead of cloning
    #[arg(long)]
    skip_clone: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let work_dir = match args.work_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve the working directory")?,
    };
    let data_dir = work_dir.join("data");

    if args.skip_clone {
        info!("Using existing checkout at {}", data_dir.display());
    } else if let Err(e) = clone_repository(&args.repo, &data_dir) {
        error!("{}", e);
        process::exit(1);
    }

    let backend = match OllamaBackend::new(&config) {
        Ok(backend) => backend,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let mut session = SessionState::new();
    match run_pipeline(&config, &mut session, &backend, &data_dir).await {
        Ok(report) => info!(
            "Indexed {} chunks from {} documents",
            report.chunks, report.documents
        ),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }

    let Some(engine) = session.query_engine() else {
        error!("Query engine not set.");
        process::exit(1);
    };

    info!("AI is ready! Proceed with asking questions. Type 'EOF' to end conversation.");

    let stdin = io::stdin();
    let summary = run_chat_loop(engine, stdin.lock(), io::stdout())
        .await
        .context("Error in chat loop")?;

    info!(
        "Answered {} questions ({} failed)",
        summary.turns - summary.failed_turns,
        summary.failed_turns
    );

    Ok(())
}
