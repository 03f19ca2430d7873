use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use vuko_config::Settings;
use vuko_worker::{AppState, build_router, telemetry};

#[derive(Parser)]
#[command(name = "vuko-worker")]
#[command(about = "Interview answer pipeline: transcription and feedback workers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both queue consumers and the health endpoint until Ctrl-C
    Run {
        /// Use an in-process store and broker instead of MongoDB and Redis
        #[arg(long)]
        in_memory: bool,
    },
    /// Submit a local media file as the answer to a question
    Submit {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        session: i64,
        #[arg(long)]
        question: i64,
        file: PathBuf,
    },
    /// Print ready and dead-letter counts for both queues
    Stats,
    /// Move every dead letter of a queue back onto it
    RequeueDead { queue: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;
    telemetry::init(settings.app.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        settings = %settings.redacted(),
        "Starting {}",
        settings.app.name
    );

    let state = if matches!(cli.command, Commands::Run { in_memory: true }) {
        AppState::in_memory(settings)?
    } else {
        AppState::connect(settings).await?
    };

    let result = match cli.command {
        Commands::Run { .. } => run(&state).await,
        Commands::Submit {
            user,
            session,
            question,
            file,
        } => submit(&state, user, session, question, file).await,
        Commands::Stats => stats(&state).await,
        Commands::RequeueDead { queue } => requeue_dead(&state, &queue).await,
    };

    state.shutdown().await;
    result
}

async fn run(state: &AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut consumers = JoinSet::new();
    for consumer in [state.transcription_consumer(), state.feedback_consumer()] {
        let queue = consumer.queue().to_string();
        let rx = shutdown_rx.clone();
        consumers.spawn(async move { (queue, consumer.run(rx).await) });
    }

    let addr = &state.settings.app.health_addr;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health endpoint on {addr}"))?;
    info!(addr = %addr, "Health endpoint listening");

    let router = build_router(state.clone());
    let mut server_rx = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested, finishing in-flight jobs");
        }
        Some(finished) = consumers.join_next() => {
            warn!(?finished, "Consumer exited early, shutting down");
        }
    }
    shutdown_tx.send_replace(true);

    while let Some(finished) = consumers.join_next().await {
        match finished {
            Ok((queue, Ok(()))) => info!(queue = %queue, "Consumer finished"),
            Ok((queue, Err(e))) => error!(queue = %queue, error = %e, "Consumer failed"),
            Err(e) => error!(error = %e, "Consumer task panicked"),
        }
    }

    server.await.context("Health server task failed")??;
    Ok(())
}

async fn submit(
    state: &AppState,
    user_id: i64,
    session_id: i64,
    question_id: i64,
    file: PathBuf,
) -> Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "answer.webm".to_string());

    let submission = state
        .intake()
        .submit(user_id, session_id, question_id, &file_name, &bytes)
        .await?;
    println!("answer_id={} media={}", submission.answer_id, submission.media_path);
    Ok(())
}

async fn stats(state: &AppState) -> Result<()> {
    let broker = &state.settings.broker;
    for queue in [&broker.stt_queue, &broker.feedback_queue] {
        let depth = state.broker.depth(queue).await?;
        println!("{queue}: ready={} dead={}", depth.ready, depth.dead);
    }
    Ok(())
}

async fn requeue_dead(state: &AppState, queue: &str) -> Result<()> {
    let moved = state.broker.requeue_dead(queue).await?;
    info!(queue = %queue, moved, "Dead letters requeued");
    println!("{queue}: requeued {moved}");
    Ok(())
}
