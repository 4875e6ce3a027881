use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use pizzeria_rag::commands::{render_documents, render_status};
use pizzeria_rag::core::config::AppPaths;
use pizzeria_rag::core::logging;
use pizzeria_rag::server;
use pizzeria_rag::state::{AppState, StartupOptions};

#[derive(Parser)]
#[command(name = "pizzeria-rag")]
#[command(about = "Answer questions about pizzeria menus, with allergen warnings")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to ./config.yml)
    #[arg(long, env = "PIZZERIA_CONFIG_PATH", global = true)]
    config: Option<PathBuf>,

    /// Project root holding docs/ and data/
    #[arg(long, env = "PIZZERIA_ROOT", global = true)]
    root: Option<PathBuf>,

    /// Debug logging when RUST_LOG is not set
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Overrides server.port
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Process inbound PDFs into the vector store
    Process {
        /// A single PDF, relative to the documents directory
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Answer one question
    Ask { question: Vec<String> },
    /// Model and index status
    Status,
    /// Inbound documents and their processing state
    Documents,
}

impl Command {
    fn requires_model(&self) -> bool {
        matches!(
            self,
            Command::Serve { .. } | Command::Process { .. } | Command::Ask { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = match cli.root.clone() {
        Some(root) => AppPaths::with_root(root),
        None => AppPaths::new(),
    };
    logging::init(&paths, cli.verbose);

    let options = StartupOptions {
        config_path: cli.config.clone(),
        require_model: cli.command.requires_model(),
    };
    let state = AppState::initialize(paths, options)
        .await
        .context("Startup failed")?;

    let outcome = run(cli.command, state.clone()).await;
    state.shutdown().await;
    outcome
}

async fn run(command: Command, state: Arc<AppState>) -> anyhow::Result<()> {
    match command {
        Command::Serve { port } => serve(state, port).await,
        Command::Process { file } => {
            match file {
                Some(file) => {
                    let report = state.pipeline.process_document(&file).await?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                None => {
                    let report = state.pipeline.process_all().await?;
                    println!("{}", report.summary());
                }
            }
            Ok(())
        }
        Command::Ask { question } => {
            let question = question.join(" ");
            if question.trim().is_empty() {
                anyhow::bail!("question must not be empty");
            }
            let result = state.pipeline.answer(&question).await;
            println!("{}", result.answer);
            if !result.sources.is_empty() {
                println!("\nSources:");
                for source in &result.sources {
                    println!("[{}] {}", source.index, source.label());
                }
            }
            Ok(())
        }
        Command::Status => {
            let status = state.pipeline.status().await?;
            println!("{}", render_status(&status));
            Ok(())
        }
        Command::Documents => {
            let documents = state.pipeline.documents().await?;
            println!("{}", render_documents(&documents));
            Ok(())
        }
    }
}

async fn serve(state: Arc<AppState>, port: Option<u16>) -> anyhow::Result<()> {
    let host = state.config.server.host.clone();
    let port = port.unwrap_or(state.config.server.port);
    let bind_addr = format!("{}:{}", host, port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        return;
    }
    tracing::info!("Shutdown requested");
}
