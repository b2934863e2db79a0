mod agent;
mod config;
mod instrumentation;
mod llm;
mod render;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use agent::Agent;
use config::Config;
use server::AppState;

#[derive(Parser)]
#[command(name = "factweave", about = "Web research agent that answers questions with cited sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose per-phase output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server (chat UI + JSON API)
    Serve,
    /// Answer a single question on the command line
    Ask {
        /// The question to research
        question: String,
    },
}

/// `--verbose` raises the default filter to debug (per-source fetch results,
/// discovery details); `RUST_LOG` still wins when set.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.verbose).into()),
        )
        .init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve => {
            let addr = format!("{}:{}", config.host, config.port);
            let agent = Agent::new(config)?;
            let app = server::router(AppState {
                agent: Arc::new(agent),
            });

            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .context(format!("Failed to bind {addr}"))?;
            tracing::info!("listening on http://{addr}");
            axum::serve(listener, app)
                .await
                .context("Server exited with error")?;
        }
        Commands::Ask { question } => {
            let agent = Agent::new(config)?;
            let result = agent.ask(&question).await?;

            println!("\n{}\n", result.answer.text);
            for citation in &result.answer.citations {
                println!("{citation}");
            }
            println!(
                "\n{} sources in {:.1}s",
                result.source_count, result.processing_time
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_default_filter() {
        assert_eq!(default_filter(false), "info");
        assert_eq!(default_filter(true), "debug");
    }

    #[test]
    fn verbose_flag_is_global() {
        let cli = Cli::parse_from(["factweave", "ask", "--verbose", "why?"]);
        assert!(cli.verbose);
        let cli = Cli::parse_from(["factweave", "serve"]);
        assert!(!cli.verbose);
    }
}

