use std::path::PathBuf;

use anyhow::{Context, Result};
use briefing::models::{BriefConfig, LogFormat, LoggingConfig, Query, Symbol};
use briefing::server::{router, AppState};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "market-brief",
    about = "Multi-agent market brief orchestrator - turns a market question into a structured brief"
)]
struct Cli {
    /// Path to configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Overrides `server.bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Build one brief and print it as JSON
    Brief {
        #[arg(short, long)]
        query: String,

        /// Explicit symbols, comma separated
        #[arg(short, long, value_delimiter = ',')]
        symbols: Vec<String>,

        #[arg(long)]
        pretty: bool,
    },
    /// Show the news digest for one symbol
    News {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        pretty: bool,
    },
}

fn init_logging(config: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => briefing::load_config(path)?,
        None => BriefConfig::default(),
    };
    init_logging(&config.logging);

    let orchestrator =
        briefing::build_orchestrator(&config).context("Failed to build orchestrator")?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let voice = briefing::build_voice(&config)?;
            let state = AppState::new(
                orchestrator,
                voice,
                config.providers.voice.default_query.clone(),
            );

            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("Failed to bind {bind}"))?;
            info!(%bind, "Listening");

            axum::serve(listener, router(state))
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received shutdown signal");
                })
                .await
                .context("Server error")?;
        }
        Command::Brief {
            query,
            symbols,
            pretty,
        } => {
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("Received shutdown signal");
                trigger.cancel();
            });

            let query = Query::new(query).with_symbols(symbols);
            let brief = orchestrator
                .handle_with_cancellation(&query, cancel)
                .await
                .map_err(|e| anyhow::anyhow!("Brief failed: {e}"))?;
            print_json(&brief, pretty)?;
        }
        Command::News { symbol, pretty } => {
            let symbol = Symbol::parse(&symbol)
                .with_context(|| format!("Invalid symbol: {symbol:?}"))?;
            let digest = orchestrator.debug_news(&symbol).await;
            print_json(&digest, pretty)?;
        }
    }

    Ok(())
}
