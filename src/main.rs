//! Cantopop CLI - character-level lyrics server
//!
//! # Commands
//!
//! - `serve` - Start the HTTP server
//! - `generate` - Generate lyrics once and print them
//! - `info` - Show version and model dimensions

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cantopop::{
    api::{create_router, AppState},
    config::{
        load_generator, ServeConfig, DEFAULT_CORPUS_PATH, DEFAULT_HOST, DEFAULT_PORT,
        DEFAULT_WEIGHTS_PATH,
    },
    error::{CantopopError, Result},
};

/// Default log filter when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "cantopop=info,tower_http=info";

/// Cantopop - character-level RNN lyrics generator
#[derive(Parser)]
#[command(name = "cantopop")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the lyrics server
    ///
    /// Examples:
    ///   cantopop serve --corpus reduced_text.txt --weights model.safetensors
    ///   cantopop serve --demo --port 8080
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, env = "CANTOPOP_HOST", default_value = DEFAULT_HOST)]
        host: String,

        /// Port to bind to
        #[arg(short, long, env = "CANTOPOP_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Generate lyrics for one seed and print them
    ///
    /// Examples:
    ///   cantopop generate "月光光" -n 100
    Generate {
        /// Seed sentence (only the first 12 characters are used)
        #[arg(value_name = "SEED")]
        seed: String,

        /// Characters to generate, clamped to 12..=720
        #[arg(short = 'n', long, default_value_t = 100, allow_negative_numbers = true)]
        length: i64,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Show version and model dimensions
    Info {
        #[command(flatten)]
        model: ModelArgs,
    },
}

/// Where to load the vocabulary and weights from
#[derive(Args)]
struct ModelArgs {
    /// UTF-8 corpus the vocabulary is built from
    #[arg(long, env = "CANTOPOP_CORPUS", default_value = DEFAULT_CORPUS_PATH)]
    corpus: PathBuf,

    /// Safetensors weights file
    #[arg(long, env = "CANTOPOP_WEIGHTS", default_value = DEFAULT_WEIGHTS_PATH)]
    weights: PathBuf,

    /// Sampling temperature
    #[arg(short, long, env = "CANTOPOP_TEMPERATURE", default_value_t = 1.0)]
    temperature: f32,

    /// Use randomly initialised weights (for testing)
    #[arg(long)]
    demo: bool,
}

impl ModelArgs {
    fn into_config(self, host: String, port: u16) -> ServeConfig {
        ServeConfig {
            host,
            port,
            corpus_path: self.corpus,
            weights_path: self.weights,
            temperature: self.temperature,
            demo: self.demo,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, configuration = e.is_configuration(), "cantopop failed");
            ExitCode::from(e.exit_code())
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { host, port, model } => {
            serve(model.into_config(host, port)).await?;
        },
        Commands::Generate {
            seed,
            length,
            model,
        } => {
            let config = model.into_config(DEFAULT_HOST.to_string(), DEFAULT_PORT);
            let generator = load_generator(&config)?;
            let outcome = tokio::task::spawn_blocking(move || generator.generate(&seed, length))
                .await
                .map_err(|e| CantopopError::Generation {
                    reason: e.to_string(),
                })??;
            println!("{}", outcome.into_body());
        },
        Commands::Info { model } => {
            println!("Cantopop v{}", cantopop::VERSION);
            let config = model.into_config(DEFAULT_HOST.to_string(), DEFAULT_PORT);
            let generator = load_generator(&config)?;
            let dims = generator.sampler().model().config();
            println!();
            println!("Vocabulary: {} entries", generator.sampler().vocab().size());
            println!("Embedding:  {}", dims.embed_dim);
            println!("GRU units:  {}", dims.units);
            println!("Temperature: {}", generator.sampler().temperature());
        },
    }

    Ok(())
}

async fn serve(config: ServeConfig) -> Result<()> {
    let addr = config.socket_addr()?;
    let generator = load_generator(&config)?;
    let app = create_router(AppState::new(Arc::new(generator)));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CantopopError::Server {
            reason: format!("failed to bind {addr}: {e}"),
        })?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CantopopError::Server {
            reason: e.to_string(),
        })?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
