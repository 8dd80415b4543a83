use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use embedding_service_core::{Embedder, ModelHandle, ServiceConfig, TextEncoder};
use tracing_subscriber::EnvFilter;

mod check;
mod http;

#[derive(Parser)]
#[command(name = "embedding-service", about = "Sentence embedding HTTP service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load the model and serve the HTTP API (default)
    Serve(ServeArgs),
    /// Exercise every endpoint of a running service
    Check {
        /// Base URL of the service
        #[arg(long, default_value = "http://localhost:8000")]
        url: String,
    },
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Config file; otherwise embedding-service.toml is searched upward from the cwd
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Interface to bind
    #[arg(long)]
    host: Option<String>,
    /// Port to bind (overrides PORT)
    #[arg(long, short)]
    port: Option<u16>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &ServeArgs) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => {
            let (config, found) = ServiceConfig::discover(&std::env::current_dir()?)?;
            if let Some(path) = found {
                tracing::info!("using config {}", path.display());
            }
            config
        }
    };
    config.apply_env()?;
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = load_config(&args)?;

    let model = ModelHandle::uninitialized();
    let model_config = config.model.clone();
    tracing::info!("loading embedding model...");
    tokio::task::spawn_blocking({
        let model = model.clone();
        move || {
            model.initialize(|| {
                let embedder = Embedder::new(
                    &model_config.cache_dir,
                    model_config.show_download_progress,
                )?;
                let encoder: Arc<dyn TextEncoder> = Arc::new(embedder);
                Ok(encoder)
            })
        }
    })
    .await??;

    http::serve(model, &config.bind_addr()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(args).await,
        Command::Check { url } => check::run(&url).await,
    }
}
