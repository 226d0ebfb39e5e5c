use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use reqwest::Url;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use edt_core::{FileStore, PersistenceGateway, Planner};
use edt_vision::{Extractor, VisionClient};

use crate::api::AppState;

mod api;
mod error;

#[derive(Parser)]
#[command(author, version, about, long_about)]
struct Args {
  #[arg(long, short, env = "EDT_LISTEN", default_value = "127.0.0.1:8080")]
  listen: SocketAddr,
  #[arg(long, short, env = "EDT_DATA_DIR", default_value = "./data")]
  data_dir: PathBuf,
  /// Chat completion url of an OpenAI compatible api. Images can only be read when set.
  #[arg(long, env = "EDT_VISION_ENDPOINT")]
  vision_endpoint: Option<Url>,
  #[arg(long, env = "EDT_VISION_KEY", hide_env_values = true)]
  vision_key: Option<String>,
  #[arg(long, env = "EDT_VISION_MODEL", default_value = "gpt-4o-mini")]
  vision_model: String,
  #[arg(long, env = "EDT_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
  max_upload_bytes: usize,
  #[arg(long, env = "EDT_SENTRY_DSN")]
  sentry_dsn: Option<String>,
}

fn main() -> anyhow::Result<()> {
  let args = Args::parse();

  let _guard = match &args.sentry_dsn {
    Some(dsn) => Some(sentry::init(sentry::ClientOptions {
      dsn: Some(dsn.parse()?),
      release: sentry::release_name!(),
      ..Default::default()
    })),
    None => None,
  };

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with(tracing_subscriber::fmt::layer())
    .with(sentry_tracing::layer())
    .init();

  tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()?
    .block_on(serve(args))
}

async fn serve(args: Args) -> anyhow::Result<()> {
  let gateway = PersistenceGateway::new(FileStore::new(&args.data_dir)?);
  info!("Storing timetables in {}", args.data_dir.display());

  let vision = match args.vision_endpoint {
    Some(endpoint) => {
      info!("Using vision api at {} with model {}", endpoint, args.vision_model);
      Some(VisionClient::new(endpoint, args.vision_key, args.vision_model))
    }
    None => {
      info!("No vision api configured, only pdf text can be read");
      None
    }
  };

  let app = api::router(AppState {
    planner: Arc::new(Planner::new(gateway)),
    extractor: Arc::new(Extractor::new(vision)),
    max_upload_bytes: args.max_upload_bytes,
  });

  let listener = TcpListener::bind(args.listen).await?;
  info!("Listening on {}", args.listen);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("Shut down");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(err) = tokio::signal::ctrl_c().await {
    tracing::error!("Unable to listen for shutdown signal: {}", err);
    std::future::pending::<()>().await;
  }
}
