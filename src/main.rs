#[macro_use]
extern crate tracing;

mod auth;
mod config;
mod controller;
mod locator;
mod processor;
mod response;
mod routes;
mod storage;
mod utils;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::Server;
use strum::EnumString;
use tracing_subscriber::EnvFilter;

use crate::config::{CommitOrder, RuntimeConfig};
use crate::controller::Optimizer;
use crate::storage::ObjectStoreGateway;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Copy, Clone, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Debug,
    Production,
}

impl Mode {
    fn default_log_filter(self) -> &'static str {
        match self {
            Self::Debug => "squash=debug,poem=info",
            Self::Production => "squash=info,poem=warn",
        }
    }
}

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct ServerConfig {
    /// The host to bind the server to.
    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// The port to bind the server to.
    #[clap(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// The path to the YAML runtime config.
    #[clap(long, env = "CONFIG_FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Either `debug` or `production`, selects the default log verbosity.
    ///
    /// `RUST_LOG` overrides this when set.
    #[clap(long, env = "MODE", default_value = "debug")]
    mode: Mode,

    /// The shared secret required in the `token` header of every call.
    #[clap(long, env = "API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: ServerConfig = ServerConfig::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.mode.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run_server(args).await {
        error!("Error: {}", e);
        return Err(e);
    }

    Ok(())
}

async fn run_server(args: ServerConfig) -> Result<()> {
    let cfg = RuntimeConfig::from_file(&args.config)?;

    let api_token = cfg.resolve_api_token(args.api_token)?;
    let settings = cfg.settings()?;

    if settings.commit_order == CommitOrder::DeleteFirst {
        info!(
            "Originals are deleted before their replacement is uploaded, \
            set `commit_order: upload_first` to reverse this"
        );
    }

    let backend = cfg.backend.connect().await?;
    let gateway = ObjectStoreGateway::new(backend);
    let optimizer = Arc::new(Optimizer::new(gateway, settings));

    info!(
        "Writing optimised images to {}/{}",
        optimizer.settings().public_base_url,
        optimizer.settings().optimized_bucket,
    );

    let app = routes::app(optimizer, api_token);

    let bind = format!("{}:{}", args.host, args.port);
    info!("Squash listening on http://{}", bind);

    Server::new(TcpListener::bind(bind)).run(app).await?;

    Ok(())
}
