//! gitreg - serve git refs as an npm-compatible package registry

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::{miette, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use gitreg_core::config::RefFilter;
use gitreg_server::config::{parse_remote_arg, ServerConfig};
use gitreg_server::http::build_router;
use gitreg_server::service::RegistryService;

#[derive(Parser)]
#[command(name = "gitreg")]
#[command(version)]
#[command(about = "Serve git refs as an npm-compatible package registry", long_about = None)]
struct Cli {
    /// Listen address (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Remote to mount, as NAME=URL (repeatable)
    #[arg(short = 'r', long = "remote", value_name = "NAME=URL")]
    remotes: Vec<String>,

    /// Ref filter regex for remotes without their own
    #[arg(long, value_name = "REGEX")]
    ref_filter: Option<String>,

    /// Manifest search glob applied to every remote
    #[arg(long, value_name = "GLOB")]
    manifest_glob: Option<String>,

    /// Server configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load_from(path).into_diagnostic()?,
        None => ServerConfig::default(),
    };
    for arg in &cli.remotes {
        config.remotes.push(parse_remote_arg(arg).into_diagnostic()?);
    }
    for remote in &mut config.remotes {
        if remote.ref_filter.is_none() {
            remote.ref_filter = cli.ref_filter.clone();
        }
        if let Some(glob) = &cli.manifest_glob {
            remote.manifest_glob = glob.clone();
        }
    }
    if config.remotes.is_empty() {
        return Err(miette!(
            "no remotes configured; pass --remote NAME=URL or a config file"
        ));
    }
    // surface bad static filter patterns at startup, not per request
    for remote in &config.remotes {
        if let Some(pattern) = &remote.ref_filter {
            RefFilter::new(pattern).into_diagnostic()?;
        }
    }
    if let Some(listen) = &cli.listen {
        config.listen = Some(listen.clone());
    }

    let service = Arc::new(RegistryService::from_configs(config.remotes.clone()));
    let router = build_router(service).into_diagnostic()?;

    let listener = tokio::net::TcpListener::bind(config.listen())
        .await
        .into_diagnostic()?;
    tracing::info!(
        listen = config.listen(),
        remotes = config.remotes.len(),
        "gitreg listening"
    );
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}
