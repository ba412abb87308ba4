//! confmirror daemon
//!
//! Usage:
//!   confmirror --path <DIR> [--app <NAME>] [--servers <HOSTS>] [--config <FILE>]
//!
//! Runs until Ctrl-C.

mod args;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use thiserror::Error;

use confmirror::{
    ensure_node, load_config, logging, validate_config, ConfigError, CoordinationStore,
    CoordinatorOptions, MirrorConfig, MirrorCoordinator, StoreError, TemplateError, TemplateIndex,
    TemplateNaming, TemplateRewriter,
};

use args::Cli;

const ROOT_DATA: &[u8] = b"this is root";

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[cfg_attr(feature = "zookeeper", allow(dead_code))]
    #[error("confmirror was built without the `zookeeper` feature")]
    NoBackend,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match configure(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.logging);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn configure(cli: &Cli) -> Result<MirrorConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => MirrorConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config)?;
    Ok(config)
}

#[cfg(feature = "zookeeper")]
async fn run(config: MirrorConfig) -> Result<(), CliError> {
    let store =
        confmirror::store::ZooKeeperStore::connect(&config.servers, config.session_timeout())
            .await?;
    info!("Connected to {}", config.servers);
    mirror(Arc::new(store), &config).await
}

#[cfg(not(feature = "zookeeper"))]
async fn run(_config: MirrorConfig) -> Result<(), CliError> {
    Err(CliError::NoBackend)
}

#[cfg_attr(not(feature = "zookeeper"), allow(dead_code))]
async fn mirror<S: CoordinationStore>(store: Arc<S>, config: &MirrorConfig) -> Result<(), CliError> {
    let app_node = config.app_node();
    ensure_node(store.as_ref(), &config.root_node, ROOT_DATA).await?;
    ensure_node(store.as_ref(), &app_node, ROOT_DATA).await?;

    let dir = config
        .template_dir
        .as_deref()
        .ok_or_else(|| ConfigError::Validation {
            message: "template directory is required".to_string(),
        })?;
    let index = TemplateIndex::scan(dir, &TemplateNaming::from(&config.templates))?;
    info!("Found {} templates under {}", index.len(), dir.display());

    let rewriter = Arc::new(TemplateRewriter::with_policy(
        index,
        config.templates.ambiguity,
    ));
    let coordinator =
        MirrorCoordinator::new(store, rewriter, app_node, CoordinatorOptions::from(config));

    let handle = coordinator.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                handle.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    coordinator.run().await;
    Ok(())
}
