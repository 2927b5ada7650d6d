mod bus;
mod cli;
mod config;
mod error;
mod logging;
mod render;
mod resolver;
mod server;
mod session;
mod watcher;

use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use bus::EventBus;
use cli::{Cli, Commands};
use config::{Overrides, RemarkConfig, Settings};
use render::MarkdownRenderer;
use resolver::PatternSet;
use server::AppState;
use watcher::subscriber::NotifySubscriber;
use watcher::{WatchList, WatchSet};

/// Buffer between the resolver/notify bridge and the watch set owner.
const COMMAND_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = resolver::normalize(
        &std::env::current_dir().context("failed to determine working directory")?,
    );

    match cli.command {
        Commands::Serve {
            port,
            host,
            watch,
            interval_ms,
            verbose,
        } => {
            logging::init(verbose);
            let settings = Settings::resolve(
                RemarkConfig::load(&root),
                Overrides {
                    watch,
                    host,
                    port,
                    interval_ms,
                },
            );
            serve(&root, settings).await
        }
        Commands::List { watch, json } => {
            logging::init(false);
            let settings = Settings::resolve(
                RemarkConfig::load(&root),
                Overrides {
                    watch,
                    ..Overrides::default()
                },
            );
            list(&root, &settings, json)
        }
    }
}

async fn serve(root: &Path, settings: Settings) -> Result<()> {
    let patterns = Arc::new(PatternSet::new(&settings.patterns, root)?);

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", settings.host, settings.port))?;
    let base_url = format!("http://{}", listener.local_addr()?);

    let bus = EventBus::new();
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);

    let subscriber = NotifySubscriber::start(commands_tx.clone())?;
    let (watch_set, watch_list) =
        WatchSet::new(subscriber, root.to_path_buf(), base_url.clone(), bus.clone());
    tokio::spawn(watch_set.run(commands_rx));

    let resolution = resolver::spawn_resolver(Arc::clone(&patterns), settings.interval, commands_tx);

    let state = Arc::new(AppState {
        root: root.to_path_buf(),
        watch_list,
        bus,
        gateway: Arc::new(MarkdownRenderer::new()),
    });
    let app = server::build_router(state);

    info!(
        root = %patterns.root().display(),
        patterns = ?patterns.patterns(),
        "remark running at {base_url}"
    );

    tokio::select! {
        outcome = resolution => {
            match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err).context("pattern resolution failed"),
                Err(err) => {
                    error!("resolver task failed: {err}");
                    Err(err.into())
                }
            }
        }
        served = axum::serve(listener, app).into_future() => {
            served.context("server error")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}

fn list(root: &Path, settings: &Settings, json: bool) -> Result<()> {
    let patterns = PatternSet::new(&settings.patterns, root)?;
    let list = WatchList::new(root.to_path_buf(), patterns.resolve()?);
    tracing::debug!("{} file(s) matched", list.len());

    let names = list.display_order();
    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}
