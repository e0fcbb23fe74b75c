use anyhow::Context as _;
use clap::Parser;
use readwise_common::Readwise;
use tracing::{debug, info};

mod anytype;
mod config;
mod sync;
mod templates;

use crate::anytype::Anytype;
use crate::config::Cli;
use crate::sync::{Syncer, WriteOutcome};
use crate::templates::TemplateRenderer;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    match dotenv {
        Ok(path) => debug!("Loaded environment from {:?}", path),
        Err(_) => info!("No .env file found"),
    }

    let config = Cli::parse()
        .into_config()
        .context("configuration error")?;

    let readwise = Readwise::new(
        &config.readwise_token,
        config.readwise_endpoint.clone(),
        config.timeout,
    )?;
    let anytype = Anytype::new(
        &config.anytype_api_key,
        config.anytype_base_url.clone(),
        &config.anytype_version,
        config.timeout,
    )?;
    let renderer = TemplateRenderer::new(&config.template);

    let syncer = Syncer::new(readwise, anytype, renderer, config.sync_settings());
    let report = syncer.run().await.context("sync failed")?;

    for synced in &report.books {
        debug!(
            "Book {} -> object {} ({:?})",
            synced.book_id, synced.object.id, synced.outcome
        );
    }

    info!(
        "Sync completed successfully: {} created, {} updated in space {}",
        report.count(WriteOutcome::Created),
        report.count(WriteOutcome::Updated),
        report.space_id
    );

    Ok(())
}
