//! wireshift binary
//!
//! The shim itself is a library embedded into a transport host; this binary
//! validates a deployment: it loads the configuration, the schema catalogs
//! and the dispatch tables, assembles the pipeline, and reports what it
//! found.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wireshift::config::Config;
use wireshift::state::AppState;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    info!(version = wireshift::VERSION, "wireshift starting");

    let path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = Config::load(path.as_deref()).await?;
    let state = AppState::load(config).await?;

    info!(
        new_revision = state.new_catalog.revision(),
        old_revision = state.old_catalog.revision(),
        messages_new = state.new_catalog.len(),
        messages_old = state.old_catalog.len(),
        registered = state.pipeline.registry().len(),
        console = state.pipeline.console_enabled(),
        "Deployment data valid"
    );
    Ok(())
}
