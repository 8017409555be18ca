//! Shared application state
//!
//! Everything sessions share read-only: the two schema catalogs, the
//! assembled pipeline, and the configuration they were built from. A
//! transport host builds one `AppState` at startup and hands the pipeline a
//! `&mut Session` per packet.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::inject::{CommandExecutor, EchoExecutor, Injections};
use crate::proto::SchemaCatalog;
use crate::shift::{DispatchTables, MessageRegistry, Pipeline, Transcoder};

pub struct AppState {
    pub config: Config,
    pub new_catalog: Arc<SchemaCatalog>,
    pub old_catalog: Arc<SchemaCatalog>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Load schema data from the configured paths and assemble the pipeline
    /// with the default echo command backend
    pub async fn load(config: Config) -> Result<Self> {
        Self::load_with_executor(config, Arc::new(EchoExecutor)).await
    }

    /// Load with a host-supplied command backend
    pub async fn load_with_executor(
        config: Config,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        let new_catalog = Arc::new(SchemaCatalog::load(&config.schema.new_catalog).await?);
        let old_catalog = Arc::new(SchemaCatalog::load(&config.schema.old_catalog).await?);
        let tables = DispatchTables::load(&config.schema.dispatch_tables).await?;
        Self::assemble(config, new_catalog, old_catalog, tables, executor)
    }

    /// Assemble from already-loaded parts. Embedders that carry their own
    /// schema data come in here directly.
    pub fn assemble(
        config: Config,
        new_catalog: Arc<SchemaCatalog>,
        old_catalog: Arc<SchemaCatalog>,
        tables: DispatchTables,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        let keys = config.build_key_ring()?;
        tables
            .validate(&new_catalog)
            .context("Dispatch tables do not match the new catalog")?;
        tables
            .validate(&old_catalog)
            .context("Dispatch tables do not match the old catalog")?;
        let registry = MessageRegistry::build(&new_catalog, &old_catalog);
        let console = config.console.enabled.then(|| {
            Injections::new(config.console.profile.clone(), executor, new_catalog.clone())
        });
        let transcoder = Transcoder::new(new_catalog.clone(), old_catalog.clone());
        let pipeline = Pipeline::new(registry, transcoder, tables, keys, console);

        info!(
            new_revision = new_catalog.revision(),
            old_revision = old_catalog.revision(),
            registered = pipeline.registry().len(),
            invoke_tables = pipeline.tables().invokes.len(),
            console = pipeline.console_enabled(),
            "Shim state assembled"
        );

        Ok(Self {
            config,
            new_catalog,
            old_catalog,
            pipeline: Arc::new(pipeline),
        })
    }
}
