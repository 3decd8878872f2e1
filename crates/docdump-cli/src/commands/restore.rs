use anyhow::{bail, Context, Result};
use docdump_core::{Mode, MongoDatabase, RestoreConfig, RestoreEngine};
use std::sync::Arc;
use tracing::{info, Dispatch};

pub async fn run(config_path: &str, logger: Option<Dispatch>) -> Result<()> {
    let config = super::load_config(config_path).await?;
    if config.mode != Mode::Restore {
        bail!("Configuration mode must be 'restore'");
    }
    let options = config
        .restore
        .context("Restore options are required for restore mode")?;

    info!("Connecting to database {}", config.database.name);
    let db = MongoDatabase::connect(&config.database.uri, &config.database.name).await?;

    let mut builder = RestoreConfig::builder()
        .database(Arc::new(db))
        .options(options)
        .on_complete(|| info!("Restore run finished"));
    if let Some(dispatch) = logger {
        builder = builder.logger(dispatch);
    }

    let engine = RestoreEngine::new(builder.build()?);
    let report = engine.run().await;

    if !report.completed {
        bail!("Restore did not complete, see the log for details");
    }
    println!("{}", report);
    Ok(())
}
