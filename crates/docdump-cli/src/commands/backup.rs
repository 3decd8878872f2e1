use anyhow::{bail, Result};
use docdump_core::{BackupConfig, BackupEngine, Mode, MongoDatabase};
use std::sync::Arc;
use tracing::{info, Dispatch};

pub async fn run(config_path: &str, logger: Option<Dispatch>) -> Result<()> {
    let config = super::load_config(config_path).await?;
    if config.mode != Mode::Backup {
        bail!("Configuration mode must be 'backup'");
    }
    let options = config.backup.unwrap_or_default();

    info!("Connecting to database {}", config.database.name);
    let db = MongoDatabase::connect(&config.database.uri, &config.database.name).await?;

    let mut builder = BackupConfig::builder()
        .database(Arc::new(db))
        .options(options)
        .on_complete(|| info!("Backup run finished"));
    if let Some(dispatch) = logger {
        builder = builder.logger(dispatch);
    }

    let engine = BackupEngine::new(builder.build()?);
    let report = engine.run().await;

    if !report.completed {
        bail!("Backup did not complete, see the log for details");
    }
    if report.collections_failed > 0 {
        println!(
            "Backup finished with {} failed collections",
            report.collections_failed
        );
    }
    println!("{}", report);
    Ok(())
}
