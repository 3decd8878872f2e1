use anyhow::Result;
use docdump_core::list_archives;
use std::path::Path;
use tracing::info;

pub async fn run(path: &str) -> Result<()> {
    info!("Listing archives in: {}", path);
    let archives = list_archives(Path::new(path)).await?;

    if archives.is_empty() {
        println!("No archives found in {}", path);
        return Ok(());
    }

    println!("Available archives:");
    for archive in archives {
        println!(
            "  - {:<40} {} ({} bytes)",
            archive.name.file_name(),
            archive.name,
            archive.size
        );
    }
    Ok(())
}
