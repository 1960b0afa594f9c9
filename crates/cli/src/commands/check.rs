use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use uuid::Uuid;

use diskvault_core::{Backend as _, ConfigStore, DiskManager};

#[derive(Args)]
pub struct CheckArgs {
    /// Disk name (defaults to the configured default disk)
    name: Option<String>,

    /// Write, read back and delete a marker object
    #[arg(long)]
    probe: bool,
}

pub async fn run(args: CheckArgs, config_path: &Path) -> Result<()> {
    let store = Arc::new(ConfigStore::load(config_path)?);
    let manager = DiskManager::new(store.clone());

    let name = match args.name {
        Some(name) => name,
        None => store
            .default_disk()
            .context("no default backup disk configured")?,
    };
    let config = store.disk_config(&name);
    let kind = config.kind().unwrap_or("<no kind>").to_string();

    let disk = manager.get(&name).await?;
    println!("Disk `{name}` (kind `{kind}`) resolved.");

    if args.probe {
        let key = format!(".diskvault/probe-{}", Uuid::new_v4());
        let payload = chrono::Utc::now().to_rfc3339();

        disk.write(&key, payload.as_bytes())
            .await
            .context("probe write failed")?;
        let read_back = disk.read(&key).await.context("probe read failed")?;
        if read_back != payload.as_bytes() {
            anyhow::bail!("probe read returned different bytes than written");
        }
        disk.delete(&key).await.context("probe delete failed")?;
        if disk.exists(&key).await? {
            anyhow::bail!("probe object still present after delete");
        }

        println!("Probe OK: wrote, read and deleted `{key}`.");
    }
    Ok(())
}
