use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::warn;

use diskvault_core::ConfigStore;

#[derive(Args)]
pub struct DefaultArgs {
    /// New default disk name; omit to print the current default
    name: Option<String>,
}

pub async fn run(args: DefaultArgs, config_path: &Path) -> Result<()> {
    let store = ConfigStore::load(config_path)?;

    match args.name {
        Some(name) => {
            if !store.disk_names().contains(&name) {
                warn!(disk = %name, "setting default to a disk with no configuration");
            }
            store.set_default_disk(&name);
            store.save(config_path)?;
            println!("Default backup disk set to `{name}`.");
        }
        None => match store.default_disk() {
            Some(name) => println!("{name}"),
            None => println!("No default backup disk configured."),
        },
    }
    Ok(())
}
