use std::path::Path;

use anyhow::Result;

use diskvault_core::ConfigStore;

pub async fn run(config_path: &Path) -> Result<()> {
    let store = ConfigStore::load(config_path)?;

    let names = store.disk_names();
    if names.is_empty() {
        println!("No backup disks configured.");
        return Ok(());
    }

    let default = store.default_disk();
    println!("Configured backup disks:");
    for name in names {
        let config = store.disk_config(&name);
        let kind = config.kind().unwrap_or("<no kind>");
        let marker = if default.as_deref() == Some(name.as_str()) {
            "  (default)"
        } else {
            ""
        };
        println!("  {name:<24} {kind}{marker}");
    }
    Ok(())
}
