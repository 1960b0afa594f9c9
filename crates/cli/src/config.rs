use std::path::PathBuf;

const CONFIG_FILE: &str = "diskvault.toml";

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("diskvault")
        .join(CONFIG_FILE)
}
