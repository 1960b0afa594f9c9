use std::path::Path;
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

const DISKS_PATH: &str = "backups.disks";
const DEFAULT_PATH: &str = "backups.default";

/// Nested key-value configuration source.
///
/// Values live in a JSON tree addressed by dotted paths
/// (`backups.disks.s3-main`). The resolver never reads configuration any
/// other way; callers populate the tree directly or load it from a TOML
/// file.
#[derive(Debug, Default)]
pub struct ConfigStore {
    root: RwLock<Value>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    pub fn from_value(root: Value) -> Self {
        Self {
            root: RwLock::new(root),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let root: Value = toml::from_str(content).context("failed to parse config")?;
        Ok(Self::from_value(root))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("config not found at {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let root = self.root.read().unwrap();
        let content = toml::to_string_pretty(&*root)?;
        drop(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Value at the dotted `path`, or `None` if any segment is absent.
    pub fn get(&self, path: &str) -> Option<Value> {
        let root = self.root.read().unwrap();
        let mut current = &*root;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }

    /// Install `value` at the dotted `path`, creating intermediate
    /// objects as needed. A non-object intermediate is replaced.
    pub fn set(&self, path: &str, value: Value) {
        let mut root = self.root.write().unwrap();
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else { return };
        let mut current = &mut *root;
        for segment in segments {
            current = ensure_object(current)
                .entry(segment.to_string())
                .or_insert(Value::Null);
        }
        ensure_object(current).insert(last.to_string(), value);
    }

    /// Per-disk configuration under `backups.disks.<name>`; an absent or
    /// non-object entry resolves to an empty config.
    pub fn disk_config(&self, name: &str) -> DiskConfig {
        match self.get(&format!("{DISKS_PATH}.{name}")) {
            Some(Value::Object(fields)) => DiskConfig { fields },
            _ => DiskConfig::default(),
        }
    }

    /// Names of every configured disk, sorted.
    pub fn disk_names(&self) -> Vec<String> {
        match self.get(DISKS_PATH) {
            Some(Value::Object(disks)) => {
                let mut names: Vec<String> = disks.keys().cloned().collect();
                names.sort();
                names
            }
            _ => Vec::new(),
        }
    }

    pub fn default_disk(&self) -> Option<String> {
        self.get(DEFAULT_PATH)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|name| !name.is_empty())
    }

    pub fn set_default_disk(&self, name: &str) {
        self.set(DEFAULT_PATH, Value::String(name.to_string()));
    }
}

fn ensure_object(slot: &mut Value) -> &mut Map<String, Value> {
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Validated per-disk configuration handed to a constructor. The `kind`
/// field has already been checked by the resolver; everything else is
/// constructor-specific.
#[derive(Debug, Clone, Default)]
pub struct DiskConfig {
    fields: Map<String, Value>,
}

impl DiskConfig {
    /// Non-empty `kind` field, if present.
    pub fn kind(&self) -> Option<&str> {
        self.get_str("kind").filter(|kind| !kind.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key)?.as_str()
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)
            .ok_or_else(|| anyhow::anyhow!("missing required disk config field `{key}`"))
    }
}

impl From<Map<String, Value>> for DiskConfig {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
