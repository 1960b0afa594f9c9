use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::backend::local::LocalBackend;
use crate::backend::memory::MemoryBackend;
use crate::backend::s3::S3Backend;
use crate::config::{ConfigStore, DiskConfig};
use crate::error::ResolveError;

/// Shared, ready-to-use backup disk. The manager owns the cached copy;
/// callers hold clones.
pub type Handle = Arc<dyn Backend>;

type Constructor =
    Arc<dyn Fn(Arc<ConfigStore>, DiskConfig) -> BoxFuture<'static, Result<Handle>> + Send + Sync>;

/// Resolves named backup disks from configuration.
///
/// Disks are constructed lazily on first `get`, cached per name for the
/// process lifetime, and shared as `Arc<dyn Backend>`. Construction
/// strategies live in a single kind → constructor map: the built-ins
/// (`s3`, `local`, `memory`) are inserted at creation and [`extend`]
/// overwrites the entry for its kind, so registrations always take
/// precedence over the built-in of the same name.
///
/// Concurrent `get` calls for the same unresolved name coalesce into one
/// construction; a failed construction leaves nothing cached and the
/// next call retries.
///
/// [`extend`]: DiskManager::extend
pub struct DiskManager {
    store: Arc<ConfigStore>,
    disks: Mutex<HashMap<String, Arc<OnceCell<Handle>>>>,
    kinds: RwLock<HashMap<String, Constructor>>,
}

impl DiskManager {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        let manager = Self {
            store,
            disks: Mutex::new(HashMap::new()),
            kinds: RwLock::new(HashMap::new()),
        };
        manager.extend("s3", |_store, config| async move {
            let handle: Handle = Arc::new(S3Backend::from_config(&config).await?);
            Ok(handle)
        });
        manager.extend("local", |_store, config| async move {
            let handle: Handle = Arc::new(LocalBackend::from_config(&config)?);
            Ok(handle)
        });
        manager.extend("memory", |_store, _config| async move {
            let handle: Handle = Arc::new(MemoryBackend::new());
            Ok(handle)
        });
        manager
    }

    /// The injected configuration source.
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Cached handle for `name`, constructing and caching it on first
    /// use. An empty `name` resolves to the configured default disk.
    pub async fn get(&self, name: &str) -> Result<Handle, ResolveError> {
        let name = if name.is_empty() {
            self.default_name().ok_or_else(ResolveError::no_default)?
        } else {
            name.to_string()
        };

        let cell = {
            let mut disks = self.disks.lock().unwrap();
            disks.entry(name.clone()).or_default().clone()
        };
        cell.get_or_try_init(|| self.resolve(&name)).await.cloned()
    }

    /// Resolve the configured default disk.
    pub async fn get_default(&self) -> Result<Handle, ResolveError> {
        self.get("").await
    }

    /// Install a pre-built handle under `name`, overwriting any cached
    /// entry and bypassing construction.
    pub fn set(&self, name: impl Into<String>, handle: Handle) {
        let name = name.into();
        let mut disks = self.disks.lock().unwrap();
        disks.insert(name, Arc::new(OnceCell::new_with(Some(handle))));
    }

    /// Evict cached handles. Each name is evicted independently;
    /// evicting a name that was never resolved is not an error.
    pub fn forget<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut disks = self.disks.lock().unwrap();
        for name in names {
            if disks.remove(name.as_ref()).is_some() {
                debug!(disk = name.as_ref(), "evicted cached backup disk");
            }
        }
    }

    /// Register a constructor for `kind`, overwriting any previous
    /// registration (built-in included). Already-cached handles are
    /// unaffected.
    pub fn extend<F, Fut>(&self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(Arc<ConfigStore>, DiskConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Handle>> + Send + 'static,
    {
        let boxed: Constructor = Arc::new(move |store, config| constructor(store, config).boxed());
        self.kinds.write().unwrap().insert(kind.into(), boxed);
    }

    /// Name used when resolution is requested without an explicit name.
    pub fn default_name(&self) -> Option<String> {
        self.store.default_disk()
    }

    /// Change the default disk name. Does not evict or re-resolve any
    /// cached handle.
    pub fn set_default_name(&self, name: &str) {
        self.store.set_default_disk(name);
    }

    async fn resolve(&self, name: &str) -> Result<Handle, ResolveError> {
        let config = self.store.disk_config(name);
        let kind = config
            .kind()
            .ok_or_else(|| ResolveError::missing_kind(name))?
            .to_string();

        let constructor = self
            .kinds
            .read()
            .unwrap()
            .get(&kind)
            .cloned()
            .ok_or_else(|| ResolveError::UnsupportedKind { kind: kind.clone() })?;

        debug!(disk = name, kind = %kind, "constructing backup disk");
        let construction = constructor(self.store.clone(), config);
        match AssertUnwindSafe(construction).catch_unwind().await {
            Ok(Ok(handle)) => {
                info!(disk = name, kind = %kind, "backup disk ready");
                Ok(handle)
            }
            Ok(Err(source)) => Err(ResolveError::Construction {
                name: name.to_string(),
                source,
            }),
            Err(panic) => Err(ResolveError::Contract {
                kind,
                detail: panic_detail(panic),
            }),
        }
    }
}

fn panic_detail(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "constructor panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn store(value: serde_json::Value) -> Arc<ConfigStore> {
        Arc::new(ConfigStore::from_value(value))
    }

    fn memory_handle() -> Handle {
        Arc::new(MemoryBackend::new())
    }

    /// Registers a counting constructor for `kind` and returns the call
    /// counter.
    fn counting_kind(manager: &DiskManager, kind: &str) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        manager.extend(kind, move |_store, _config| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(memory_handle())
            }
        });
        calls
    }

    #[tokio::test]
    async fn get_caches_and_constructs_once() {
        let manager = DiskManager::new(store(json!({
            "backups": {"disks": {"scratch": {"kind": "counted"}}}
        })));
        let calls = counting_kind(&manager, "counted");

        let first = manager.get("scratch").await.unwrap();
        let second = manager.get("scratch").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forget_triggers_reconstruction() {
        let manager = DiskManager::new(store(json!({
            "backups": {"disks": {"scratch": {"kind": "counted"}}}
        })));
        let calls = counting_kind(&manager, "counted");

        let first = manager.get("scratch").await.unwrap();
        manager.forget(["scratch"]);
        let second = manager.get("scratch").await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn forget_evicts_every_name() {
        let manager = DiskManager::new(store(json!({
            "backups": {"disks": {
                "a": {"kind": "counted"},
                "b": {"kind": "counted"},
            }}
        })));
        let calls = counting_kind(&manager, "counted");

        manager.get("a").await.unwrap();
        manager.get("b").await.unwrap();
        manager.forget(["a", "b", "never-resolved"]);
        manager.get("a").await.unwrap();
        manager.get("b").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn extend_overrides_builtin() {
        let manager = DiskManager::new(store(json!({
            "backups": {"disks": {"fake-s3": {"kind": "s3", "bucket": "ignored"}}}
        })));
        let calls = counting_kind(&manager, "s3");

        manager.get("fake-s3").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_kind_is_config_error() {
        let manager = DiskManager::new(store(json!({
            "backups": {"disks": {"incomplete": {"bucket": "backups"}}}
        })));

        let err = manager.get("incomplete").await.unwrap_err();
        assert!(matches!(err, ResolveError::Config { .. }));
        assert!(err.to_string().contains("incomplete"));
    }

    #[tokio::test]
    async fn unconfigured_disk_is_config_error() {
        let manager = DiskManager::new(store(json!({})));
        let err = manager.get("ghost").await.unwrap_err();
        assert!(matches!(err, ResolveError::Config { .. }));
    }

    #[tokio::test]
    async fn unknown_kind_is_unsupported() {
        let manager = DiskManager::new(store(json!({
            "backups": {"disks": {"tape-1": {"kind": "tape"}}}
        })));

        let err = manager.get("tape-1").await.unwrap_err();
        match err {
            ResolveError::UnsupportedKind { kind } => assert_eq!(kind, "tape"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn set_bypasses_construction() {
        let manager = DiskManager::new(store(json!({
            "backups": {"disks": {"pinned": {"kind": "counted"}}}
        })));
        let calls = counting_kind(&manager, "counted");

        let handle = memory_handle();
        manager.set("pinned", handle.clone());

        let resolved = manager.get("pinned").await.unwrap();
        assert!(Arc::ptr_eq(&handle, &resolved));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_gets_coalesce() {
        let manager = Arc::new(DiskManager::new(store(json!({
            "backups": {"disks": {"shared": {"kind": "slow"}}}
        }))));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        manager.extend("slow", move |_store, _config| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(memory_handle())
            }
        });

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(
                async move { manager.get("shared").await.unwrap() },
            ));
        }

        let handles = futures::future::try_join_all(tasks).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for handle in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], handle));
        }
    }

    #[tokio::test]
    async fn failure_leaves_no_cache_entry() {
        let manager = DiskManager::new(store(json!({
            "backups": {"disks": {"flaky": {"kind": "flaky"}}}
        })));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        manager.extend("flaky", move |_store, _config| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("endpoint unreachable");
                }
                Ok(memory_handle())
            }
        });

        let err = manager.get("flaky").await.unwrap_err();
        assert!(matches!(err, ResolveError::Construction { .. }));

        manager.get("flaky").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_constructor_is_contract_violation() {
        let manager = DiskManager::new(store(json!({
            "backups": {"disks": {"broken": {"kind": "broken"}}}
        })));

        manager.extend("broken", |_store, _config| async move {
            panic!("constructor bug");
        });

        let err = manager.get("broken").await.unwrap_err();
        match err {
            ResolveError::Contract { kind, detail } => {
                assert_eq!(kind, "broken");
                assert!(detail.contains("constructor bug"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // A defective construction must not poison the cache either.
        manager.set("broken", memory_handle());
        manager.get("broken").await.unwrap();
    }

    #[tokio::test]
    async fn empty_name_resolves_default() {
        let manager = DiskManager::new(store(json!({
            "backups": {
                "default": "s3-main",
                "disks": {"s3-main": {
                    "kind": "s3",
                    "bucket": "backups",
                    "prefix": "node-1/",
                    "key": "AKIATEST",
                    "secret": "sekrit",
                }},
            }
        })));

        let by_default = manager.get_default().await.unwrap();
        let by_name = manager.get("s3-main").await.unwrap();
        assert!(Arc::ptr_eq(&by_default, &by_name));
    }

    #[tokio::test]
    async fn no_default_is_config_error() {
        let manager = DiskManager::new(store(json!({})));
        let err = manager.get_default().await.unwrap_err();
        assert!(matches!(err, ResolveError::Config { .. }));
    }

    #[tokio::test]
    async fn changing_default_keeps_cached_handles() {
        let manager = DiskManager::new(store(json!({
            "backups": {
                "default": "a",
                "disks": {
                    "a": {"kind": "memory"},
                    "b": {"kind": "memory"},
                },
            }
        })));

        let a = manager.get_default().await.unwrap();
        manager.set_default_name("b");
        assert_eq!(manager.default_name().as_deref(), Some("b"));

        // `a` stays cached; the default now resolves to a different disk.
        let a_again = manager.get("a").await.unwrap();
        assert!(Arc::ptr_eq(&a, &a_again));
        let b = manager.get_default().await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn memory_disk_roundtrip_within_process() {
        let config = json!({
            "backups": {"disks": {"local": {"kind": "memory"}}}
        });
        let manager = DiskManager::new(store(config.clone()));

        let disk = manager.get("local").await.unwrap();
        disk.write("snapshots/a.json", b"payload").await.unwrap();
        assert_eq!(disk.read("snapshots/a.json").await.unwrap(), b"payload");

        // Fresh manager simulates a process restart: the data is gone.
        let restarted = DiskManager::new(store(config));
        let disk = restarted.get("local").await.unwrap();
        assert!(!disk.exists("snapshots/a.json").await.unwrap());
    }
}
