use thiserror::Error;

/// Failures surfaced by [`crate::DiskManager::get`].
///
/// The first two identify operator mistakes (bad or missing
/// configuration), `Contract` identifies a defective constructor, and
/// `Construction` wraps whatever the constructor itself reported.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("backup disk `{name}` has no usable configuration: {reason}")]
    Config { name: String, reason: String },

    #[error("unsupported backup disk kind `{kind}`")]
    UnsupportedKind { kind: String },

    #[error("constructor for disk kind `{kind}` violated its contract: {detail}")]
    Contract { kind: String, detail: String },

    #[error("failed to construct backup disk `{name}`")]
    Construction {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ResolveError {
    pub(crate) fn missing_kind(name: &str) -> Self {
        Self::Config {
            name: name.to_string(),
            reason: "missing `kind` field".to_string(),
        }
    }

    pub(crate) fn no_default() -> Self {
        Self::Config {
            name: "default".to_string(),
            reason: "`backups.default` is not set".to_string(),
        }
    }
}
