use anyhow::{Context, Result};
use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use serde::Deserialize;

use super::Backend;
use crate::config::DiskConfig;

const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible disk scoped to a bucket and optional key prefix.
#[derive(Debug)]
pub struct S3Backend {
    bucket: Box<Bucket>,
    prefix: String,
}

/// Backend-specific tuning under the `options` config field.
#[derive(Debug, Default, Deserialize)]
struct S3Options {
    #[serde(default)]
    path_style: bool,
}

impl S3Backend {
    /// Build from disk config.
    ///
    /// `bucket` is required. `region` defaults to `us-east-1`; an
    /// `endpoint` turns it into a custom region/endpoint pair for
    /// S3-compatible stores. When both `key` and `secret` are present
    /// they are used directly (plus an optional `token`); otherwise
    /// credentials resolve from the ambient environment/profile chain.
    pub async fn from_config(config: &DiskConfig) -> Result<Self> {
        let bucket_name = config.require_str("bucket")?;

        let region_name = config.get_str("region").unwrap_or(DEFAULT_REGION);
        let region = match config.get_str("endpoint") {
            Some(endpoint) => Region::Custom {
                region: region_name.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region_name
                .parse()
                .with_context(|| format!("invalid S3 region: {region_name}"))?,
        };

        let credentials = match (config.get_str("key"), config.get_str("secret")) {
            (Some(key), Some(secret)) => {
                Credentials::new(Some(key), Some(secret), config.get_str("token"), None, None)?
            }
            _ => Credentials::default()
                .context("no explicit S3 credentials and none found in the environment")?,
        };

        let options: S3Options = match config.get("options") {
            Some(value) => serde_json::from_value(value.clone())
                .context("invalid S3 disk `options`")?,
            None => S3Options::default(),
        };

        let bucket = Bucket::new(bucket_name, region, credentials)?;
        let bucket = if options.path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        let prefix = config
            .get_str("prefix")
            .unwrap_or("")
            .trim_matches('/')
            .to_string();
        Ok(Self { bucket, prefix })
    }

    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_path(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{path}", self.prefix)
        }
    }
}

#[async_trait]
impl Backend for S3Backend {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.full_path(path);
        let response = self
            .bucket
            .get_object(&full)
            .await
            .with_context(|| format!("S3 GET failed: {full}"))?;
        Ok(response.to_vec())
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.full_path(path);
        self.bucket
            .put_object(&full, data)
            .await
            .with_context(|| format!("S3 PUT failed: {full}"))?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path);
        match self.bucket.head_object(&full).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full = self.full_path(prefix);
        let results = self
            .bucket
            .list(full.clone(), Some("/".to_string()))
            .await
            .with_context(|| format!("S3 LIST failed: {full}"))?;
        let mut paths = Vec::new();
        for result in results {
            for obj in result.contents {
                if let Some(stripped) = obj.key.strip_prefix(&format!("{}/", self.prefix)) {
                    paths.push(stripped.to_string());
                } else {
                    paths.push(obj.key);
                }
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        self.bucket
            .delete_object(&full)
            .await
            .with_context(|| format!("S3 DELETE failed: {full}"))?;
        Ok(())
    }
}
