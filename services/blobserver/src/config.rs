//! Configuration file for the blob server

use std::net::SocketAddr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use storage::{StorageConfig, StorageError};

use crate::api::{BlobServerBuilder, BuildError};
use crate::paths::DEFAULT_ROOT;
use crate::server::{BlobServer, DEFAULT_CACHE_MAX_AGE};

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("reading {path}")]
    Io {
        /// Path of the configuration file
        path: Utf8PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has unexpected fields
    #[error("parsing configuration")]
    Parse(#[from] toml_edit::de::Error),

    /// The storage backend could not be constructed
    #[error("configuring storage")]
    Storage(#[from] StorageError),

    /// The server could not be assembled
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Blob server configuration
///
/// ```toml
/// listen = "127.0.0.1:5000"
/// root = "/docker/registry/v2"
/// redirect = false
/// cache-max-age = 31536000
///
/// [storage]
/// local = { path = "/var/lib/blobs" }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Namespace root for blob paths
    #[serde(default = "default_root")]
    pub root: Utf8PathBuf,

    /// Whether to redirect clients to the storage backend when it supports it
    #[serde(default = "default_redirect")]
    pub redirect: bool,

    /// `Cache-Control` max-age for blobs, in seconds
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age: u64,

    /// Number of blob descriptors to remember in memory; zero disables the cache
    #[serde(default)]
    pub cache_descriptors: usize,

    /// Storage backend
    pub storage: StorageConfig,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_root() -> Utf8PathBuf {
    DEFAULT_ROOT.into()
}

fn default_redirect() -> bool {
    true
}

fn default_cache_max_age() -> u64 {
    DEFAULT_CACHE_MAX_AGE.as_secs()
}

impl Config {
    /// Parse configuration from a TOML document
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        Ok(toml_edit::de::from_str(document)?)
    }

    /// Read and parse a TOML configuration file
    pub async fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let document = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_owned(),
                source,
            })?;
        Self::from_toml(&document)
    }

    /// Construct the storage backend and the blob server
    #[tracing::instrument(skip(self))]
    pub async fn server(self) -> Result<BlobServer, ConfigError> {
        let storage = self.storage.build().await?;
        Ok(BlobServerBuilder::new()
            .storage(storage)
            .root(self.root)
            .redirect(self.redirect)
            .cache_max_age(Duration::from_secs(self.cache_max_age))
            .cache_descriptors(self.cache_descriptors)
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_toml("[storage]\nmemory = {}\n").unwrap();
        assert_eq!(config.listen, default_listen());
        assert_eq!(config.root, DEFAULT_ROOT);
        assert!(config.redirect);
        assert_eq!(config.cache_max_age, 31_536_000);
        assert_eq!(config.cache_descriptors, 0);
        assert!(matches!(
            config.storage,
            StorageConfig::Memory { redirect: None }
        ));
    }

    #[test]
    fn full_document() {
        let config = Config::from_toml(
            r#"
            listen = "0.0.0.0:8080"
            root = "/srv/registry"
            redirect = false
            cache-max-age = 60
            cache-descriptors = 4096

            [storage]
            local = { path = "/var/lib/blobs" }
            "#,
        )
        .unwrap();

        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.root, "/srv/registry");
        assert!(!config.redirect);
        assert_eq!(config.cache_max_age, 60);
        assert_eq!(config.cache_descriptors, 4096);
        assert!(matches!(config.storage, StorageConfig::Local { .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = Config::from_toml("redirects = true\n[storage]\nmemory = {}\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[tokio::test]
    async fn builds_server() {
        let config = Config::from_toml("redirect = false\n[storage]\nmemory = {}\n").unwrap();
        let server = config.server().await.unwrap();
        assert!(!server.redirects());
    }
}
