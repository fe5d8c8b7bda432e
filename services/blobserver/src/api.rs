//! API server builder and router

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use camino::Utf8PathBuf;
use serde_json::json;

use crate::descriptor::{BlobStatter, CachedStatter, DriverStatter};
use crate::paths::{DEFAULT_ROOT, PathResolver};
use crate::server::{BlobServer, DEFAULT_CACHE_MAX_AGE};

/// Errors raised while assembling a blob server
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No storage backend was configured
    #[error("storage backend must be configured")]
    MissingStorage,
}

/// Builder for configuring and creating the blob server
#[derive(Debug)]
pub struct BlobServerBuilder {
    storage: Option<storage::Storage>,
    statter: Option<Arc<dyn BlobStatter>>,
    root: Utf8PathBuf,
    redirect: bool,
    cache_max_age: Duration,
    cache_descriptors: usize,
}

impl Default for BlobServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobServerBuilder {
    /// Create a new builder. Redirects are enabled by default.
    pub fn new() -> Self {
        Self {
            storage: None,
            statter: None,
            root: DEFAULT_ROOT.into(),
            redirect: true,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            cache_descriptors: 0,
        }
    }

    /// Set the storage backend
    pub fn storage(mut self, storage: storage::Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the namespace root under which blobs are stored
    pub fn root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Enable or disable redirecting clients to the storage backend
    pub fn redirect(mut self, redirect: bool) -> Self {
        self.redirect = redirect;
        self
    }

    /// Set the `Cache-Control` max-age sent with blobs
    pub fn cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = max_age;
        self
    }

    /// Resolve descriptors with a custom statter instead of inspecting storage
    pub fn statter(mut self, statter: impl BlobStatter + 'static) -> Self {
        self.statter = Some(Arc::new(statter));
        self
    }

    /// Remember up to `capacity` resolved descriptors in memory. Zero disables the cache.
    pub fn cache_descriptors(mut self, capacity: usize) -> Self {
        self.cache_descriptors = capacity;
        self
    }

    /// Build the blob server
    pub fn build(self) -> Result<BlobServer, BuildError> {
        let storage = self.storage.ok_or(BuildError::MissingStorage)?;
        let paths = PathResolver::new(self.root);

        let statter = self
            .statter
            .unwrap_or_else(|| Arc::new(DriverStatter::new(storage.clone(), paths.clone())));
        let statter: Arc<dyn BlobStatter> = match NonZeroUsize::new(self.cache_descriptors) {
            Some(capacity) => Arc::new(CachedStatter::new(statter, capacity)),
            None => statter,
        };

        tracing::debug!(
            root = %paths.root(),
            redirect = self.redirect,
            cache_descriptors = self.cache_descriptors,
            driver = storage.name(),
            "configured blob server"
        );

        Ok(BlobServer::new(
            storage,
            statter,
            paths,
            self.redirect,
            self.cache_max_age,
        ))
    }

    /// Build the blob server and wrap it in a router
    ///
    /// Returns a Router that can be served with any tower-compatible server
    pub fn router(self) -> Result<Router, BuildError> {
        Ok(router(self.build()?))
    }
}

/// Routes for the blob API, backed by `server`
pub fn router(server: BlobServer) -> Router {
    Router::new()
        .route("/v2/", get(api_version_check))
        .merge(crate::blob::router())
        .with_state(server)
}

/// API version check endpoint
///
/// Returns 200 OK to indicate the registry is available
async fn api_version_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({})))
}
