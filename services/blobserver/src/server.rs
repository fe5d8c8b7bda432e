//! Serving blobs by digest

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header, request};
use axum::response::Response;
use camino::Utf8Path;
use storage::{Storage, StorageError, StorageErrorKind};

use crate::content::serve_content;
use crate::descriptor::{BlobStatter, StatError};
use crate::digest::Digest;
use crate::error::{BlobError, BlobResult};
use crate::paths::PathResolver;
use crate::reader::BlobReader;

/// Header carrying the canonical digest of the served content.
pub const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");

/// Default `Cache-Control` max-age for blobs: one year.
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How a blob will be delivered to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Send the client to a backend URL.
    Redirect(HeaderValue),

    /// Stream the bytes through this server.
    Stream,
}

#[derive(Debug)]
struct Inner {
    storage: Storage,
    statter: Arc<dyn BlobStatter>,
    paths: PathResolver,
    redirect: bool,
    cache_max_age: Duration,
}

/// Serves blobs from a storage driver, using a statter to describe them.
///
/// Cheap to clone; clones share the same storage and statter.
#[derive(Debug, Clone)]
pub struct BlobServer {
    inner: Arc<Inner>,
}

impl BlobServer {
    pub(crate) fn new(
        storage: Storage,
        statter: Arc<dyn BlobStatter>,
        paths: PathResolver,
        redirect: bool,
        cache_max_age: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                statter,
                paths,
                redirect,
                cache_max_age,
            }),
        }
    }

    /// Create a builder for configuring a blob server.
    pub fn builder() -> crate::api::BlobServerBuilder {
        crate::api::BlobServerBuilder::new()
    }

    /// Whether redirects to the storage backend are attempted.
    pub fn redirects(&self) -> bool {
        self.inner.redirect
    }

    /// The path resolver used to locate blobs.
    pub fn paths(&self) -> &PathResolver {
        &self.inner.paths
    }

    /// Serve the blob named by `digest`.
    ///
    /// `headers` are response headers already chosen by an outer layer; they
    /// are never overwritten by the defaults set here.
    #[tracing::instrument(skip_all, fields(%digest, method = %request.method))]
    pub async fn serve_blob(
        &self,
        digest: &Digest,
        request: &request::Parts,
        mut headers: HeaderMap,
    ) -> BlobResult<Response> {
        let descriptor = self
            .inner
            .statter
            .stat(digest)
            .await
            .map_err(|error| match error {
                StatError::NotFound => BlobError::BlobNotFound(digest.clone()),
                StatError::InvalidDigest(error) => BlobError::MalformedDigest(error),
                StatError::Failed(source) => BlobError::MetadataResolutionFailed {
                    digest: digest.clone(),
                    source,
                },
            })?;

        let path = self.inner.paths.blob_data_path(&descriptor.digest)?;

        if let Delivery::Redirect(location) = self.delivery(&path, request).await? {
            tracing::debug!(%path, "redirecting to storage backend");
            headers.insert(header::LOCATION, location);
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
            *response.headers_mut() = headers;
            return Ok(response);
        }

        let reader = BlobReader::open(&self.inner.storage, &path, descriptor.size)
            .await
            .map_err(|source| BlobError::StorageReadFailed {
                digest: descriptor.digest.clone(),
                path: path.clone(),
                source,
            })?;

        set_if_absent(
            &mut headers,
            header::ETAG,
            HeaderValue::try_from(format!("\"{}\"", descriptor.digest))?,
        );
        set_if_absent(
            &mut headers,
            header::CACHE_CONTROL,
            HeaderValue::try_from(format!("max-age={}", self.inner.cache_max_age.as_secs()))?,
        );
        set_if_absent(
            &mut headers,
            DOCKER_CONTENT_DIGEST,
            HeaderValue::try_from(descriptor.digest.as_str())?,
        );
        set_if_absent(
            &mut headers,
            header::CONTENT_TYPE,
            HeaderValue::try_from(descriptor.media_type.as_str())?,
        );
        set_if_absent(
            &mut headers,
            header::CONTENT_LENGTH,
            HeaderValue::from(descriptor.size),
        );

        tracing::debug!(%path, size = descriptor.size, "serving blob directly");
        Ok(serve_content(
            request,
            headers,
            descriptor.digest.as_str(),
            descriptor.size,
            reader,
        )?)
    }

    /// Decide whether to redirect the client to the backend or stream the blob.
    pub async fn delivery(&self, path: &Utf8Path, request: &request::Parts) -> BlobResult<Delivery> {
        if !self.inner.redirect {
            return Ok(Delivery::Stream);
        }

        let url = self
            .inner
            .storage
            .redirect_url(path, request)
            .await
            .map_err(|source| BlobError::RedirectFailed {
                path: path.to_owned(),
                source,
            })?;

        match url.filter(|url| !url.is_empty()) {
            None => Ok(Delivery::Stream),
            Some(url) => HeaderValue::try_from(url)
                .map(Delivery::Redirect)
                .map_err(|error| BlobError::RedirectFailed {
                    path: path.to_owned(),
                    source: StorageError::builder(
                        self.inner.storage.name(),
                        StorageErrorKind::InvalidRequest,
                        error,
                    )
                    .path(path.as_str())
                    .context("redirect URL is not a valid header value")
                    .build(),
                }),
        }
    }
}

fn set_if_absent(headers: &mut HeaderMap, name: HeaderName, value: HeaderValue) {
    if !headers.contains_key(&name) {
        headers.insert(name, value);
    }
}
