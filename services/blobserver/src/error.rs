//! Error types for the blob server

use axum::http::StatusCode;
use axum::http::header::InvalidHeaderValue;
use axum::response::{IntoResponse, Response};
use camino::Utf8PathBuf;
use storage::StorageError;

use crate::digest::{Digest, DigestError};

/// Result type for blob serving operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Error types for blob serving operations
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The requested digest is not a valid digest
    #[error("invalid digest: {0}")]
    MalformedDigest(#[from] DigestError),

    /// The metadata resolver has no record of the blob
    #[error("blob unknown to registry: {0}")]
    BlobNotFound(Digest),

    /// The metadata resolver failed
    #[error("resolving descriptor for {digest}")]
    MetadataResolutionFailed {
        /// Requested digest
        digest: Digest,
        /// Resolver error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The storage backend failed to produce a redirect URL
    #[error("generating redirect URL for {path}")]
    RedirectFailed {
        /// Blob location
        path: Utf8PathBuf,
        /// Backend error
        #[source]
        source: StorageError,
    },

    /// The storage backend could not read a blob its metadata says exists
    #[error("reading blob {digest} from {path}")]
    StorageReadFailed {
        /// Blob digest
        digest: Digest,
        /// Blob location
        path: Utf8PathBuf,
        /// Backend error
        #[source]
        source: StorageError,
    },

    /// Invalid repository name
    #[error("invalid repository name: {0}")]
    InvalidRepository(String),

    /// A response header could not be encoded
    #[error("encoding response header")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

impl BlobError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            BlobError::BlobNotFound(_) => StatusCode::NOT_FOUND,
            BlobError::MalformedDigest(_) | BlobError::InvalidRepository(_) => {
                StatusCode::BAD_REQUEST
            }
            BlobError::MetadataResolutionFailed { .. }
            | BlobError::RedirectFailed { .. }
            | BlobError::StorageReadFailed { .. }
            | BlobError::InvalidHeader(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The storage backend failure behind this error, if any
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            BlobError::RedirectFailed { source, .. } | BlobError::StorageReadFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Get the error code for OCI error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            BlobError::BlobNotFound(_) => "BLOB_UNKNOWN",
            BlobError::MalformedDigest(_) => "DIGEST_INVALID",
            BlobError::InvalidRepository(_) => "NAME_INVALID",
            BlobError::MetadataResolutionFailed { .. }
            | BlobError::RedirectFailed { .. }
            | BlobError::StorageReadFailed { .. }
            | BlobError::InvalidHeader(_) => "UNKNOWN",
        }
    }
}

/// OCI error response format
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for BlobError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if let Some(storage) = self.storage_error() {
            tracing::error!(
                error = &self as &(dyn std::error::Error + 'static),
                engine = storage.engine(),
                span_trace = %storage.span_trace(),
                "{message}"
            );
            tracing::trace!(backtrace = %storage.backtrace(), "storage failure backtrace");
        } else if status.is_server_error() {
            tracing::error!(error = &self as &(dyn std::error::Error + 'static), "{message}");
        } else {
            tracing::debug!(%code, "{message}");
        }

        let body = ErrorResponse {
            errors: vec![ErrorDetail { code, message }],
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let digest = Digest::sha256(b"x");
        assert_eq!(
            BlobError::BlobNotFound(digest.clone()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BlobError::from(DigestError::EmptyHex("sha256:".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BlobError::MetadataResolutionFailed {
                digest,
                source: "down".into(),
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn error_body_uses_oci_envelope() {
        let response = BlobError::BlobNotFound(Digest::sha256(b"x")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["errors"][0]["code"], "BLOB_UNKNOWN");
    }

    #[test]
    fn storage_failures_expose_backend_error() {
        let error = BlobError::StorageReadFailed {
            digest: Digest::sha256(b"x"),
            path: "/blobs/data".into(),
            source: StorageError::new(
                "local",
                storage::StorageErrorKind::Io,
                std::io::Error::other("disk"),
            ),
        };
        assert_eq!(error.storage_error().map(StorageError::engine), Some("local"));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        assert!(BlobError::BlobNotFound(Digest::sha256(b"x")).storage_error().is_none());
    }

    #[test]
    fn header_encoding_failure_is_a_server_error() {
        let invalid = axum::http::HeaderValue::from_str("line\nbreak").unwrap_err();
        let error = BlobError::from(invalid);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.error_code(), "UNKNOWN");
    }
}
