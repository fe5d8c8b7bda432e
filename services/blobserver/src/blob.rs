//! Blob routes for the registry API

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::digest::Digest;
use crate::error::{BlobError, BlobResult};
use crate::server::BlobServer;

/// Router for blob operations
///
/// Repository names may span several path segments (`library/ubuntu`), so the
/// route captures the rest of the path and splits off `/blobs/<digest>`.
pub fn router() -> Router<BlobServer> {
    Router::new().route("/v2/{*path}", get(get_blob).head(get_blob))
}

/// Fetch a blob, or its headers for `HEAD`
async fn get_blob(
    State(server): State<BlobServer>,
    Path(path): Path<String>,
    request: Request,
) -> BlobResult<Response> {
    let Some((name, digest)) = path.rsplit_once("/blobs/") else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    validate_repository(name)?;
    let digest: Digest = digest.parse()?;

    let (parts, _body) = request.into_parts();
    server.serve_blob(&digest, &parts, HeaderMap::new()).await
}

/// Validate repository name
///
/// Each `/`-separated component is lowercase alphanumeric, optionally joined
/// by `.`, `_` or `-`.
fn validate_repository(name: &str) -> BlobResult<()> {
    let alphanumeric = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let component = |part: &str| {
        let bytes = part.as_bytes();
        bytes.first().is_some_and(alphanumeric)
            && bytes.last().is_some_and(alphanumeric)
            && bytes
                .iter()
                .all(|b| alphanumeric(b) || matches!(b, b'.' | b'_' | b'-'))
    };

    if name.contains("..") || !name.split('/').all(component) {
        return Err(BlobError::InvalidRepository(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_names() {
        assert!(validate_repository("library").is_ok());
        assert!(validate_repository("library/ubuntu").is_ok());
        assert!(validate_repository("my-org/sub.team/app_1").is_ok());
        assert!(validate_repository("").is_err());
        assert!(validate_repository("a..b").is_err());
        assert!(validate_repository("library//ubuntu").is_err());
        assert!(validate_repository("/library").is_err());
        assert!(validate_repository("Library").is_err());
        assert!(validate_repository("-library").is_err());
    }
}
