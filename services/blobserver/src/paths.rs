//! Mapping from digests to storage locations

use camino::{Utf8Path, Utf8PathBuf};

use crate::digest::{Digest, DigestError};

/// Default namespace root, shared with existing registry deployments.
pub const DEFAULT_ROOT: &str = "/docker/registry/v2";

/// Derives storage locations for blobs below a namespace root.
///
/// Blobs are sharded by the first two hex characters of their digest:
///
/// ```text
/// <root>/blobs/<algorithm>/<hex[..2]>/<hex>/data
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: Utf8PathBuf,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl PathResolver {
    /// Create a resolver rooted at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The namespace root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Location of the data file for a blob.
    pub fn blob_data_path(&self, digest: &Digest) -> Result<Utf8PathBuf, DigestError> {
        let hex = digest.hex();
        let shard = hex
            .get(..2)
            .ok_or_else(|| DigestError::TooShort(digest.to_string()))?;

        let mut path = self.root.join("blobs");
        path.push(digest.algorithm());
        path.push(shard);
        path.push(hex);
        path.push("data");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_path_layout() {
        let resolver = PathResolver::default();
        let digest = Digest::sha256(b"hello");
        let path = resolver.blob_data_path(&digest).unwrap();
        assert_eq!(
            path.as_str(),
            format!(
                "/docker/registry/v2/blobs/sha256/{}/{}/data",
                &digest.hex()[..2],
                digest.hex()
            )
        );
    }

    #[test]
    fn blob_path_is_deterministic() {
        let resolver = PathResolver::new("/srv");
        let digest = Digest::sha256(b"content");
        assert_eq!(
            resolver.blob_data_path(&digest).unwrap(),
            resolver.blob_data_path(&digest.clone()).unwrap()
        );
    }

    #[test]
    fn distinct_digests_get_distinct_paths() {
        let resolver = PathResolver::default();
        let a = resolver.blob_data_path(&Digest::sha256(b"a")).unwrap();
        let b = resolver.blob_data_path(&Digest::sha256(b"b")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn algorithm_selects_directory() {
        let resolver = PathResolver::new("/srv");
        let hex = format!("ab{}", "0".repeat(126));
        let digest = Digest::parse(&format!("sha512:{hex}")).unwrap();
        assert_eq!(
            resolver.blob_data_path(&digest).unwrap().as_str(),
            format!("/srv/blobs/sha512/ab/{hex}/data")
        );
    }
}
