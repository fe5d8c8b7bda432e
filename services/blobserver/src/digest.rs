//! Content digests of the form `algorithm:hex`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;

/// Errors produced while parsing a digest
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// No `:` separating algorithm and hex
    #[error("digest {0:?} is missing an algorithm separator")]
    MissingSeparator(String),

    /// Algorithm component is empty
    #[error("digest {0:?} has an empty algorithm")]
    EmptyAlgorithm(String),

    /// Hex component is empty
    #[error("digest {0:?} has an empty hex component")]
    EmptyHex(String),

    /// Algorithm contains characters outside `[a-z0-9+._-]`
    #[error("digest {0:?} has an invalid algorithm")]
    InvalidAlgorithm(String),

    /// Hex component contains characters outside `[a-f0-9]`
    #[error("digest {0:?} is not lowercase hex")]
    InvalidHex(String),

    /// Algorithm is well formed but not one we can verify
    #[error("digest {0:?} uses an unsupported algorithm")]
    UnsupportedAlgorithm(String),

    /// Hex component has the wrong length for its algorithm
    #[error("{algorithm} digest must have {expected} hex characters, got {actual}")]
    InvalidLength {
        /// Algorithm name
        algorithm: String,
        /// Expected number of hex characters
        expected: usize,
        /// Actual number of hex characters
        actual: usize,
    },

    /// Hex component is too short to be sharded into a storage path
    #[error("digest {0:?} is too short to address storage")]
    TooShort(String),
}

/// A content digest, e.g. `sha256:e3b0c442...`.
///
/// Only syntactically valid digests can be constructed. Equality, ordering and
/// hashing are over the canonical string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    value: String,
    split: usize,
}

/// Hex lengths for the algorithms we know how to verify.
fn registered_length(algorithm: &str) -> Option<usize> {
    match algorithm {
        "sha256" => Some(64),
        "sha384" => Some(96),
        "sha512" => Some(128),
        _ => None,
    }
}

impl Digest {
    /// Parse and validate a digest string.
    pub fn parse(value: &str) -> Result<Self, DigestError> {
        let Some((algorithm, hex)) = value.split_once(':') else {
            return Err(DigestError::MissingSeparator(value.to_owned()));
        };

        if algorithm.is_empty() {
            return Err(DigestError::EmptyAlgorithm(value.to_owned()));
        }

        if hex.is_empty() {
            return Err(DigestError::EmptyHex(value.to_owned()));
        }

        if !algorithm
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"+._-".contains(&b))
        {
            return Err(DigestError::InvalidAlgorithm(value.to_owned()));
        }

        if !hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(DigestError::InvalidHex(value.to_owned()));
        }

        let Some(expected) = registered_length(algorithm) else {
            return Err(DigestError::UnsupportedAlgorithm(value.to_owned()));
        };

        if hex.len() != expected {
            return Err(DigestError::InvalidLength {
                algorithm: algorithm.to_owned(),
                expected,
                actual: hex.len(),
            });
        }

        Ok(Self {
            value: value.to_owned(),
            split: algorithm.len(),
        })
    }

    /// Compute the `sha256` digest of some content.
    pub fn sha256(data: impl AsRef<[u8]>) -> Self {
        use sha2::Digest as _;

        let hex = hex::encode(Sha256::digest(data.as_ref()));
        Self {
            value: format!("sha256:{hex}"),
            split: "sha256".len(),
        }
    }

    /// The algorithm component, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        &self.value[..self.split]
    }

    /// The hex-encoded hash component.
    pub fn hex(&self) -> &str {
        &self.value[self.split + 1..]
    }

    /// The canonical `algorithm:hex` string.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Digest").field(&self.value).finish()
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Digest::parse(&value).map_err(serde::de::Error::custom)
    }
}
