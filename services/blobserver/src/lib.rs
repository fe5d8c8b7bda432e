//! # Content-addressed blob server
//!
//! Serves immutable blobs, identified by digest, over the registry
//! `/v2/<name>/blobs/<digest>` API.
//!
//! ## Features
//!
//! - Redirects clients to the storage backend when it can issue URLs
//! - Streams blobs directly otherwise, with strong `ETag`s and long-lived caching
//! - Conditional requests and single or multi-part byte ranges
//! - Pluggable storage backend via the `storage` crate
//! - Builder pattern for configuration
//!
//! ## Example
//!
//! ```no_run
//! use blobserver::BlobServerBuilder;
//! use storage::MemoryStorage;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let router = BlobServerBuilder::new()
//!     .storage(MemoryStorage::new().into())
//!     .redirect(false)
//!     .router()?;
//!
//! // Use the router with axum or any tower-compatible server
//! # Ok(())
//! # }
//! ```

mod api;
mod blob;
mod config;
mod content;
mod descriptor;
mod digest;
mod error;
mod paths;
mod range;
mod reader;
mod server;

pub use api::{BlobServerBuilder, BuildError, router};
pub use config::{Config, ConfigError};
pub use content::serve_content;
pub use descriptor::{
    BlobStatter, CachedStatter, DEFAULT_MEDIA_TYPE, Descriptor, DriverStatter, StatError,
};
pub use digest::{Digest, DigestError};
pub use error::{BlobError, BlobResult};
pub use paths::{DEFAULT_ROOT, PathResolver};
pub use range::{ByteRange, RangeError, parse_range};
pub use reader::BlobReader;
pub use server::{BlobServer, DEFAULT_CACHE_MAX_AGE, DOCKER_CONTENT_DIGEST, Delivery};
