//! # Storage driver interface
//!
//! The capability trait implemented by storage backends, along with the
//! shared metadata and error types.

mod driver;
mod error;

pub use driver::BoxReader;
pub use driver::Driver;
pub use driver::Metadata;
pub use driver::Reader;
pub use driver::SeekableRead;
pub use error::StorageError;
pub use error::StorageErrorBuilder;
pub use error::StorageErrorKind;
