//! Core types shared by bazaar operations: the top-level error and archive extraction.

pub mod archive;
pub mod error;

pub use error::{BazaarError, ErrorCategory, ErrorContext};

pub type BazaarResult<T> = std::result::Result<T, BazaarError>;
