//! Shared core types: the library error enum and small cross-cutting helpers.

pub mod error;

pub use error::FpmError;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, FpmError>;
