//! Record identity tokens.
//!
//! Every document MDR stores (patients and medication dispenses) is keyed by a
//! [`RecordId`]: a v4 UUID rendered in its *canonical* form, **32 lowercase hexadecimal
//! characters** with no hyphens.
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Canonical form is required for identifiers supplied from outside (HTTP paths, CLI
//! arguments). Anything else is rejected by [`RecordId::parse`] rather than normalised, so a
//! given record has exactly one spelling in URLs, references (`Patient/<id>`) and the store.

mod service;

pub use service::RecordId;

/// Error type for record identity operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for record identity operations.
pub type UuidResult<T> = Result<T, UuidError>;
