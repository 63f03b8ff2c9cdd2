//! # zapi-id
//!
//! Typed identifiers for the zapi facade.
//!
//! ## ID Format
//!
//! Every identifier is a random (v4) UUID rendered in its canonical
//! hyphenated lowercase form, with no prefix:
//!
//! - `0b8f6c1e-6a0e-4d55-9a43-2f1f3b1f8c7e`
//!
//! The bare form is what the metadata store keeps in its `id` and
//! `instance_id` columns and what connector containers receive in their
//! `INSTANCE_ID` environment variable, so it must never be decorated.
//! The Rust types still keep an instance id from being passed where a QR
//! code id is expected.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export uuid for consumers that need raw UUID operations
pub use uuid::Uuid;

#[doc(hidden)]
pub const HYPHENATED_LEN: usize = uuid::fmt::Hyphenated::LENGTH;
