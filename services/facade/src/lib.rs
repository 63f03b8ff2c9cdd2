//! zapi facade library.
//!
//! This crate primarily ships a `facade` binary, but we expose a small
//! library surface to enable integration testing with in-memory
//! collaborators.

pub mod api;
pub mod config;
pub mod provisioner;
pub mod qr;
pub mod report;
pub mod router;
pub mod runtime;
pub mod state;
pub mod store;
