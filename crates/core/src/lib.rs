//! `casguard-core`: shared building blocks for the CAS interception layer.
//!
//! This crate holds identifiers and the error taxonomy only (no HTTP, no IO).

pub mod error;
pub mod id;

pub use error::{CasError, CasResult};
pub use id::SessionId;
