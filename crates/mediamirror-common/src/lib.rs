//! Mediamirror-Common: Shared types, IDs, and utilities.
//!
//! This crate provides common functionality used across mediamirror:
//!
//! - **Typed IDs**: `AttachmentId` for catalog records
//! - **Core Types**: `StorageLocation` for the local/remote split
//! - **Path Utilities**: storage key normalisation, size file naming and MIME detection
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use mediamirror_common::{AttachmentId, Error, Result, StorageLocation};
//! use mediamirror_common::paths::normalize_key;
//!
//! let id = AttachmentId::from(42);
//! assert_eq!(id.to_string(), "42");
//!
//! assert_eq!(normalize_key("/2024/05/cat.jpg/").unwrap(), "2024/05/cat.jpg");
//! assert_eq!(StorageLocation::Remote.to_string(), "remote");
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("attachment 7"))
//! }
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
