//! Mediamirror-Storage: key-addressed blob stores and the syncing facade.
//!
//! Every file is addressed by a relative storage key such as
//! `2024/05/cat-150x150.jpg`. The same key names the file in the local uploads
//! directory and in the remote bucket.
//!
//! - [`BlobStore`]: `exists/read/write/delete` over one location
//! - [`LocalStore`], [`MemoryStore`], [`S3Store`], [`GcsStore`]: adapters
//! - [`SyncingStore`]: `has/pull/push/delete` across the local and remote stores

pub mod error;
pub mod gcs;
pub mod local;
pub mod memory;
pub mod s3;
pub mod sync;
pub mod traits;

pub use error::{Result, StorageError};
pub use gcs::{GcsSettings, GcsStore};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::{S3Settings, S3Store};
pub use sync::{RemoteState, SyncingStore};
pub use traits::BlobStore;
