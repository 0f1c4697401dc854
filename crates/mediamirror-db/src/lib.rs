//! Mediamirror-DB: the media catalog.
//!
//! Attachments live in SQLite, accessed through rusqlite with an r2d2
//! connection pool. Each row carries the original file's storage key, its
//! MIME type and two JSON documents describing generated sizes: the native
//! size metadata and the mirror's own shadow record.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - The `Attachment` aggregate and its metadata views
//! - `queries` - Catalog operations
//!
//! # Example
//!
//! ```
//! use mediamirror_db::pool::{init_memory_pool, get_conn};
//! use mediamirror_db::models::NewAttachment;
//! use mediamirror_db::queries::attachments;
//!
//! let pool = init_memory_pool().unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let attachment = attachments::insert_attachment(
//!     &conn,
//!     &NewAttachment::image("2024/05/cat.jpg", "image/jpeg", 2000, 1500),
//! )
//! .unwrap();
//! assert_eq!(attachment.original_width(), Some(2000));
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
