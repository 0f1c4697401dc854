//! Catalog query modules.

pub mod attachments;
