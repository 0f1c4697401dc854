//! Image sizes: decisions, rendering, status and the reconciliation workflow.
//!
//! The [`SizeResolver`] decides which configured sizes can be derived from
//! an original and whether existing sizes still match their preset. The
//! [`MediaService`] runs the workflow that regenerates sizes and keeps the
//! local and remote copies in step.

mod error;
mod resolver;
mod service;
mod status;

pub use error::SyncError;
pub use resolver::{
    can_generate, is_mismatched, render, resize_plan, Dimensions, RenderedSize, ResizePlan,
    SizeResolver,
};
pub use service::{
    DeleteSummary, Ingested, LibraryEntry, MediaService, SyncSummary, TransferFailure,
};
pub use status::{
    build_report, size_status, GenerationState, GenerationStatus, SizeStatus, StatusReport,
    UrlBuilder,
};
