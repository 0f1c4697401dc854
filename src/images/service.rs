//! The reconciliation workflow.
//!
//! [`MediaService`] owns everything a request needs: the catalog pool, the
//! size resolver, the syncing store and the URL builder. It is built once
//! at startup and shared through the router state.
//!
//! Regenerating one size runs these steps in order:
//!
//! 1. ensure the original is present locally, pulling it if needed
//! 2. render the size from the original
//! 3. record it in both metadata views and persist the attachment once
//! 4. push the new file to the remote (skipped when the remote is disabled)
//! 5. delete the previous file for the size if its name changed
//!
//! Failures in steps 1, 2 and 4 end that size's attempt and are reported in
//! its status entry. Catalog failures are hard errors.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use mediamirror_common::paths::{is_image_file, join_key, key_dirname, mime_type_for};
use mediamirror_common::{AttachmentId, Error, Result, StorageLocation};
use mediamirror_db::models::{Attachment, NewAttachment};
use mediamirror_db::pool::{get_conn, DbPool};
use mediamirror_db::queries::attachments;
use mediamirror_storage::{LocalStore, StorageError, SyncingStore};
use serde::Serialize;

use super::error::SyncError;
use super::resolver::{Dimensions, SizeResolver};
use super::status::{
    build_report, size_status, GenerationState, GenerationStatus, SizeStatus, StatusReport, UrlBuilder,
};
use crate::config::ResolvedConfig;

/// Coordinates the catalog, the resize primitive and the two storage locations.
pub struct MediaService {
    pool: DbPool,
    resolver: SizeResolver,
    store: SyncingStore,
    urls: UrlBuilder,
    skip_matching: bool,
}

/// Result of regenerating one attachment during a library-wide run.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryEntry {
    pub id: AttachmentId,
    pub status: StatusReport,
}

/// A newly stored attachment and the sizes generated for it.
#[derive(Debug, Clone, Serialize)]
pub struct Ingested {
    pub attachment: Attachment,
    pub sizes: StatusReport,
}

/// Outcome of re-pushing an attachment's files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub remote_enabled: bool,
    pub pushed: Vec<String>,
    pub failed: Vec<TransferFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of deleting an attachment.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteSummary {
    pub id: AttachmentId,
    pub files: Vec<String>,
    pub warnings: Vec<String>,
}

enum Outcome {
    Done,
    Skipped,
}

enum StepError {
    Sync(SyncError),
    Catalog(Error),
}

impl From<SyncError> for StepError {
    fn from(e: SyncError) -> Self {
        Self::Sync(e)
    }
}

impl From<StorageError> for StepError {
    fn from(e: StorageError) -> Self {
        Self::Sync(e.into())
    }
}

impl MediaService {
    pub fn new(pool: DbPool, resolver: SizeResolver, store: SyncingStore, urls: UrlBuilder) -> Self {
        Self {
            pool,
            resolver,
            store,
            urls,
            skip_matching: false,
        }
    }

    /// Leave sizes alone that already match their preset and still exist.
    pub fn with_skip_matching(mut self, skip: bool) -> Self {
        self.skip_matching = skip;
        self
    }

    /// Build the service from resolved settings, connecting the remote provider.
    pub async fn from_config(resolved: &ResolvedConfig, pool: DbPool) -> Self {
        let config = resolved.config();
        let local = LocalStore::new(config.local.base_dir.clone());
        let store = SyncingStore::new(Arc::new(local), resolved.remote_state().await);

        Self::new(
            pool,
            SizeResolver::new(config.presets.clone()),
            store,
            UrlBuilder::from_config(resolved),
        )
        .with_skip_matching(config.generation.skip_matching)
    }

    pub fn resolver(&self) -> &SizeResolver {
        &self.resolver
    }

    pub fn store(&self) -> &SyncingStore {
        &self.store
    }

    pub fn urls(&self) -> &UrlBuilder {
        &self.urls
    }

    /// Fetch an attachment of any type.
    pub fn get(&self, id: AttachmentId) -> Result<Attachment> {
        let conn = get_conn(&self.pool)?;
        attachments::get_attachment(&conn, id)?
            .ok_or_else(|| Error::not_found(format!("Attachment {}", id)))
    }

    /// A page of attachments, most recent first.
    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<Attachment>> {
        let conn = get_conn(&self.pool)?;
        attachments::list_attachments(&conn, limit, offset)
    }

    fn get_image(&self, id: AttachmentId) -> Result<Attachment> {
        let attachment = self.get(id)?;
        if !attachment.is_image() {
            return Err(Error::invalid_input(format!(
                "Attachment {} is not an image ({})",
                id, attachment.mime_type
            )));
        }
        Ok(attachment)
    }

    fn save(&self, attachment: &Attachment) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        if !attachments::update_metadata(&conn, attachment)? {
            return Err(Error::not_found(format!("Attachment {}", attachment.id)));
        }
        Ok(())
    }

    /// Status of every configured size.
    pub fn status(&self, id: AttachmentId) -> Result<StatusReport> {
        let attachment = self.get_image(id)?;
        Ok(build_report(&attachment, &self.resolver, &self.urls))
    }

    /// Status of one size.
    pub fn size_status(&self, id: AttachmentId, name: &str) -> Result<SizeStatus> {
        let attachment = self.get_image(id)?;
        size_status(&attachment, &self.resolver, &self.urls, name)
            .ok_or_else(|| Error::not_found(format!("Size '{}' is not defined", name)))
    }

    /// Regenerate one size and report its status with the attempt's outcome.
    pub async fn regenerate_size(&self, id: AttachmentId, name: &str) -> Result<SizeStatus> {
        if self.resolver.preset(name).is_none() {
            return Err(Error::not_found(format!("Size '{}' is not defined", name)));
        }
        let mut attachment = self.get_image(id)?;

        let generation = if self.resolver.can_generate(original_dimensions(&attachment), name) {
            self.reconcile(&mut attachment, name).await?
        } else {
            GenerationStatus::failed(
                &SyncError::generation(format!(
                    "original {}x{} is smaller than size '{}'",
                    attachment.original_width().unwrap_or(0),
                    attachment.original_height().unwrap_or(0),
                    name
                )),
                Vec::new(),
            )
        };

        let mut status = size_status(&attachment, &self.resolver, &self.urls, name)
            .ok_or_else(|| Error::not_found(format!("Size '{}' is not defined", name)))?;
        status.generation = Some(generation);
        Ok(status)
    }

    /// Regenerate every size that can be derived from the original.
    ///
    /// Sizes that cannot be generated are left untouched and reported as-is.
    pub async fn regenerate_all(&self, id: AttachmentId) -> Result<StatusReport> {
        let mut attachment = self.get_image(id)?;
        self.regenerate_loaded(&mut attachment).await
    }

    async fn regenerate_loaded(&self, attachment: &mut Attachment) -> Result<StatusReport> {
        let names: Vec<String> = self.resolver.presets().iter().map(|p| p.name.clone()).collect();
        let original = original_dimensions(attachment);

        let mut report = StatusReport::new();
        for name in names {
            let generation = if self.resolver.can_generate(original, &name) {
                Some(self.reconcile(attachment, &name).await?)
            } else {
                tracing::debug!(attachment_id = %attachment.id, size = %name, "Original too small, size left untouched");
                None
            };

            if let Some(mut status) = size_status(attachment, &self.resolver, &self.urls, &name) {
                status.generation = generation;
                report.insert(name, status);
            }
        }
        Ok(report)
    }

    /// Regenerate every image attachment in the catalog, in catalog order.
    pub async fn regenerate_library(&self) -> Result<Vec<LibraryEntry>> {
        let ids = {
            let conn = get_conn(&self.pool)?;
            attachments::list_ids_by_mime_prefix(&conn, "image/")?
        };
        tracing::info!(count = ids.len(), "Regenerating all image attachments");

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            match self.regenerate_all(id).await {
                Ok(status) => entries.push(LibraryEntry { id, status }),
                Err(Error::NotFound(_)) => {
                    tracing::debug!(attachment_id = %id, "Attachment removed during regeneration");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    /// Run the workflow for one size, turning domain failures into a status.
    async fn reconcile(&self, attachment: &mut Attachment, name: &str) -> Result<GenerationStatus> {
        let mut warnings = Vec::new();
        match self.run_steps(attachment, name, &mut warnings).await {
            Ok(Outcome::Done) => {
                tracing::info!(attachment_id = %attachment.id, size = name, "Size regenerated");
                Ok(GenerationStatus::done(warnings))
            }
            Ok(Outcome::Skipped) => {
                tracing::debug!(attachment_id = %attachment.id, size = name, "Size matches preset, skipped");
                Ok(GenerationStatus::skipped())
            }
            Err(StepError::Sync(e)) => {
                tracing::warn!(attachment_id = %attachment.id, size = name, error = %e, "Size regeneration failed");
                Ok(GenerationStatus::failed(&e, warnings))
            }
            Err(StepError::Catalog(e)) => Err(e),
        }
    }

    async fn run_steps(
        &self,
        attachment: &mut Attachment,
        name: &str,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<Outcome, StepError> {
        let original_key = attachment.file.clone();
        let previous = attachment.generated(name);

        if self.skip_matching && self.is_current(attachment, name).await {
            return Ok(Outcome::Skipped);
        }

        // Ensure the original is local
        if !self.store.has(StorageLocation::Local, &original_key).await {
            if !self.store.remote_enabled() {
                return Err(SyncError::SourceUnavailable { path: original_key }.into());
            }
            if let Err(e) = self.store.pull(&original_key).await {
                tracing::warn!(attachment_id = %attachment.id, path = %original_key, error = %e, "Pull of original failed");
                warnings.push(e.to_string());
                return Err(SyncError::SourceUnavailable { path: original_key }.into());
            }
            if !self.store.has(StorageLocation::Local, &original_key).await {
                return Err(SyncError::SourceUnavailable { path: original_key }.into());
            }
        }

        // Generate
        let data = self
            .store
            .read(StorageLocation::Local, &original_key)
            .await
            .map_err(|e| SyncError::generation(format!("failed to read {}: {}", original_key, e)))?;
        let rendered = self.resolver.generate(&original_key, data, name).await?;
        let new_key = join_key(key_dirname(&original_key), &rendered.size.file);
        self.store
            .write(StorageLocation::Local, &new_key, rendered.data)
            .await
            .map_err(|e| SyncError::generation(format!("failed to write {}: {}", new_key, e)))?;

        // Record in both metadata views
        attachment.record_generated(&rendered.size);
        self.save(attachment).map_err(StepError::Catalog)?;

        // Propagate
        if self.store.remote_enabled() {
            self.store.push(&new_key).await?;
        }

        // Clean up the previous file if the name changed and nothing else uses it
        if let Some(previous) = previous {
            let old_key = join_key(key_dirname(&original_key), &previous.file);
            if old_key != new_key && !attachment.all_keys().contains(&old_key) {
                for location in [StorageLocation::Local, StorageLocation::Remote] {
                    if !self.store.delete(location, &old_key).await {
                        warnings.push(format!("could not delete stale {} copy of {}", location, old_key));
                    }
                }
                tracing::debug!(attachment_id = %attachment.id, size = name, path = %old_key, "Removed stale size");
            }
        }

        Ok(Outcome::Done)
    }

    /// Whether size `name` matches its preset and its file exists somewhere.
    async fn is_current(&self, attachment: &Attachment, name: &str) -> bool {
        let generated = attachment.generated(name);
        if self.resolver.is_mismatched(generated.as_ref(), name) != Some(false) {
            return false;
        }
        let Some(key) = attachment.size_key(name) else {
            return false;
        };
        self.store.has(StorageLocation::Local, &key).await
            || (self.store.remote_enabled() && self.store.has(StorageLocation::Remote, &key).await)
    }

    /// Store a new upload under `YYYY/MM/`, generate its sizes and mirror it.
    pub async fn ingest(&self, file_name: &str, data: Bytes) -> Result<Ingested> {
        let file_name = sanitize_file_name(file_name)?;
        if data.is_empty() {
            return Err(Error::invalid_input("Upload is empty"));
        }

        let mime_type = mime_type_for(Path::new(&file_name));
        let dimensions = if is_image_file(Path::new(&file_name)) {
            Some(decode_dimensions(data.clone()).await?)
        } else {
            None
        };

        let dir = Utc::now().format("%Y/%m").to_string();
        let key = self.unique_key(&dir, &file_name).await?;

        self.store
            .write(StorageLocation::Local, &key, data)
            .await
            .map_err(|e| Error::internal(format!("Failed to store {}: {}", key, e)))?;

        let new = match dimensions {
            Some(d) => NewAttachment::image(&key, mime_type, d.width, d.height),
            None => NewAttachment::file(&key, mime_type),
        };
        let mut attachment = {
            let conn = get_conn(&self.pool)?;
            attachments::insert_attachment(&conn, &new)?
        };
        tracing::info!(attachment_id = %attachment.id, path = %key, "Stored upload");

        let sizes = if attachment.is_image() {
            self.regenerate_loaded(&mut attachment).await?
        } else {
            StatusReport::new()
        };

        if self.store.remote_enabled() {
            // Shadow lists only what reached the remote alongside its original
            attachment.reset_shadow();
            match self.store.push(&key).await {
                Ok(()) => {
                    for (name, status) in &sizes {
                        let pushed = status
                            .generation
                            .as_ref()
                            .is_some_and(|g| g.state == GenerationState::Done);
                        if !pushed {
                            continue;
                        }
                        if let Some(size) = attachment.generated(name) {
                            attachment.record_mirrored(name, size.width, size.height);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(attachment_id = %attachment.id, path = %key, error = %e, "Push of original failed");
                }
            }
            self.save(&attachment)?;
        }

        Ok(Ingested {
            attachment: self.get(attachment.id)?,
            sizes,
        })
    }

    /// Ingest a file from the local filesystem.
    pub async fn import(&self, path: &Path) -> Result<Ingested> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::invalid_input(format!("Not a file path: {}", path.display())))?;
        let data = tokio::fs::read(path).await?;
        self.ingest(file_name, Bytes::from(data)).await
    }

    async fn unique_key(&self, dir: &str, file_name: &str) -> Result<String> {
        let path = Path::new(file_name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
        let ext = path.extension().and_then(|e| e.to_str());

        let mut candidate = join_key(dir, file_name);
        let mut n = 1;
        loop {
            let in_catalog = {
                let conn = get_conn(&self.pool)?;
                attachments::get_attachment_by_file(&conn, &candidate)?.is_some()
            };
            if !in_catalog && !self.store.has(StorageLocation::Local, &candidate).await {
                return Ok(candidate);
            }

            let numbered = match ext {
                Some(ext) => format!("{}-{}.{}", stem, n, ext),
                None => format!("{}-{}", stem, n),
            };
            candidate = join_key(dir, &numbered);
            n += 1;
        }
    }

    /// Push the original and every size present locally to the remote.
    ///
    /// The shadow record is rebuilt from the sizes that were pushed. If the
    /// original cannot be pushed nothing else is attempted.
    pub async fn sync_attachment(&self, id: AttachmentId) -> Result<SyncSummary> {
        let mut attachment = self.get(id)?;
        if !self.store.remote_enabled() {
            return Ok(SyncSummary::default());
        }

        let mut summary = SyncSummary {
            remote_enabled: true,
            ..SyncSummary::default()
        };

        let original_key = attachment.file.clone();
        if !self.push_reporting(&original_key, &mut summary).await {
            return Ok(summary);
        }

        attachment.reset_shadow();
        for size in attachment.generated_sizes() {
            let key = join_key(key_dirname(&original_key), &size.file);
            if !self.store.has(StorageLocation::Local, &key).await {
                summary.failed.push(TransferFailure {
                    path: key,
                    error: "not present locally".to_string(),
                });
                continue;
            }
            if self.push_reporting(&key, &mut summary).await {
                attachment.record_mirrored(&size.name, size.width, size.height);
            }
        }

        self.save(&attachment)?;
        tracing::info!(
            attachment_id = %id,
            pushed = summary.pushed.len(),
            failed = summary.failed.len(),
            "Attachment synced"
        );
        Ok(summary)
    }

    async fn push_reporting(&self, key: &str, summary: &mut SyncSummary) -> bool {
        match self.store.push(key).await {
            Ok(()) => {
                summary.pushed.push(key.to_string());
                true
            }
            Err(e) => {
                tracing::warn!(path = key, error = %e, "Push failed");
                summary.failed.push(TransferFailure {
                    path: key.to_string(),
                    error: SyncError::from(e).to_string(),
                });
                false
            }
        }
    }

    /// Delete the original and every size from both locations, then the catalog row.
    ///
    /// Files that are already gone are fine. Files that could not be deleted
    /// are reported as warnings and do not keep the row alive.
    pub async fn delete_attachment(&self, id: AttachmentId) -> Result<DeleteSummary> {
        let attachment = self.get(id)?;
        let files = attachment.all_keys();

        let mut warnings = Vec::new();
        for key in &files {
            for location in [StorageLocation::Local, StorageLocation::Remote] {
                if !self.store.delete(location, key).await {
                    warnings.push(format!("could not delete {} copy of {}", location, key));
                }
            }
        }

        {
            let conn = get_conn(&self.pool)?;
            attachments::delete_attachment(&conn, id)?;
        }
        tracing::info!(attachment_id = %id, files = files.len(), "Attachment deleted");

        Ok(DeleteSummary { id, files, warnings })
    }
}

fn original_dimensions(attachment: &Attachment) -> Dimensions {
    Dimensions::new(
        attachment.original_width().unwrap_or(0),
        attachment.original_height().unwrap_or(0),
    )
}

fn sanitize_file_name(name: &str) -> Result<String> {
    let base = Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return Err(Error::invalid_input(format!("Invalid file name: {:?}", name)));
    }
    Ok(cleaned.to_string())
}

async fn decode_dimensions(data: Bytes) -> Result<Dimensions> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&data)
            .map(|img| Dimensions::new(img.width(), img.height()))
            .map_err(|e| Error::invalid_input(format!("Not a readable image: {}", e)))
    })
    .await
    .map_err(|e| Error::internal(format!("Decode task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("My Cat.jpg").unwrap(), "My-Cat.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("a+b.png").unwrap(), "a+b.png");
        assert!(sanitize_file_name("...").is_err());
        assert!(sanitize_file_name("").is_err());
    }
}
