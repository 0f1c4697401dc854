//! Attachment catalog queries.
//!
//! CRUD operations for attachments. Both metadata views are written in the
//! same statement so a row never carries a native record without its shadow.

use chrono::Utc;
use mediamirror_common::{AttachmentId, Error, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};

use crate::models::{Attachment, NativeMetadata, NewAttachment, ShadowMetadata};

const SELECT_COLUMNS: &str =
    "id, file, mime_type, title, metadata, shadow_metadata, created_at, updated_at";

fn json_column<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse an attachment from a database row.
///
/// Expects columns in the order of `SELECT_COLUMNS`.
fn parse_attachment_row(row: &rusqlite::Row) -> rusqlite::Result<Attachment> {
    let metadata: String = row.get(4)?;
    let shadow: Option<String> = row.get(5)?;

    Ok(Attachment {
        id: AttachmentId::from(row.get::<_, i64>(0)?),
        file: row.get(1)?,
        mime_type: row.get(2)?,
        title: row.get(3)?,
        metadata: json_column::<NativeMetadata>(4, &metadata)?,
        shadow: match shadow {
            Some(raw) => json_column::<ShadowMetadata>(5, &raw)?,
            None => ShadowMetadata::default(),
        },
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Insert a new attachment.
///
/// # Returns
///
/// * `Ok(Attachment)` - The stored attachment with its assigned ID
/// * `Err(Error)` - If the file key is already catalogued or a database error occurs
pub fn insert_attachment(conn: &Connection, new: &NewAttachment) -> Result<Attachment> {
    let now = Utc::now().to_rfc3339();
    let metadata = serde_json::to_string(&new.metadata)?;

    conn.execute(
        "INSERT INTO attachments (file, mime_type, title, metadata, created_at, updated_at)
         VALUES (:file, :mime_type, :title, :metadata, :now, :now)",
        rusqlite::named_params! {
            ":file": &new.file,
            ":mime_type": &new.mime_type,
            ":title": &new.title,
            ":metadata": metadata,
            ":now": now,
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let id = AttachmentId::from(conn.last_insert_rowid());
    get_attachment(conn, id)?
        .ok_or_else(|| Error::internal(format!("Attachment {} vanished after insert", id)))
}

/// Get an attachment by ID.
///
/// # Returns
///
/// * `Ok(Some(Attachment))` - The attachment if found
/// * `Ok(None)` - If the attachment does not exist
/// * `Err(Error)` - If a database error occurs
pub fn get_attachment(conn: &Connection, id: AttachmentId) -> Result<Option<Attachment>> {
    conn.query_row(
        &format!("SELECT {} FROM attachments WHERE id = :id", SELECT_COLUMNS),
        rusqlite::named_params! { ":id": id.get() },
        parse_attachment_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Get an attachment by its original file key.
pub fn get_attachment_by_file(conn: &Connection, file: &str) -> Result<Option<Attachment>> {
    conn.query_row(
        &format!("SELECT {} FROM attachments WHERE file = :file", SELECT_COLUMNS),
        rusqlite::named_params! { ":file": file },
        parse_attachment_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// List IDs of attachments whose MIME type starts with `prefix`, in ID order.
///
/// Used by library-wide regeneration with the prefix `image/`.
pub fn list_ids_by_mime_prefix(conn: &Connection, prefix: &str) -> Result<Vec<AttachmentId>> {
    let mut stmt = conn
        .prepare("SELECT id FROM attachments WHERE mime_type LIKE :pattern ESCAPE '\\' ORDER BY id")
        .map_err(|e| Error::database(e.to_string()))?;

    let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
    let ids = stmt
        .query_map(rusqlite::named_params! { ":pattern": pattern }, |row| {
            row.get::<_, i64>(0).map(AttachmentId::from)
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(ids)
}

/// List all attachments, most recent first.
pub fn list_attachments(conn: &Connection, limit: u32, offset: u32) -> Result<Vec<Attachment>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM attachments ORDER BY id DESC LIMIT :limit OFFSET :offset",
            SELECT_COLUMNS
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let attachments = stmt
        .query_map(
            rusqlite::named_params! { ":limit": limit, ":offset": offset },
            parse_attachment_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(attachments)
}

/// Persist both metadata views of an attachment.
///
/// Last writer wins: there is no version check against concurrent updates.
///
/// # Returns
///
/// * `Ok(true)` - If the row was updated
/// * `Ok(false)` - If the attachment no longer exists
pub fn update_metadata(conn: &Connection, attachment: &Attachment) -> Result<bool> {
    let metadata = serde_json::to_string(&attachment.metadata)?;
    let shadow = serde_json::to_string(&attachment.shadow)?;

    let rows = conn
        .execute(
            "UPDATE attachments
             SET metadata = :metadata, shadow_metadata = :shadow, updated_at = :now
             WHERE id = :id",
            rusqlite::named_params! {
                ":metadata": metadata,
                ":shadow": shadow,
                ":now": Utc::now().to_rfc3339(),
                ":id": attachment.id.get(),
            },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows > 0)
}

/// Delete an attachment by ID.
///
/// # Returns
///
/// * `Ok(true)` - If the attachment was deleted
/// * `Ok(false)` - If the attachment did not exist
pub fn delete_attachment(conn: &Connection, id: AttachmentId) -> Result<bool> {
    let rows = conn
        .execute(
            "DELETE FROM attachments WHERE id = :id",
            rusqlite::named_params! { ":id": id.get() },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeneratedSize;
    use crate::pool::{get_conn, init_memory_pool};

    #[test]
    fn test_insert_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let created = insert_attachment(
            &conn,
            &NewAttachment::image("2024/05/cat.jpg", "image/jpeg", 800, 600),
        )
        .unwrap();

        let fetched = get_attachment(&conn, created.id).unwrap().unwrap();
        assert_eq!(fetched.file, "2024/05/cat.jpg");
        assert_eq!(fetched.original_width(), Some(800));
        assert_eq!(fetched.original_height(), Some(600));
        assert!(fetched.shadow.sizes.is_empty());
    }

    #[test]
    fn test_get_missing_returns_none() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        assert!(get_attachment(&conn, AttachmentId::from(99)).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_file_rejected() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let new = NewAttachment::image("a.png", "image/png", 10, 10);
        insert_attachment(&conn, &new).unwrap();
        assert!(matches!(
            insert_attachment(&conn, &new),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn test_update_metadata_persists_both_views() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let mut attachment = insert_attachment(
            &conn,
            &NewAttachment::image("2024/05/cat.jpg", "image/jpeg", 800, 600),
        )
        .unwrap();
        attachment.record_generated(&GeneratedSize {
            name: "thumbnail".into(),
            file: "cat-150x150.jpg".into(),
            width: 150,
            height: 150,
            mime_type: Some("image/jpeg".into()),
        });
        assert!(update_metadata(&conn, &attachment).unwrap());

        let fetched = get_attachment(&conn, attachment.id).unwrap().unwrap();
        assert_eq!(fetched.metadata.sizes["thumbnail"].width, 150);
        assert_eq!(fetched.shadow.sizes["thumbnail"].height, 150);
        assert_eq!(
            get_attachment_by_file(&conn, "2024/05/cat.jpg")
                .unwrap()
                .unwrap()
                .id,
            attachment.id
        );
    }

    #[test]
    fn test_list_ids_by_mime_prefix() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let a = insert_attachment(&conn, &NewAttachment::image("a.jpg", "image/jpeg", 1, 1)).unwrap();
        insert_attachment(&conn, &NewAttachment::file("b.pdf", "application/pdf")).unwrap();
        let c = insert_attachment(&conn, &NewAttachment::image("c.png", "image/png", 1, 1)).unwrap();

        let ids = list_ids_by_mime_prefix(&conn, "image/").unwrap();
        assert_eq!(ids, vec![a.id, c.id]);
        assert_eq!(list_attachments(&conn, 10, 0).unwrap().len(), 3);
    }

    #[test]
    fn test_delete_attachment() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let a = insert_attachment(&conn, &NewAttachment::image("a.jpg", "image/jpeg", 1, 1)).unwrap();
        assert!(delete_attachment(&conn, a.id).unwrap());
        assert!(!delete_attachment(&conn, a.id).unwrap());
        assert!(get_attachment(&conn, a.id).unwrap().is_none());
    }
}
