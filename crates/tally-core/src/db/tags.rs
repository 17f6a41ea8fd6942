//! Tag and tag group operations

use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::{parse_datetime, Database, DbConn};
use crate::error::Result;
use crate::models::{NewTag, Tag};
use crate::store::TagStore;

const TAG_SELECT: &str = r#"
    SELECT t.id, t.uid, t.name, t.group_id, g.name, t.display_order, t.hidden, t.created_at
    FROM tags t
    LEFT JOIN tag_groups g ON g.id = t.group_id
"#;

fn tag_from_row(row: &Row) -> rusqlite::Result<Tag> {
    let created_at: String = row.get(7)?;

    Ok(Tag {
        id: row.get(0)?,
        uid: row.get(1)?,
        name: row.get(2)?,
        group_id: row.get(3)?,
        group_name: row.get(4)?,
        display_order: row.get(5)?,
        hidden: row.get(6)?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Find a tag group by name, creating it on first use
    fn get_or_create_tag_group(&self, conn: &DbConn, uid: i64, name: &str) -> Result<i64> {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM tag_groups WHERE uid = ? AND name = ?",
                params![uid, name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO tag_groups (uid, name) VALUES (?, ?)",
            params![uid, name],
        )?;
        let id = conn.last_insert_rowid();
        info!("Created tag group \"{}\" ({}) for uid {}", name, id, uid);
        Ok(id)
    }
}

impl TagStore for Database {
    fn max_tag_display_order(&self, uid: i64) -> Result<i64> {
        let conn = self.conn()?;
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(display_order), 0) FROM tags WHERE uid = ?",
            params![uid],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn create_tag(&self, uid: i64, tag: &NewTag) -> Result<Tag> {
        let conn = self.conn()?;

        let group_id = match tag.group_name.as_deref().map(str::trim) {
            Some(group) if !group.is_empty() => {
                Some(self.get_or_create_tag_group(&conn, uid, group)?)
            }
            _ => None,
        };

        conn.execute(
            "INSERT INTO tags (uid, name, group_id, display_order) VALUES (?, ?, ?, ?)",
            params![uid, tag.name, group_id, tag.display_order],
        )?;
        let id = conn.last_insert_rowid();

        let created = conn.query_row(
            &format!("{} WHERE t.id = ?", TAG_SELECT),
            params![id],
            tag_from_row,
        )?;
        Ok(created)
    }

    fn list_tags(&self, uid: i64) -> Result<Vec<Tag>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE t.uid = ? ORDER BY t.display_order, t.id",
            TAG_SELECT
        ))?;

        let tags = stmt
            .query_map(params![uid], tag_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tags)
    }
}
