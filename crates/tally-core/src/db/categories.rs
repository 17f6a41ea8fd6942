//! Category operations

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Category, CategoryType, NewCategory};
use crate::store::CategoryStore;

const CATEGORY_COLUMNS: &str =
    "id, uid, name, category_type, parent_id, icon, color, display_order, hidden, created_at";

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    let category_type: String = row.get(3)?;
    let created_at: String = row.get(9)?;

    Ok(Category {
        id: row.get(0)?,
        uid: row.get(1)?,
        name: row.get(2)?,
        category_type: category_type.parse().unwrap_or(CategoryType::Expense),
        parent_id: row.get(4)?,
        icon: row.get(5)?,
        color: row.get(6)?,
        display_order: row.get(7)?,
        hidden: row.get(8)?,
        created_at: parse_datetime(&created_at),
    })
}

impl CategoryStore for Database {
    fn max_category_display_order(&self, uid: i64, category_type: CategoryType) -> Result<i64> {
        let conn = self.conn()?;
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(display_order), 0) FROM categories WHERE uid = ? AND category_type = ?",
            params![uid, category_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn create_category(&self, uid: i64, category: &NewCategory) -> Result<Category> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO categories (uid, name, category_type, parent_id, icon, color, display_order)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                uid,
                category.name,
                category.category_type.as_str(),
                category.parent_id,
                category.icon,
                category.color,
                category.display_order,
            ],
        )?;
        let id = conn.last_insert_rowid();

        let created = conn.query_row(
            &format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS),
            params![id],
            category_from_row,
        )?;
        Ok(created)
    }

    /// Parents come before their children within each type
    fn list_categories(&self, uid: i64) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM categories
            WHERE uid = ?
            ORDER BY category_type, parent_id IS NOT NULL, display_order, id
            "#,
            CATEGORY_COLUMNS
        ))?;

        let categories = stmt
            .query_map(params![uid], category_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(categories)
    }
}
