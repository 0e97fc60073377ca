//! Payee and category operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Category, CategoryType, Payee, SubscriptionMetadata};
use crate::sources::{CategorySource, PayeeSource};

const PAYEE_COLUMNS: &str =
    "id, name, default_category_id, is_subscription, subscription_metadata, created_at";

fn payee_from_row(row: &Row<'_>) -> rusqlite::Result<Payee> {
    let metadata_json: Option<String> = row.get(4)?;
    let created_at_str: String = row.get(5)?;

    Ok(Payee {
        id: row.get(0)?,
        name: row.get(1)?,
        default_category_id: row.get(2)?,
        is_subscription: row.get(3)?,
        subscription: metadata_json.and_then(|j| serde_json::from_str(&j).ok()),
        created_at: parse_datetime(&created_at_str),
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let type_str: String = row.get(2)?;
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        category_type: type_str.parse().unwrap_or(CategoryType::Expense),
    })
}

impl Database {
    /// Create a payee, returning its ID
    pub fn create_payee(&self, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("payee name must not be empty".into()));
        }

        let conn = self.conn()?;
        conn.execute("INSERT INTO payees (name) VALUES (?)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    /// Look up a payee by exact name (case-insensitive)
    pub fn get_payee_by_name(&self, name: &str) -> Result<Option<Payee>> {
        let conn = self.conn()?;
        let payee = conn
            .query_row(
                &format!(
                    "SELECT {} FROM payees WHERE name = ? COLLATE NOCASE",
                    PAYEE_COLUMNS
                ),
                params![name.trim()],
                payee_from_row,
            )
            .optional()?;
        Ok(payee)
    }

    /// Set or clear a payee's default category
    pub fn set_default_category(&self, payee_id: i64, category_id: Option<i64>) -> Result<()> {
        if let Some(id) = category_id {
            if !self.exists(id)? {
                return Err(Error::NotFound(format!("category {}", id)));
            }
        }

        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE payees SET default_category_id = ? WHERE id = ?",
            params![category_id, payee_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("payee {}", payee_id)));
        }
        Ok(())
    }

    /// Flag a payee as a confirmed subscription, optionally storing its metadata
    pub fn mark_subscription(
        &self,
        payee_id: i64,
        metadata: Option<&SubscriptionMetadata>,
    ) -> Result<()> {
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;

        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE payees SET is_subscription = 1, subscription_metadata = ? WHERE id = ?",
            params![metadata_json, payee_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("payee {}", payee_id)));
        }
        Ok(())
    }

    /// Create a category, returning its ID
    pub fn create_category(&self, name: &str, category_type: CategoryType) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("category name must not be empty".into()));
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (name, category_type) VALUES (?, ?)",
            params![name, category_type.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, category_type FROM categories ORDER BY name")?;
        let categories = stmt
            .query_map([], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }
}

impl PayeeSource for Database {
    fn payee(&self, payee_id: i64) -> Result<Option<Payee>> {
        let conn = self.conn()?;
        let payee = conn
            .query_row(
                &format!("SELECT {} FROM payees WHERE id = ?", PAYEE_COLUMNS),
                params![payee_id],
                payee_from_row,
            )
            .optional()?;
        Ok(payee)
    }

    fn list_payees(&self) -> Result<Vec<Payee>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM payees ORDER BY id", PAYEE_COLUMNS))?;
        let payees = stmt
            .query_map([], payee_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(payees)
    }
}

impl CategorySource for Database {
    fn exists(&self, category_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?)",
            params![category_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn category(&self, category_id: i64) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT id, name, category_type FROM categories WHERE id = ?",
                params![category_id],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }
}
