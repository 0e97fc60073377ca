//! Intelligence profile storage

use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::Result;
use crate::models::IntelligenceProfile;
use crate::sources::ProfileStore;

impl ProfileStore for Database {
    fn get(&self, payee_id: i64) -> Result<Option<IntelligenceProfile>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT profile FROM intelligence_profiles WHERE payee_id = ?",
                params![payee_id],
                |row| row.get(0),
            )
            .optional()?;

        // Unknown keys are ignored and omitted ones default, so stored JSON stays readable
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    fn put(&self, payee_id: i64, profile: &IntelligenceProfile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO intelligence_profiles (payee_id, profile, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(payee_id) DO UPDATE SET
                profile = excluded.profile,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![payee_id, json],
        )?;
        Ok(())
    }
}
