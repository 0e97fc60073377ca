//! Subscription lifecycle log (append-only)

use rusqlite::params;

use super::{parse_date, parse_datetime, Database};
use crate::error::Result;
use crate::models::{LifecycleEvent, NewLifecycleEvent, SubscriptionStatus};
use crate::sources::LifecycleStore;

impl LifecycleStore for Database {
    fn append_event(&self, event: &NewLifecycleEvent) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO subscription_lifecycle_events (payee_id, status, date, note)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                event.payee_id,
                event.status.as_str(),
                event.date.to_string(),
                event.note,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn events(&self, payee_id: i64) -> Result<Vec<LifecycleEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, payee_id, status, date, note, created_at
            FROM subscription_lifecycle_events
            WHERE payee_id = ?
            ORDER BY date ASC, id ASC
            "#,
        )?;

        let events = stmt
            .query_map(params![payee_id], |row| {
                let status_str: String = row.get(2)?;
                let date_str: String = row.get(3)?;
                let created_at_str: String = row.get(5)?;

                Ok(LifecycleEvent {
                    id: row.get(0)?,
                    payee_id: row.get(1)?,
                    status: status_str.parse().unwrap_or(SubscriptionStatus::Active),
                    date: parse_date(&date_str)?,
                    note: row.get(4)?,
                    created_at: parse_datetime(&created_at_str),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }
}
