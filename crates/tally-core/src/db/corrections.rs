//! Category correction log (append-only)

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{CategoryCorrection, NewCategoryCorrection, TemporalContext};
use crate::sources::CorrectionStore;

impl CorrectionStore for Database {
    fn append(
        &self,
        correction: &NewCategoryCorrection,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let temporal_json = correction
            .transaction_date
            .map(|d| serde_json::to_string(&TemporalContext::from_date(d)))
            .transpose()?;
        let created_at = format_datetime(recorded_at.unwrap_or_else(Utc::now));

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO category_corrections (
                payee_id, from_category_id, to_category_id, user_confidence,
                correction_trigger, transaction_amount, temporal_context, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                correction.payee_id,
                correction.from_category_id,
                correction.to_category_id,
                correction.user_confidence,
                correction.trigger.as_str(),
                correction.transaction_amount,
                temporal_json,
                created_at,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, payee_id: i64) -> Result<Vec<CategoryCorrection>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, payee_id, from_category_id, to_category_id, user_confidence,
                   created_at, correction_trigger, transaction_amount, temporal_context
            FROM category_corrections
            WHERE payee_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )?;

        let corrections = stmt
            .query_map(params![payee_id], |row| {
                let created_at_str: String = row.get(5)?;
                let trigger_str: String = row.get(6)?;
                let temporal_json: Option<String> = row.get(8)?;

                Ok(CategoryCorrection {
                    id: row.get(0)?,
                    payee_id: row.get(1)?,
                    from_category_id: row.get(2)?,
                    to_category_id: row.get(3)?,
                    user_confidence: row.get(4)?,
                    created_at: parse_datetime(&created_at_str),
                    trigger: trigger_str.parse().unwrap_or_default(),
                    transaction_amount: row.get(7)?,
                    temporal_context: temporal_json.and_then(|j| serde_json::from_str(&j).ok()),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(corrections)
    }

    fn qualifying_payees(&self, min_corrections: usize, since: DateTime<Utc>) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT payee_id
            FROM category_corrections
            WHERE created_at >= ?
            GROUP BY payee_id
            HAVING COUNT(*) >= ?
            ORDER BY payee_id
            "#,
        )?;

        let min = i64::try_from(min_corrections).unwrap_or(i64::MAX);
        let payees = stmt
            .query_map(params![format_datetime(since), min], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        Ok(payees)
    }
}
