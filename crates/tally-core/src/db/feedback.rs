//! Prediction feedback operations (append-only)

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{NewPredictionFeedback, PredictionFeedback, PredictionType};
use crate::sources::FeedbackStore;

impl FeedbackStore for Database {
    fn record_feedback(&self, feedback: &NewPredictionFeedback) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO prediction_feedback (
                payee_id, prediction_type, original_value, corrected_value, rating
            ) VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                feedback.payee_id,
                feedback.prediction_type.as_str(),
                feedback.original_value,
                feedback.corrected_value,
                feedback.rating,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn list_feedback(
        &self,
        payee_id: i64,
        prediction_type: Option<PredictionType>,
    ) -> Result<Vec<PredictionFeedback>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, payee_id, prediction_type, original_value, corrected_value, rating, created_at
            FROM prediction_feedback
            WHERE payee_id = ?1 AND (?2 IS NULL OR prediction_type = ?2)
            ORDER BY created_at ASC, id ASC
            "#,
        )?;

        let feedback = stmt
            .query_map(
                params![payee_id, prediction_type.map(|t| t.as_str())],
                |row| {
                    let type_str: String = row.get(2)?;
                    let created_at_str: String = row.get(6)?;

                    Ok(PredictionFeedback {
                        id: row.get(0)?,
                        payee_id: row.get(1)?,
                        prediction_type: type_str
                            .parse()
                            .unwrap_or(PredictionType::NextTransaction),
                        original_value: row.get(3)?,
                        corrected_value: row.get(4)?,
                        rating: row.get(5)?,
                        created_at: parse_datetime(&created_at_str),
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(feedback)
    }
}
