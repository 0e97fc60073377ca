//! Transaction operations

use chrono::NaiveDate;
use rusqlite::params;
use tracing::debug;

use super::transaction_filter::ProfileFilter;
use super::{parse_date, Database};
use crate::error::{Error, Result};
use crate::models::{IntelligenceFilters, NewTransaction, Transaction};
use crate::sources::TransactionSource;

impl Database {
    /// Insert a transaction for an existing payee
    ///
    /// The raw amount is stored as given (NULL when missing); it is sanitized on read.
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        let conn = self.conn()?;

        let payee_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM payees WHERE id = ?)",
            params![tx.payee_id],
            |row| row.get(0),
        )?;
        if !payee_exists {
            return Err(Error::NotFound(format!("payee {}", tx.payee_id)));
        }
        if let Some(category_id) = tx.category_id {
            let category_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?)",
                params![category_id],
                |row| row.get(0),
            )?;
            if !category_exists {
                return Err(Error::NotFound(format!("category {}", category_id)));
            }
        }

        conn.execute(
            r#"
            INSERT INTO transactions (payee_id, date, amount, category_id, is_transfer)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                tx.payee_id,
                tx.date.to_string(),
                tx.amount,
                tx.category_id,
                tx.is_transfer,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Count the transactions a filter set would feed the analyzers
    pub fn count_transactions(
        &self,
        payee_id: i64,
        filters: &IntelligenceFilters,
        as_of: NaiveDate,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let filter = ProfileFilter::new(payee_id, filters, as_of).build();
        let count = conn.query_row(
            &filter.build_count_query(),
            filter.params_refs().as_slice(),
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl TransactionSource for Database {
    fn query(
        &self,
        payee_id: i64,
        filters: &IntelligenceFilters,
        as_of: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let filter = ProfileFilter::new(payee_id, filters, as_of).build();

        let mut stmt = conn.prepare(&filter.build_select_query())?;
        let transactions = stmt
            .query_map(filter.params_refs().as_slice(), |row| {
                let date_str: String = row.get(2)?;
                let amount: Option<f64> = row.get(3)?;
                let mut tx = Transaction::new(row.get(0)?, row.get(1)?, parse_date(&date_str)?, amount);
                tx.category_id = row.get(4)?;
                tx.is_transfer = row.get(5)?;
                Ok(tx)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(payee_id, count = transactions.len(), "Queried payee transactions");
        Ok(transactions)
    }
}
