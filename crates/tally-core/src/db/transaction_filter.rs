//! Filter builder translating an intelligence profile into SQL
//!
//! Every dimension of [`IntelligenceFilters`] becomes one WHERE condition, so
//! the database returns exactly the transactions `IntelligenceFilters::matches`
//! would accept.

use chrono::NaiveDate;

use crate::models::{AmountSign, IntelligenceFilters};

/// Stored amount with NULL and non-finite values read as 0
///
/// SQLite stores NaN as NULL; infinities fall outside the finite range.
pub const SANITIZED_AMOUNT: &str = "CASE WHEN t.amount BETWEEN -1.7976931348623157e308 AND 1.7976931348623157e308 THEN t.amount ELSE 0 END";

/// Builder for a payee's filtered transaction query
///
/// The lifetime `'query` is how long the borrowed filters must remain valid.
pub struct ProfileFilter<'query> {
    payee_id: i64,
    filters: &'query IntelligenceFilters,
    as_of: NaiveDate,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// JOIN clause (empty string if no joins needed)
    pub join_clause: &'static str,
    /// WHERE clause including "WHERE" keyword
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: &'static str,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl<'query> ProfileFilter<'query> {
    pub fn new(payee_id: i64, filters: &'query IntelligenceFilters, as_of: NaiveDate) -> Self {
        Self {
            payee_id,
            filters,
            as_of,
        }
    }

    /// Build the filter components
    pub fn build(self) -> FilterResult {
        let filters = self.filters;
        let mut conditions = vec!["t.payee_id = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(self.payee_id)];

        // Category type filter (uncategorized transactions never match a non-empty list)
        let join_clause = if filters.category_types.is_empty() {
            ""
        } else {
            let placeholders: Vec<&str> = filters.category_types.iter().map(|_| "?").collect();
            conditions.push(format!("c.category_type IN ({})", placeholders.join(", ")));
            for kind in &filters.category_types {
                params.push(Box::new(kind.as_str()));
            }
            "JOIN categories c ON t.category_id = c.id"
        };

        match filters.amount_sign {
            AmountSign::All => {}
            AmountSign::Positive => conditions.push(format!("({}) > 0", SANITIZED_AMOUNT)),
            AmountSign::Negative => conditions.push(format!("({}) < 0", SANITIZED_AMOUNT)),
        }

        // Relative date ranges are bounded on both sides by as_of
        if let Some(start) = filters.date_range.start_date(self.as_of) {
            conditions.push("t.date >= ? AND t.date <= ?".to_string());
            params.push(Box::new(start.to_string()));
            params.push(Box::new(self.as_of.to_string()));
        }

        if filters.exclude_transfers {
            conditions.push("t.is_transfer = 0".to_string());
        }

        if let Some(min) = filters.min_amount {
            conditions.push(format!("ABS({}) >= ?", SANITIZED_AMOUNT));
            params.push(Box::new(min));
        }
        if let Some(max) = filters.max_amount {
            conditions.push(format!("ABS({}) <= ?", SANITIZED_AMOUNT));
            params.push(Box::new(max));
        }

        FilterResult {
            join_clause,
            where_clause: format!("WHERE {}", conditions.join(" AND ")),
            order_clause: "ORDER BY t.date ASC, t.id ASC",
            params,
        }
    }
}

impl FilterResult {
    /// Build the SELECT for `Transaction` rows
    pub fn build_select_query(&self) -> String {
        format!(
            "SELECT t.id, t.payee_id, t.date, {}, t.category_id, t.is_transfer \
             FROM transactions t {} {} {}",
            SANITIZED_AMOUNT, self.join_clause, self.where_clause, self.order_clause
        )
    }

    /// Build a COUNT query
    pub fn build_count_query(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM transactions t {} {}",
            self.join_clause, self.where_clause
        )
    }

    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}
