//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, load_config, lookups)
//! - `payees` - Payee, category and transaction bookkeeping
//! - `intelligence` - Analyze, predict, budget, profile and feedback commands
//! - `categories` - Category learning commands (correct, recommend, drift, suggest)
//! - `subscriptions` - Subscription detection and lifecycle commands

pub mod categories;
pub mod core;
pub mod intelligence;
pub mod payees;
pub mod subscriptions;

// Re-export command functions for main.rs
pub use categories::*;
pub use core::*;
pub use intelligence::*;
pub use payees::*;
pub use subscriptions::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Render a 0-1 score as a percentage
pub fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}
