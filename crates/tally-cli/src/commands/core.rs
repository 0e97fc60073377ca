//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Engine config resolution
//! - `cmd_init` - Initialize the database
//! - Payee, category and date argument lookups

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use tally_core::config::EngineConfig;
use tally_core::db::Database;
use tally_core::models::{Category, Payee};
use tally_core::sources::PayeeSource;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Engine config from --config, else the override file, else built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    };
    config.context("Failed to load engine config")
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    if db.is_encrypted()? {
        println!("   🔒 Encryption: ENABLED");
    } else {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add categories:   tally categories add Groceries");
    println!("  2. Add transactions: tally transactions add \"Netflix\" -15.99 --date 2024-01-15");
    println!("  3. Analyze a payee:  tally analyze Netflix");

    Ok(())
}

/// Find a payee by ID or case-insensitive name
pub fn resolve_payee(db: &Database, name_or_id: &str) -> Result<Payee> {
    if let Ok(id) = name_or_id.parse::<i64>() {
        if let Some(payee) = db.payee(id)? {
            return Ok(payee);
        }
    }
    db.get_payee_by_name(name_or_id)?
        .ok_or_else(|| anyhow::anyhow!("Payee not found: {}", name_or_id))
}

/// Find a category by ID or case-insensitive name
pub fn resolve_category(db: &Database, name_or_id: &str) -> Result<Category> {
    let categories = db.list_categories()?;
    if let Ok(id) = name_or_id.parse::<i64>() {
        if let Some(category) = categories.iter().find(|c| c.id == id) {
            return Ok(category.clone());
        }
    }
    categories
        .into_iter()
        .find(|c| c.name.eq_ignore_ascii_case(name_or_id.trim()))
        .ok_or_else(|| anyhow::anyhow!("Category not found: {}", name_or_id))
}

/// Parse an optional YYYY-MM-DD argument, defaulting to today
pub fn parse_date_arg(value: Option<&str>, flag: &str) -> Result<NaiveDate> {
    match value {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid --{} date format (use YYYY-MM-DD)", flag)),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Name of a category for display, or "-" when unset
pub fn category_label(db: &Database, category_id: Option<i64>) -> Result<String> {
    let Some(id) = category_id else {
        return Ok("-".to_string());
    };
    Ok(db
        .list_categories()?
        .into_iter()
        .find(|c| c.id == id)
        .map_or_else(|| format!("#{}", id), |c| c.name))
}
