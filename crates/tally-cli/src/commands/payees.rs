//! Payee, category and transaction bookkeeping

use anyhow::Result;
use tally_core::db::Database;
use tally_core::models::{CategoryType, NewTransaction};
use tally_core::sources::PayeeSource;

use super::{category_label, parse_date_arg, resolve_category, resolve_payee, truncate};

pub fn cmd_payees_list(db: &Database) -> Result<()> {
    let payees = db.list_payees()?;

    if payees.is_empty() {
        println!("No payees yet. Add one with:");
        println!("  tally payees add \"Netflix\"");
        return Ok(());
    }

    println!();
    println!("👥 Payees");
    println!("   ─────────────────────────────────────────────────────────────");

    for payee in payees {
        let icon = if payee.is_subscription { "🔁" } else { "  " };
        println!(
            "   {} [{:>3}] {:30} │ {}",
            icon,
            payee.id,
            truncate(&payee.name, 30),
            category_label(db, payee.default_category_id)?
        );
    }

    Ok(())
}

pub fn cmd_payees_add(db: &Database, name: &str, category: Option<&str>) -> Result<i64> {
    let category_id = category
        .map(|c| resolve_category(db, c))
        .transpose()?
        .map(|c| c.id);

    let id = db.create_payee(name)?;
    if category_id.is_some() {
        db.set_default_category(id, category_id)?;
    }

    println!("✅ Added payee '{}' (ID: {})", name.trim(), id);
    Ok(id)
}

pub fn cmd_categories_list(db: &Database) -> Result<()> {
    let categories = db.list_categories()?;

    if categories.is_empty() {
        println!("No categories yet. Add one with:");
        println!("  tally categories add Groceries --type expense");
        return Ok(());
    }

    println!();
    println!("🏷️  Categories");
    println!("   ─────────────────────────────────────────");

    for category in categories {
        println!(
            "   [{:>3}] {:25} │ {}",
            category.id,
            truncate(&category.name, 25),
            category.category_type
        );
    }

    Ok(())
}

pub fn cmd_categories_add(db: &Database, name: &str, category_type: &str) -> Result<i64> {
    let category_type: CategoryType = category_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let id = db.create_category(name, category_type)?;
    println!(
        "✅ Added {} category '{}' (ID: {})",
        category_type,
        name.trim(),
        id
    );
    Ok(id)
}

pub fn cmd_transactions_add(
    db: &Database,
    payee: &str,
    amount: f64,
    date: Option<&str>,
    category: Option<&str>,
    is_transfer: bool,
) -> Result<i64> {
    let date = parse_date_arg(date, "date")?;
    let payee_id = match resolve_payee(db, payee) {
        Ok(existing) => existing.id,
        Err(_) => {
            let id = db.create_payee(payee)?;
            println!("   Created payee '{}' (ID: {})", payee.trim(), id);
            id
        }
    };
    let category_id = category
        .map(|c| resolve_category(db, c))
        .transpose()?
        .map(|c| c.id);

    let id = db.insert_transaction(&NewTransaction {
        payee_id,
        date,
        amount: Some(amount),
        category_id,
        is_transfer,
    })?;

    let amount_str = if amount < 0.0 {
        format!("\x1b[31m${:.2}\x1b[0m", amount.abs()) // Red for expenses
    } else {
        format!("\x1b[32m+${:.2}\x1b[0m", amount) // Green for income
    };
    println!("✅ Recorded {} on {} (ID: {})", amount_str, date, id);

    Ok(id)
}
