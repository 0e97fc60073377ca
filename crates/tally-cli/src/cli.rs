//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Learn how you pay each payee
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Payee intelligence: spending patterns, predictions, categories and subscriptions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Engine config file (defaults to the platform data dir, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manage payees
    Payees {
        #[command(subcommand)]
        action: Option<PayeesAction>,
    },

    /// Manage categories and learn from corrections
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Record transactions
    Transactions {
        #[command(subcommand)]
        action: TransactionsAction,
    },

    /// Full intelligence report for a payee
    Analyze {
        /// Payee name or ID
        payee: String,

        /// Evaluate as of this date (YYYY-MM-DD, default: today)
        #[arg(long)]
        as_of: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Predict a payee's next transaction
    Predict {
        /// Payee name or ID
        payee: String,

        /// Evaluate as of this date (YYYY-MM-DD, default: today)
        #[arg(long)]
        as_of: Option<String>,

        /// Print the prediction as JSON
        #[arg(long)]
        json: bool,
    },

    /// Suggest next month's budget for a payee
    Budget {
        /// Payee name or ID
        payee: String,

        /// Evaluate as of this date (YYYY-MM-DD, default: today)
        #[arg(long)]
        as_of: Option<String>,

        /// Print the suggestion as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or change a payee's intelligence profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Record feedback on a prediction
    Feedback {
        /// Payee name or ID
        payee: String,

        /// Prediction type: next_transaction, budget_suggestion
        #[arg(long = "type", default_value = "next_transaction")]
        prediction_type: String,

        /// Value the engine predicted
        #[arg(long)]
        original: f64,

        /// What the value should have been
        #[arg(long)]
        corrected: Option<f64>,

        /// Rating from 1 (useless) to 5 (spot on)
        #[arg(long)]
        rating: Option<u8>,
    },

    /// Detect and follow subscriptions
    Subscriptions {
        #[command(subcommand)]
        action: Option<SubscriptionsAction>,
    },
}

#[derive(Subcommand)]
pub enum PayeesAction {
    /// List payees
    List,

    /// Add a payee
    Add {
        /// Payee name
        name: String,

        /// Default category (name or ID)
        #[arg(short, long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories
    List,

    /// Add a category
    Add {
        /// Category name
        name: String,

        /// Category type: expense, income, transfer, savings
        #[arg(short = 't', long = "type", default_value = "expense")]
        category_type: String,
    },

    /// Record a category correction for a payee
    Correct {
        /// Payee name or ID
        payee: String,

        /// Category the transaction was moved to (name or ID)
        #[arg(long)]
        to: String,

        /// Category it was moved from (name or ID)
        #[arg(long)]
        from: Option<String>,

        /// How sure you are, 0-10
        #[arg(long, default_value = "8")]
        confidence: u8,

        /// What prompted the correction: manual_edit, bulk_edit, import_review, suggestion_rejected
        #[arg(long, default_value = "manual_edit")]
        trigger: String,

        /// Amount of the corrected transaction
        #[arg(long, allow_hyphen_values = true)]
        amount: Option<f64>,

        /// Date of the corrected transaction (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Recommend a category for a payee from its corrections
    Recommend {
        /// Payee name or ID
        payee: String,
    },

    /// Check whether a payee's preferred category has drifted
    Drift {
        /// Payee name or ID
        payee: String,
    },

    /// Suggest default category updates across all payees
    Suggest {
        /// Apply the suggestions as new defaults
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Subcommand)]
pub enum TransactionsAction {
    /// Add a transaction (negative amounts are expenses)
    Add {
        /// Payee name or ID (created if the name is new)
        payee: String,

        /// Signed amount
        #[arg(allow_hyphen_values = true)]
        amount: f64,

        /// Transaction date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Category (name or ID)
        #[arg(short, long)]
        category: Option<String>,

        /// Mark as a transfer between own accounts
        #[arg(long)]
        transfer: bool,
    },
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Show a payee's profile
    Show {
        /// Payee name or ID
        payee: String,
    },

    /// Update a payee's profile (unspecified settings are kept)
    Set {
        /// Payee name or ID
        payee: String,

        /// Apply the profile filters
        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        /// Stop applying the profile filters
        #[arg(long)]
        disable: bool,

        /// Amount sign: all, positive, negative
        #[arg(long)]
        sign: Option<String>,

        /// Only the last N months
        #[arg(long, conflicts_with_all = ["last_years", "all_time"])]
        last_months: Option<u32>,

        /// Only the last N years
        #[arg(long, conflicts_with = "all_time")]
        last_years: Option<u32>,

        /// No date restriction
        #[arg(long)]
        all_time: bool,

        /// Category types to include (repeatable; empty = all)
        #[arg(long = "category-type")]
        category_types: Vec<String>,

        /// Exclude transfers
        #[arg(long)]
        exclude_transfers: bool,

        /// Include transfers
        #[arg(long, conflicts_with = "exclude_transfers")]
        include_transfers: bool,

        /// Minimum absolute amount
        #[arg(long)]
        min_amount: Option<f64>,

        /// Maximum absolute amount
        #[arg(long)]
        max_amount: Option<f64>,

        /// Prediction method: default, statistical, ml, ai
        #[arg(long)]
        method: Option<String>,

        /// Minimum confidence (0-1) before predictions are surfaced
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[derive(Subcommand)]
pub enum SubscriptionsAction {
    /// Scan all payees for likely subscriptions
    Detect {
        /// Mark every detection as a confirmed subscription
        #[arg(long)]
        confirm: bool,

        /// Print detections as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify one payee, whatever the confidence
    Classify {
        /// Payee name or ID
        payee: String,

        /// Print the classification as JSON
        #[arg(long)]
        json: bool,
    },

    /// Current status, cancellation risk and value assessment
    Lifecycle {
        /// Payee name or ID
        payee: String,

        /// Evaluate as of this date (YYYY-MM-DD, default: today)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Record a lifecycle event
    Event {
        /// Payee name or ID
        payee: String,

        /// Status: trial, active, paused, cancelled, expired, pending_cancellation
        status: String,

        /// Event date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Free-form note
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Cost history and price change alerts
    Costs {
        /// Payee name or ID
        payee: String,
    },

    /// Forecast upcoming renewals
    Renewals {
        /// Payee name or ID
        payee: String,

        /// Number of renewals to forecast (at most 120)
        #[arg(short = 'n', long, default_value = "3")]
        count: usize,

        /// Evaluate as of this date (YYYY-MM-DD, default: today)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Usage and value scores
    Usage {
        /// Payee name or ID
        payee: String,

        /// Evaluate as of this date (YYYY-MM-DD, default: today)
        #[arg(long)]
        as_of: Option<String>,
    },
}
