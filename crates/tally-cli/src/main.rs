//! Tally CLI - Payee intelligence from your transaction history
//!
//! Usage:
//!   tally init                         Initialize database
//!   tally transactions add PAYEE AMT   Record a transaction
//!   tally analyze PAYEE                Spending, frequency, predictions, confidence
//!   tally subscriptions detect         Find likely subscriptions

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    if let Commands::Init = cli.command {
        return commands::cmd_init(&cli.db, cli.no_encrypt);
    }

    let db = commands::open_db(&cli.db, cli.no_encrypt)?;
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Payees { action } => match action {
            None | Some(PayeesAction::List) => commands::cmd_payees_list(&db),
            Some(PayeesAction::Add { name, category }) => {
                commands::cmd_payees_add(&db, &name, category.as_deref()).map(|_| ())
            }
        },
        Commands::Categories { action } => match action {
            None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db),
            Some(CategoriesAction::Add {
                name,
                category_type,
            }) => commands::cmd_categories_add(&db, &name, &category_type).map(|_| ()),
            Some(CategoriesAction::Correct {
                payee,
                to,
                from,
                confidence,
                trigger,
                amount,
                date,
            }) => commands::cmd_categories_correct(
                &db,
                &config,
                &commands::CorrectionArgs {
                    payee: &payee,
                    to: &to,
                    from: from.as_deref(),
                    confidence,
                    trigger: &trigger,
                    amount,
                    date: date.as_deref(),
                },
            )
            .map(|_| ()),
            Some(CategoriesAction::Recommend { payee }) => {
                commands::cmd_categories_recommend(&db, &config, &payee)
            }
            Some(CategoriesAction::Drift { payee }) => {
                commands::cmd_categories_drift(&db, &config, &payee)
            }
            Some(CategoriesAction::Suggest { apply }) => {
                commands::cmd_categories_suggest(&db, &config, apply)
                    .await
                    .map(|_| ())
            }
        },
        Commands::Transactions { action } => match action {
            TransactionsAction::Add {
                payee,
                amount,
                date,
                category,
                transfer,
            } => commands::cmd_transactions_add(
                &db,
                &payee,
                amount,
                date.as_deref(),
                category.as_deref(),
                transfer,
            )
            .map(|_| ()),
        },
        Commands::Analyze { payee, as_of, json } => {
            let as_of = commands::parse_date_arg(as_of.as_deref(), "as-of")?;
            commands::cmd_analyze(&db, &config, &payee, as_of, json).await
        }
        Commands::Predict { payee, as_of, json } => {
            let as_of = commands::parse_date_arg(as_of.as_deref(), "as-of")?;
            commands::cmd_predict(&db, &config, &payee, as_of, json).await
        }
        Commands::Budget { payee, as_of, json } => {
            let as_of = commands::parse_date_arg(as_of.as_deref(), "as-of")?;
            commands::cmd_budget(&db, &config, &payee, as_of, json).await
        }
        Commands::Profile { action } => match action {
            ProfileAction::Show { payee } => commands::cmd_profile_show(&db, &config, &payee),
            ProfileAction::Set {
                payee,
                enable,
                disable,
                sign,
                last_months,
                last_years,
                all_time,
                category_types,
                exclude_transfers,
                include_transfers,
                min_amount,
                max_amount,
                method,
                threshold,
            } => {
                let changes = commands::ProfileChanges {
                    enable,
                    disable,
                    sign,
                    last_months,
                    last_years,
                    all_time,
                    category_types,
                    exclude_transfers,
                    include_transfers,
                    min_amount,
                    max_amount,
                    method,
                    threshold,
                };
                commands::cmd_profile_set(&db, &config, &payee, &changes).map(|_| ())
            }
        },
        Commands::Feedback {
            payee,
            prediction_type,
            original,
            corrected,
            rating,
        } => commands::cmd_feedback(
            &db,
            &config,
            &payee,
            &prediction_type,
            original,
            corrected,
            rating,
        )
        .map(|_| ()),
        Commands::Subscriptions { action } => match action {
            None => {
                let today = commands::parse_date_arg(None, "as-of")?;
                commands::cmd_subscriptions_detect(&db, &config, today, false, false)
                    .await
                    .map(|_| ())
            }
            Some(SubscriptionsAction::Detect { confirm, json }) => {
                let today = commands::parse_date_arg(None, "as-of")?;
                commands::cmd_subscriptions_detect(&db, &config, today, confirm, json)
                    .await
                    .map(|_| ())
            }
            Some(SubscriptionsAction::Classify { payee, json }) => {
                commands::cmd_subscriptions_classify(&db, &config, &payee, json)
            }
            Some(SubscriptionsAction::Lifecycle { payee, as_of }) => {
                let as_of = commands::parse_date_arg(as_of.as_deref(), "as-of")?;
                commands::cmd_subscriptions_lifecycle(&db, &config, &payee, as_of)
            }
            Some(SubscriptionsAction::Event {
                payee,
                status,
                date,
                note,
            }) => commands::cmd_subscriptions_event(
                &db,
                &config,
                &payee,
                &status,
                date.as_deref(),
                note.as_deref(),
            )
            .map(|_| ()),
            Some(SubscriptionsAction::Costs { payee }) => {
                commands::cmd_subscriptions_costs(&db, &config, &payee)
            }
            Some(SubscriptionsAction::Renewals {
                payee,
                count,
                as_of,
            }) => {
                let as_of = commands::parse_date_arg(as_of.as_deref(), "as-of")?;
                commands::cmd_subscriptions_renewals(&db, &config, &payee, count, as_of)
            }
            Some(SubscriptionsAction::Usage { payee, as_of }) => {
                let as_of = commands::parse_date_arg(as_of.as_deref(), "as-of")?;
                commands::cmd_subscriptions_usage(&db, &config, &payee, as_of)
            }
        },
    }
}
