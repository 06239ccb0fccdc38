//! Kharcha CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use kharcha::auth::{LogMailer, Mailer, ResendMailer};
use kharcha::reminders::{cron_table, ScheduledReminders, SystemClock};
use kharcha::storage::{MemoryStore, PostgresConfig, PostgresStore, SessionStore};
use kharcha::{KharchaConfig, KharchaServer, Stores};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Explicit URL first, then the PG* variables
    let get_db_config = || -> Result<PostgresConfig> {
        if let Some(url) = &cli.database_url {
            PostgresConfig::from_url(url).context("Invalid DATABASE_URL")
        } else {
            PostgresConfig::from_env().context("DATABASE_URL not set")
        }
    };

    match &cli.command {
        Commands::Serve {
            bind,
            public_url,
            secret,
            resend_api_key,
            resend_api_base,
            mail_from,
        } => {
            let config = KharchaConfig::from_parts(bind, public_url, secret)?.mail_from(mail_from);
            let mailer: Arc<dyn Mailer> = match resend_api_key {
                Some(key) => Arc::new(ResendMailer::with_base(key, resend_api_base)?),
                None => {
                    warn!("RESEND_API_KEY not set, sign-in links will be logged instead of emailed");
                    Arc::new(LogMailer)
                }
            };
            serve(config, open_stores(&cli).await?, mailer).await
        }
        Commands::Remind { date } => remind(open_stores(&cli).await?, *date).await,
        Commands::Crons => crons(),
        Commands::Init => init(get_db_config()?).await,
        Commands::Status => status(get_db_config()?).await,
    }
}

/// Postgres when a database URL is configured, memory otherwise
async fn open_stores(cli: &Cli) -> Result<Stores> {
    match &cli.database_url {
        Some(url) => {
            let db_config = PostgresConfig::from_url(url).context("Invalid DATABASE_URL")?;
            let store = PostgresStore::new(db_config)
                .await
                .context("Failed to open database")?;
            Ok(Stores::shared(Arc::new(store)))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory storage; data is lost on exit");
            Ok(Stores::shared(Arc::new(MemoryStore::new())))
        }
    }
}

async fn serve(config: KharchaConfig, stores: Stores, mailer: Arc<dyn Mailer>) -> Result<()> {
    let server = KharchaServer::new(config, stores, mailer)?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping server");
        trigger.cancel();
    });

    server.run(shutdown).await
}

async fn remind(stores: Stores, date: Option<chrono::NaiveDate>) -> Result<()> {
    let reminders = ScheduledReminders::new(stores.ledger, stores.notifications, Arc::new(SystemClock));
    let today = date.unwrap_or_else(|| Utc::now().date_naive());
    let report = reminders.run_for(today).await?;

    println!("Reminders for {}", today);
    println!("  Subscriptions due: {}", report.subscriptions);
    println!("  Loans due:         {}", report.loans);
    println!("  Created:           {}", report.created);
    println!("  Already sent:      {}", report.duplicates);
    Ok(())
}

fn crons() -> Result<()> {
    let table = cron_table()?;
    for job in table.jobs() {
        println!("{}", job.name);
        println!("  Schedule: {}", job.schedule);
        println!("  Handler:  {}", job.handler);
    }
    Ok(())
}

async fn init(db_config: PostgresConfig) -> Result<()> {
    let store = PostgresStore::new(db_config).await?;
    let purged = store.purge_expired(Utc::now()).await?;
    println!("Database schema initialized successfully");
    if purged > 0 {
        println!("Removed {} expired sessions and links", purged);
    }
    Ok(())
}

async fn status(db_config: PostgresConfig) -> Result<()> {
    let _store = PostgresStore::new(db_config).await?;

    println!("Kharcha Status");
    println!("==============");
    println!("Database: Connected");
    for job in cron_table()?.jobs() {
        println!("Cron: {} ({})", job.name, job.schedule);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
