//! CLI command definitions

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kharcha")]
#[command(about = "Personal finance tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL; without one, data lives in memory
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server and the reminder scheduler
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = kharcha::KharchaConfig::DEFAULT_BIND, env = "KHARCHA_BIND")]
        bind: String,

        /// Externally visible base URL, used in sign-in links
        #[arg(long, default_value = "http://localhost:3000", env = "KHARCHA_PUBLIC_URL")]
        public_url: String,

        /// Sign-in link signing secret (at least 32 bytes)
        #[arg(long, env = "KHARCHA_SECRET")]
        secret: String,

        /// Resend API key; without one, sign-in links are logged
        #[arg(long, env = "RESEND_API_KEY")]
        resend_api_key: Option<String>,

        /// Resend API base URL
        #[arg(long, default_value = kharcha::auth::RESEND_API_BASE, env = "RESEND_API_BASE")]
        resend_api_base: String,

        /// Sender address for sign-in emails
        #[arg(long, default_value = "Kharcha <login@kharcha.app>", env = "KHARCHA_MAIL_FROM")]
        mail_from: String,
    },

    /// Run the reminder handler once
    ///
    /// Examples:
    ///   kharcha remind
    ///   kharcha remind --date 2025-03-14
    Remind {
        /// Treat this UTC date as today (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: Option<chrono::NaiveDate>,
    },

    /// Print the cron table
    Crons,

    /// Initialize the database schema
    Init,

    /// Show database status
    Status,
}

fn parse_date(s: &str) -> Result<chrono::NaiveDate, String> {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date: {}. Expected YYYY-MM-DD ({})", s, e))
}
