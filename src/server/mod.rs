//! Kharcha HTTP server
//!
//! Serves the pages, performs passwordless sign-in and hosts the reminder
//! scheduler in-process.

mod error;
mod forms;
pub mod pages;
mod purge;
pub mod router;
pub mod views;

pub use error::AppError;
pub use purge::purge_loop;
pub use router::{build_router, RouteInfo, ROUTES};
pub use views::{ViewError, Views};

use crate::auth::{AuthService, EmailLinkAuth, Mailer};
use crate::config::KharchaConfig;
use crate::reminders::{
    cron_table, default_handlers, CronTable, ScheduledReminders, Scheduler, SystemClock,
};
use crate::session::{CookieSettings, SessionProvider};
use crate::signin::SignInFlows;
use crate::storage::{LedgerStore, NotificationStore, SessionStore};
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The storage collaborators
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    /// Use one backend for everything
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: SessionStore + LedgerStore + NotificationStore + 'static,
    {
        Self {
            sessions: store.clone(),
            ledger: store.clone(),
            notifications: store,
        }
    }
}

/// Shared state for request handlers
#[derive(Clone)]
pub struct AppState {
    pub views: Arc<Views>,
    pub sessions: Arc<SessionProvider>,
    pub auth: Arc<EmailLinkAuth>,
    pub sign_in: Arc<SignInFlows>,
    pub ledger: Arc<dyn LedgerStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub cookies: CookieSettings,
    /// Human-readable reminder schedule for the settings page
    pub schedule: Arc<str>,
}

impl AppState {
    pub fn new(
        config: &KharchaConfig,
        stores: &Stores,
        mailer: Arc<dyn Mailer>,
        crons: &CronTable,
    ) -> Result<Self, ViewError> {
        let auth = Arc::new(EmailLinkAuth::new(
            config.link_auth(),
            mailer,
            stores.sessions.clone(),
        ));
        let sign_in = Arc::new(SignInFlows::new(auth.clone() as Arc<dyn AuthService>));

        let schedule = crons
            .jobs()
            .first()
            .map_or_else(|| "never".to_string(), |job| job.schedule.to_string());

        Ok(Self {
            views: Arc::new(Views::new()?),
            sessions: Arc::new(SessionProvider::new(
                stores.sessions.clone(),
                config.session_resolve_timeout,
            )),
            auth,
            sign_in,
            ledger: stores.ledger.clone(),
            notifications: stores.notifications.clone(),
            cookies: CookieSettings {
                secure: config.secure_cookies(),
                max_age: config.session_ttl,
            },
            schedule: schedule.into(),
        })
    }
}

/// The HTTP server, the reminder scheduler and the expiry sweep
pub struct KharchaServer {
    config: KharchaConfig,
    state: AppState,
    scheduler: Scheduler,
    sessions: Arc<dyn SessionStore>,
}

impl KharchaServer {
    pub fn new(config: KharchaConfig, stores: Stores, mailer: Arc<dyn Mailer>) -> Result<Self> {
        config.validate().context("Invalid server configuration")?;

        let crons = cron_table()?;
        let reminders = Arc::new(ScheduledReminders::new(
            stores.ledger.clone(),
            stores.notifications.clone(),
            Arc::new(SystemClock),
        ));
        let scheduler = Scheduler::new(&crons, &default_handlers(reminders), Arc::new(SystemClock))?;
        let state = AppState::new(&config, &stores, mailer, &crons)?;

        Ok(Self {
            config,
            state,
            scheduler,
            sessions: stores.sessions,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` fires, then stop the scheduler and the sweep
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let app = self.router();
        let scheduler = tokio::spawn(self.scheduler.run(shutdown.child_token()));
        let purge = tokio::spawn(purge_loop(
            self.sessions,
            self.state.auth.clone(),
            self.config.purge_interval,
            shutdown.child_token(),
        ));

        let listener = tokio::net::TcpListener::bind(self.config.bind)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind))?;
        info!(addr = %self.config.bind, public_url = %self.config.public_url, "Kharcha listening");

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await;

        shutdown.cancel();
        scheduler.await.context("Scheduler task failed")?;
        purge.await.context("Purge task failed")?;
        served?;

        info!("Kharcha stopped");
        Ok(())
    }
}
