//! Route table and router construction

use crate::gate::require_session;
use crate::server::pages;
use crate::server::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// A page route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteInfo {
    pub path: &'static str,
    pub title: &'static str,
    /// Requires an authenticated session
    pub protected: bool,
    /// Listed in the navigation bar
    pub in_nav: bool,
}

impl RouteInfo {
    const fn public(path: &'static str, title: &'static str) -> Self {
        Self {
            path,
            title,
            protected: false,
            in_nav: false,
        }
    }

    const fn protected(path: &'static str, title: &'static str) -> Self {
        Self {
            path,
            title,
            protected: true,
            in_nav: true,
        }
    }
}

/// Every page the app serves, in navigation order
pub const ROUTES: &[RouteInfo] = &[
    RouteInfo::public("/", "Home"),
    RouteInfo::public("/signin", "Sign in"),
    RouteInfo::public("/auth/verify", "Verify sign-in"),
    RouteInfo::protected("/dashboard", "Dashboard"),
    RouteInfo::protected("/transactions", "Transactions"),
    RouteInfo::protected("/subscriptions", "Subscriptions"),
    RouteInfo::protected("/insights", "Insights"),
    RouteInfo::protected("/settings", "Settings"),
];

/// Look up a page route by path
pub fn route(path: &str) -> Option<&'static RouteInfo> {
    ROUTES.iter().find(|r| r.path == path)
}

/// Title of a page route, falling back to the app name
pub fn title(path: &str) -> &'static str {
    route(path).map_or("Kharcha", |r| r.title)
}

/// Build the application router
///
/// The auth gate wraps the protected subtree once; handlers inside it can
/// rely on a `Session` extension.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(pages::dashboard))
        .route(
            "/transactions",
            get(pages::transactions).post(pages::add_transaction),
        )
        .route(
            "/subscriptions",
            get(pages::subscriptions).post(pages::add_subscription),
        )
        .route("/insights", get(pages::insights))
        .route("/settings", get(pages::settings))
        .route("/loans", post(pages::add_loan))
        .route("/loans/{id}/settle", post(pages::settle_loan))
        .route("/notifications/read", post(pages::mark_notifications_read))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let public = Router::new()
        .route("/", get(pages::home))
        .route("/signin", get(pages::sign_in_page).post(pages::sign_in))
        .route("/auth/verify", get(pages::verify_link))
        .route("/signout", post(pages::sign_out))
        .route("/health", get(health_handler));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}
