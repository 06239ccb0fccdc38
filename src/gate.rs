//! Auth gate
//!
//! Chooses between a waiting page, the sign-in form and protected content
//! from a resolved [`SessionState`]. [`require_session`] applies the gate to
//! the protected subtree of the router.

use crate::server::{pages, AppState};
use crate::session::{Session, SessionState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// What the gate lets through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateView<T> {
    /// Session state not known yet
    Waiting,
    /// No session; show the sign-in form
    SignIn,
    Protected(T),
}

pub struct AuthGate;

impl AuthGate {
    /// Exactly one view per state; `children` runs only when authenticated
    pub fn render<T>(state: &SessionState, children: impl FnOnce(&Session) -> T) -> GateView<T> {
        match state {
            SessionState::Loading => GateView::Waiting,
            SessionState::Unauthenticated => GateView::SignIn,
            SessionState::Authenticated(session) => GateView::Protected(children(session)),
        }
    }
}

/// Middleware guarding the protected routes
///
/// Authenticated requests continue with the `Session` in their extensions.
pub async fn require_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let session_state = state.sessions.resolve_headers(request.headers()).await;
    let path = request.uri().path().to_string();

    match AuthGate::render(&session_state, Session::clone) {
        GateView::Waiting => {
            debug!(path = %path, "Session unresolved, serving waiting page");
            pages::waiting_page(&state, &path).into_response()
        }
        GateView::SignIn => {
            debug!(path = %path, "No session, serving sign-in form");
            pages::sign_in_required(&state).into_response()
        }
        GateView::Protected(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
    }
}
