//! Sign-in flow
//!
//! A [`SignInFlow`] owns the observable state of one sign-in form: a busy
//! flag and a status message. Submitting asks the [`AuthService`] for a
//! passwordless link. Re-entrant submits are ignored while busy, and a
//! cancelled submit discards its result.

use crate::auth::{AuthService, SignInRequest, RESEND_PROVIDER};
use crate::ledger::normalize_email;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Shown after the auth service accepted the request
pub const SIGN_IN_SENT_MESSAGE: &str = "Check your email for a sign-in link.";
/// Shown when the auth service failed
pub const SIGN_IN_FAILED_MESSAGE: &str = "Could not send sign-in link. Please try again.";
/// Shown for a blank email
pub const EMAIL_REQUIRED_MESSAGE: &str = "Enter your email address.";

/// What happened to a submit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The auth service was called and the status updated
    Completed,
    /// Another submit was in flight
    Ignored,
    /// Blank email, nothing sent
    Rejected,
    /// Cancelled before the auth service answered
    Cancelled,
}

/// Clears the busy flag on every exit path
struct BusyGuard<'a>(&'a watch::Sender<bool>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

pub struct SignInFlow {
    auth: Arc<dyn AuthService>,
    busy: watch::Sender<bool>,
    status: Mutex<Option<String>>,
}

impl SignInFlow {
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            auth,
            busy,
            status: Mutex::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    /// Watch busy transitions
    pub fn busy_receiver(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    pub fn status(&self) -> Option<String> {
        self.status.lock().clone()
    }

    fn set_status(&self, message: Option<&str>) {
        *self.status.lock() = message.map(str::to_string);
    }

    /// Request a sign-in link for `email`
    pub async fn submit(&self, email: &str, cancel: &CancellationToken) -> SubmitOutcome {
        let acquired = self.busy.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        if !acquired {
            debug!("Sign-in already in flight, ignoring submit");
            return SubmitOutcome::Ignored;
        }
        let _busy = BusyGuard(&self.busy);

        let Some(request) = SignInRequest::new(email) else {
            self.set_status(Some(EMAIL_REQUIRED_MESSAGE));
            return SubmitOutcome::Rejected;
        };

        self.set_status(None);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.auth.sign_in(RESEND_PROVIDER, request) => Some(result),
        };

        match result {
            None => {
                debug!("Sign-in cancelled, discarding result");
                SubmitOutcome::Cancelled
            }
            Some(Ok(outcome)) => {
                debug!(signing_in = outcome.signing_in, "Sign-in link requested");
                self.set_status(Some(SIGN_IN_SENT_MESSAGE));
                SubmitOutcome::Completed
            }
            Some(Err(e)) => {
                error!(error = %e, "Sign-in request failed");
                self.set_status(Some(SIGN_IN_FAILED_MESSAGE));
                SubmitOutcome::Completed
            }
        }
    }
}

/// Sign-in flows keyed by normalized email
///
/// A flow lives only while it is busy, so a second submit for the same
/// address during an in-flight request is ignored.
pub struct SignInFlows {
    auth: Arc<dyn AuthService>,
    flows: DashMap<String, Arc<SignInFlow>>,
}

impl SignInFlows {
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        Self {
            auth,
            flows: DashMap::new(),
        }
    }

    /// Submit through the flow for `email`, returning the outcome and status to show
    pub async fn submit(&self, email: &str, cancel: &CancellationToken) -> (SubmitOutcome, Option<String>) {
        let key = normalize_email(email);
        let flow = self
            .flows
            .entry(key.clone())
            .or_insert_with(|| Arc::new(SignInFlow::new(self.auth.clone())))
            .clone();

        let outcome = flow.submit(email, cancel).await;
        let status = flow.status();

        self.flows.remove_if(&key, |_, f| !f.is_busy());
        (outcome, status)
    }

    pub fn in_flight(&self) -> usize {
        self.flows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, SignInOutcome};
    use async_trait::async_trait;

    struct FixedAuth(Result<bool, ()>);

    #[async_trait]
    impl AuthService for FixedAuth {
        async fn sign_in(&self, _: &str, _: SignInRequest) -> Result<SignInOutcome, AuthError> {
            match self.0 {
                Ok(signing_in) => Ok(SignInOutcome { signing_in }),
                Err(()) => Err(AuthError::InvalidEmail),
            }
        }
    }

    #[tokio::test]
    async fn test_blank_email_rejected() {
        let flow = SignInFlow::new(Arc::new(FixedAuth(Ok(false))));

        let outcome = flow.submit("   ", &CancellationToken::new()).await;
        assert_eq!(outcome, SubmitOutcome::Rejected);
        assert_eq!(flow.status().as_deref(), Some(EMAIL_REQUIRED_MESSAGE));
        assert!(!flow.is_busy());
    }

    #[tokio::test]
    async fn test_status_cleared_before_request() {
        let flow = SignInFlow::new(Arc::new(FixedAuth(Err(()))));
        flow.submit("a@b.c", &CancellationToken::new()).await;
        assert_eq!(flow.status().as_deref(), Some(SIGN_IN_FAILED_MESSAGE));

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(flow.submit("a@b.c", &cancel).await, SubmitOutcome::Cancelled);
        // Cleared at start, untouched by the cancelled result
        assert_eq!(flow.status(), None);
    }

    #[tokio::test]
    async fn test_flows_pruned_after_submit() {
        let flows = SignInFlows::new(Arc::new(FixedAuth(Ok(false))));

        let (outcome, status) = flows.submit("a@b.c", &CancellationToken::new()).await;
        assert_eq!(outcome, SubmitOutcome::Completed);
        assert_eq!(status.as_deref(), Some(SIGN_IN_SENT_MESSAGE));
        assert_eq!(flows.in_flight(), 0);
    }
}
