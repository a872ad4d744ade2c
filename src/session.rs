//! Signed-in identity for one browser.
//!
//! [`AuthClient`] owns the tokens and talks to the auth service; it announces
//! every change as an [`AuthEvent`]. [`AuthState`] is what views read: it asks
//! for the current session once, then follows the event stream.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{RwLock, broadcast, watch},
    task::JoinHandle,
};

use crate::{
    backend::{AuthService, Subscription},
    error::BackendError,
    models::{Credentials, Identity, Session},
};

/// Refresh this long before the access token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub change: AuthChange,
    pub session: Option<Session>,
}

pub struct AuthClient {
    service: Arc<dyn AuthService>,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthClient {
    pub fn new(service: Arc<dyn AuthService>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            service,
            session: RwLock::new(None),
            events,
        }
    }

    /// The stored session, refreshed first when its access token is about to expire.
    pub async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let mut guard = self.session.write().await;
        let Some(current) = guard.as_ref() else {
            return Ok(None);
        };

        let deadline = Utc::now() + chrono::Duration::seconds(EXPIRY_MARGIN_SECS);
        if !current.is_expired_at(deadline) {
            return Ok(Some(current.clone()));
        }

        match self.service.refresh_session(&current.refresh_token).await {
            Ok(refreshed) => {
                *guard = Some(refreshed.clone());
                drop(guard);
                self.emit(AuthChange::TokenRefreshed, Some(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(err) => {
                *guard = None;
                drop(guard);
                self.emit(AuthChange::SignedOut, None);
                Err(err)
            }
        }
    }

    pub async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, BackendError> {
        let session = self.service.sign_in_with_password(credentials).await?;
        *self.session.write().await = Some(session.clone());
        self.emit(AuthChange::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Ends the session locally even when the remote call fails; the error is
    /// still returned to the caller.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.session.write().await.take();
        let result = match previous {
            Some(session) => self.service.sign_out(&session.access_token).await,
            None => Ok(()),
        };
        self.emit(AuthChange::SignedOut, None);
        result
    }

    pub fn on_auth_state_change(&self) -> Subscription<AuthEvent> {
        Subscription::from_broadcast(self.events.subscribe(), || {})
    }

    fn emit(&self, change: AuthChange, session: Option<Session>) {
        let _ = self.events.send(AuthEvent { change, session });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Loading,
    SignedOut,
    SignedIn(Identity),
}

impl SessionStatus {
    fn from_session(session: Option<&Session>) -> Self {
        match session {
            Some(session) => SessionStatus::SignedIn(session.user.clone()),
            None => SessionStatus::SignedOut,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionStatus::Loading)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionStatus::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Session status as views see it. Dropping it stops the listener and
/// releases the auth subscription.
pub struct AuthState {
    client: Arc<AuthClient>,
    status: watch::Receiver<SessionStatus>,
    listener: JoinHandle<()>,
}

impl AuthState {
    pub fn attach(client: Arc<AuthClient>) -> Self {
        let (tx, status) = watch::channel(SessionStatus::Loading);
        let mut subscription = client.on_auth_state_change();
        let source = client.clone();

        let listener = tokio::spawn(async move {
            let initial = match source.get_session().await {
                Ok(session) => session,
                Err(err) => {
                    tracing::error!(error = %err, "failed to fetch session");
                    None
                }
            };
            tx.send_replace(SessionStatus::from_session(initial.as_ref()));

            while let Some(event) = subscription.recv().await {
                tracing::debug!(change = ?event.change, "auth state changed");
                tx.send_replace(SessionStatus::from_session(event.session.as_ref()));
            }
        });

        Self {
            client,
            status,
            listener,
        }
    }

    pub fn client(&self) -> &Arc<AuthClient> {
        &self.client
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Waits up to `timeout` for the status to leave `Loading`, then returns
    /// whatever it is.
    pub async fn resolved(&self, timeout: Duration) -> SessionStatus {
        self.wait_until(timeout, |status| !status.is_loading()).await
    }

    /// Waits up to `timeout` for `accept` to hold, then returns the status.
    pub async fn wait_until(
        &self,
        timeout: Duration,
        accept: impl FnMut(&SessionStatus) -> bool,
    ) -> SessionStatus {
        let mut status = self.status.clone();
        match tokio::time::timeout(timeout, status.wait_for(accept)).await {
            Ok(Ok(current)) => current.clone(),
            _ => self.status(),
        }
    }

    /// Asks the backend to end the session. The status follows once the
    /// sign-out event comes through the subscription.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        self.client.sign_out().await.inspect_err(|err| {
            tracing::error!(error = %err, "error signing out");
        })
    }
}

impl Drop for AuthState {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
