//! Server-side browser sessions keyed by a cookie.
//!
//! Each browser gets its own [`AuthClient`], the [`AuthState`] views read,
//! and its own [`Dashboard`]. Sessions idle past the configured TTL are
//! swept; dropping the last handle releases the auth subscription.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex, RwLock},
    time::{Duration, Instant},
};

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    backend::AuthService,
    dashboard::Dashboard,
    session::{AuthClient, AuthState},
    state::AppState,
};

pub const SESSION_COOKIE: &str = "catalog_sid";

pub struct BrowserSession {
    id: Uuid,
    auth: AuthState,
    dashboard: Dashboard,
    last_seen: Mutex<Instant>,
}

impl BrowserSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn client(&self) -> &Arc<AuthClient> {
        self.auth.client()
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last_seen = *self.last_seen.lock().unwrap_or_else(|p| p.into_inner());
        now.saturating_duration_since(last_seen)
    }
}

pub struct SessionStore {
    auth_service: Arc<dyn AuthService>,
    sessions: RwLock<HashMap<Uuid, Arc<BrowserSession>>>,
    idle_ttl: Duration,
    cookie_secure: bool,
}

impl SessionStore {
    pub fn new(auth_service: Arc<dyn AuthService>, idle_ttl: Duration, cookie_secure: bool) -> Self {
        Self {
            auth_service,
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
            cookie_secure,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<BrowserSession>> {
        let sessions = self.sessions.read().unwrap_or_else(|p| p.into_inner());
        let session = sessions.get(&id)?.clone();
        session.touch();
        Some(session)
    }

    /// Starts a session with its own auth client; the auth listener begins
    /// resolving the (empty) stored session right away.
    pub fn create(&self) -> Arc<BrowserSession> {
        let client = Arc::new(AuthClient::new(self.auth_service.clone()));
        let session = Arc::new(BrowserSession {
            id: Uuid::new_v4(),
            auth: AuthState::attach(client),
            dashboard: Dashboard::new(),
            last_seen: Mutex::new(Instant::now()),
        });
        self.sessions
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(session.id, session.clone());
        tracing::debug!(session_id = %session.id, "browser session created");
        session
    }

    /// The live session named by the cookie, if any. Never creates one.
    pub fn lookup(&self, jar: &CookieJar) -> Option<Arc<BrowserSession>> {
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
            .and_then(|id| self.get(id))
    }

    /// The session named by the cookie, or a new one with the cookie set.
    pub fn resolve(&self, jar: CookieJar) -> (Arc<BrowserSession>, CookieJar) {
        if let Some(session) = self.lookup(&jar) {
            return (session, jar);
        }

        let session = self.create();
        let cookie = Cookie::build((SESSION_COOKIE, session.id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure);
        (session, jar.add(cookie))
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every session idle longer than the TTL. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().unwrap_or_else(|p| p.into_inner());
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for(now) < self.idle_ttl);
        before - sessions.len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    tracing::info!(removed, remaining = store.len(), "swept idle browser sessions");
                }
            }
        })
    }
}

/// The caller's browser session plus the cookie jar to return with the response.
pub struct CurrentSession {
    pub session: Arc<BrowserSession>,
    pub jar: CookieJar,
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let (session, jar) = state.sessions.resolve(jar);
        Ok(CurrentSession { session, jar })
    }
}

/// The caller's browser session when the cookie already names one. Pages
/// that only read the sign-in status use this so anonymous visitors do not
/// get a session.
pub struct KnownSession(pub Option<Arc<BrowserSession>>);

impl FromRequestParts<AppState> for KnownSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(KnownSession(state.sessions.lookup(&jar)))
    }
}
