use std::{sync::Arc, time::Duration};

use tera::Tera;

use crate::{
    backend::Backend,
    catalog::CatalogFeed,
    config::{AppConfig, CatalogSettings},
    dashboard::AdminContext,
    middleware::session::SessionStore,
    models::Session,
    views,
};

#[derive(Clone)]
pub struct AppState {
    pub backend: Backend,
    pub feed: Arc<CatalogFeed>,
    pub sessions: Arc<SessionStore>,
    pub templates: Arc<Tera>,
    pub settings: Arc<CatalogSettings>,
    /// How long a page waits for a browser session to leave `Loading`.
    pub resolve_timeout: Duration,
}

impl AppState {
    pub fn new(backend: Backend, config: &AppConfig) -> Result<Self, tera::Error> {
        let sessions = SessionStore::new(
            backend.auth.clone(),
            config.session_idle_ttl,
            config.cookie_secure,
        );
        Self::with_sessions(backend, config.catalog.clone(), sessions, config.session_resolve_timeout)
    }

    pub fn with_sessions(
        backend: Backend,
        settings: CatalogSettings,
        sessions: SessionStore,
        resolve_timeout: Duration,
    ) -> Result<Self, tera::Error> {
        let feed = CatalogFeed::new(backend.rows.clone(), settings.table.clone());
        Ok(Self {
            backend,
            feed,
            sessions: Arc::new(sessions),
            templates: Arc::new(views::templates()?),
            settings: Arc::new(settings),
            resolve_timeout,
        })
    }

    pub fn admin_context<'a>(&'a self, session: &'a Session) -> AdminContext<'a> {
        AdminContext {
            backend: &self.backend,
            settings: &self.settings,
            feed: &self.feed,
            session,
        }
    }
}
