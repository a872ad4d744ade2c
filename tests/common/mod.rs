#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use affiliate_catalog::{
    backend::{Backend, memory::MemoryBackend},
    catalog::CatalogFeed,
    config::CatalogSettings,
    dashboard::AdminContext,
    form::{LocalMedia, ProductFields, SubmitContext},
    media::MediaKind,
    models::{Credentials, Product, ProductDraft, Session},
};
use axum::body::Bytes;

pub const TABLE: &str = "products";
pub const ADMIN_EMAIL: &str = "admin@toko.id";
pub const ADMIN_PASSWORD: &str = "rahasia123";

pub fn settings() -> CatalogSettings {
    CatalogSettings {
        form_close_delay: Duration::from_millis(30),
        ..CatalogSettings::default()
    }
}

pub fn admin_credentials() -> Credentials {
    Credentials {
        email: ADMIN_EMAIL.into(),
        password: ADMIN_PASSWORD.into(),
    }
}

pub struct Harness {
    pub memory: Arc<MemoryBackend>,
    pub backend: Backend,
    pub settings: CatalogSettings,
    pub feed: Arc<CatalogFeed>,
    pub session: Session,
}

impl Harness {
    /// A signed-in admin against an empty in-memory platform, with the call
    /// log cleared.
    pub async fn new() -> anyhow::Result<Self> {
        let memory = Arc::new(MemoryBackend::default());
        memory.add_account(ADMIN_EMAIL, ADMIN_PASSWORD);
        let backend = memory.backend();
        let session = backend.auth.sign_in_with_password(&admin_credentials()).await?;
        let feed = CatalogFeed::new(backend.rows.clone(), TABLE);
        memory.clear_calls();
        Ok(Self {
            memory,
            backend,
            settings: settings(),
            feed,
            session,
        })
    }

    pub fn submit_context(&self) -> SubmitContext<'_> {
        SubmitContext {
            backend: &self.backend,
            settings: &self.settings,
            session: &self.session,
        }
    }

    pub fn admin_context(&self) -> AdminContext<'_> {
        AdminContext {
            backend: &self.backend,
            settings: &self.settings,
            feed: &self.feed,
            session: &self.session,
        }
    }

    pub fn seed(&self, name: &str, image_url: &str) -> Product {
        self.memory.seed(TABLE, draft(name, 75000.0, image_url))
    }
}

pub fn draft(name: &str, price: f64, image_url: &str) -> ProductDraft {
    ProductDraft {
        name: name.into(),
        description: format!("{name} pilihan"),
        price,
        affiliate_link: "https://shopee.co.id/x".into(),
        image_url: image_url.into(),
        media_type: Some(MediaKind::from_url(image_url)),
    }
}

pub fn kaos_polos_fields() -> ProductFields {
    ProductFields {
        name: "Kaos Polos".into(),
        description: "Kaos polos katun".into(),
        price: "50000".into(),
        affiliate_link: "https://shopee.co.id/x".into(),
    }
}

pub fn sample_jpg() -> LocalMedia {
    LocalMedia {
        file_name: "sample.jpg".into(),
        content_type: "image/jpeg".into(),
        bytes: Bytes::from_static(b"\xff\xd8\xff\xe0sample"),
    }
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
