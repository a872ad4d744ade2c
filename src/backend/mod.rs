//! Seams to the backend platform.
//!
//! Every capability the catalog needs from the platform sits behind one of
//! four traits. [`Backend`] bundles them into the single client handle that is
//! built at startup and passed to each component, so tests can swap in
//! [`memory::MemoryBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;

use crate::{
    error::BackendError,
    models::{Credentials, Product, ProductDraft, ProductId, Session},
};

pub mod memory;
pub mod subscription;
pub mod supabase;

pub use subscription::Subscription;

/// Who a request is made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Anonymous,
    User(String),
}

impl Authorization {
    pub fn for_session(session: &Session) -> Self {
        Authorization::User(session.access_token.clone())
    }
}

#[async_trait]
pub trait RowStore: Send + Sync {
    /// All rows, newest `created_at` first.
    async fn select_products(
        &self,
        table: &str,
        auth: &Authorization,
    ) -> Result<Vec<Product>, BackendError>;

    async fn insert_product(
        &self,
        table: &str,
        draft: &ProductDraft,
        auth: &Authorization,
    ) -> Result<Product, BackendError>;

    async fn update_product(
        &self,
        table: &str,
        id: &ProductId,
        draft: &ProductDraft,
        auth: &Authorization,
    ) -> Result<Product, BackendError>;

    async fn delete_product(
        &self,
        table: &str,
        id: &ProductId,
        auth: &Authorization,
    ) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
pub struct UploadObject {
    pub bytes: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores a new object. An existing object at `path` is never overwritten.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        object: UploadObject,
        auth: &Authorization,
    ) -> Result<(), BackendError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, BackendError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// The feed rejoined after losing its connection; changes may have been missed.
    Resync,
}

impl ChangeKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A subscription to every change on one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub channel: String,
    pub schema: String,
    pub table: String,
}

impl ChangeFilter {
    pub fn all_events(channel: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            schema: "public".to_string(),
            table: table.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(
        &self,
        filter: ChangeFilter,
    ) -> Result<Subscription<ChangeEvent>, BackendError>;
}

/// The process-wide handle to the platform.
#[derive(Clone)]
pub struct Backend {
    pub rows: Arc<dyn RowStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub auth: Arc<dyn AuthService>,
    pub realtime: Arc<dyn ChangeFeed>,
}
