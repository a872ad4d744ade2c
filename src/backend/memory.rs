//! In-process stand-in for the platform.
//!
//! Keeps rows, objects and accounts in memory, publishes change events to
//! subscribers, records every call it receives, and can be told to fail the
//! next call of a given kind.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::{
    backend::{
        AuthService, Authorization, Backend, ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind,
        ObjectStorage, RowStore, Subscription, UploadObject,
    },
    error::BackendError,
    models::{Credentials, Identity, Product, ProductDraft, ProductId, Session},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Upload,
    SignIn,
    Refresh,
    SignOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Select { table: String },
    Insert { table: String, draft: ProductDraft },
    Update { table: String, id: ProductId, draft: ProductDraft },
    Delete { table: String, id: ProductId },
    Upload { bucket: String, path: String, content_type: String },
    SignIn { email: String },
    Refresh,
    SignOut,
}

impl BackendCall {
    pub fn operation(&self) -> Operation {
        match self {
            BackendCall::Select { .. } => Operation::Select,
            BackendCall::Insert { .. } => Operation::Insert,
            BackendCall::Update { .. } => Operation::Update,
            BackendCall::Delete { .. } => Operation::Delete,
            BackendCall::Upload { .. } => Operation::Upload,
            BackendCall::SignIn { .. } => Operation::SignIn,
            BackendCall::Refresh => Operation::Refresh,
            BackendCall::SignOut => Operation::SignOut,
        }
    }
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    identity: Identity,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Product>>,
    objects: HashMap<String, UploadObject>,
    accounts: HashMap<String, Account>,
    access_tokens: HashMap<String, Identity>,
    refresh_tokens: HashMap<String, Identity>,
    calls: Vec<BackendCall>,
    failures: HashMap<Operation, (u16, String)>,
    last_created: Option<DateTime<Utc>>,
}

pub struct MemoryBackend {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<ChangeEvent>,
    subscribers: Arc<AtomicUsize>,
    public_base: String,
    session_ttl: Duration,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("https://memory.local")
    }
}

impl MemoryBackend {
    pub fn new(public_base: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner::default()),
            changes,
            subscribers: Arc::new(AtomicUsize::new(0)),
            public_base: public_base.into(),
            session_ttl: Duration::hours(1),
        }
    }

    /// Sessions issued from now on expire after `ttl`.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn backend(self: &Arc<Self>) -> Backend {
        Backend {
            rows: self.clone(),
            storage: self.clone(),
            auth: self.clone(),
            realtime: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        identity
    }

    /// Inserts a row directly, without recording a call or notifying anyone.
    pub fn seed(&self, table: &str, draft: ProductDraft) -> Product {
        let mut inner = self.lock();
        let product = new_row(&mut inner, draft);
        inner.tables.entry(table.to_string()).or_default().push(product.clone());
        product
    }

    /// Makes the next call of `operation` fail with the given status and message.
    pub fn fail_next(&self, operation: Operation, status: u16, message: &str) {
        self.lock().failures.insert(operation, (status, message.to_string()));
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, operation: Operation) -> Vec<BackendCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn rows(&self, table: &str) -> Vec<Product> {
        sorted(self.lock().tables.get(table).cloned().unwrap_or_default())
    }

    pub fn object(&self, path: &str) -> Option<UploadObject> {
        self.lock().objects.get(path).cloned()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// Publishes a change as if another client had written the table.
    pub fn notify(&self, table: &str, kind: ChangeKind) {
        let _ = self.changes.send(ChangeEvent {
            table: table.to_string(),
            kind,
        });
    }

    fn begin(&self, call: BackendCall) -> Result<MutexGuard<'_, Inner>, BackendError> {
        let mut inner = self.lock();
        let operation = call.operation();
        inner.calls.push(call);
        let failure = inner.failures.remove(&operation);
        match failure {
            Some((status, message)) => Err(BackendError::api(status, message)),
            None => Ok(inner),
        }
    }

    fn require_user(inner: &Inner, auth: &Authorization) -> Result<Identity, BackendError> {
        match auth {
            Authorization::User(token) => inner
                .access_tokens
                .get(token)
                .cloned()
                .ok_or_else(|| BackendError::api(401, "invalid JWT")),
            Authorization::Anonymous => Err(BackendError::NotAuthenticated),
        }
    }

    fn issue_session(&self, inner: &mut Inner, identity: Identity) -> Session {
        let access_token = Uuid::new_v4().to_string();
        let refresh_token = Uuid::new_v4().to_string();
        inner.access_tokens.insert(access_token.clone(), identity.clone());
        inner.refresh_tokens.insert(refresh_token.clone(), identity.clone());
        Session {
            access_token,
            refresh_token,
            expires_at: Utc::now() + self.session_ttl,
            user: identity,
        }
    }
}

fn new_row(inner: &mut Inner, draft: ProductDraft) -> Product {
    let now = Utc::now();
    let created_at = match inner.last_created {
        Some(last) if last >= now => last + Duration::microseconds(1),
        _ => now,
    };
    inner.last_created = Some(created_at);
    Product {
        id: ProductId::new(Uuid::new_v4().to_string()),
        name: draft.name,
        description: draft.description,
        price: draft.price,
        affiliate_link: draft.affiliate_link,
        image_url: Some(draft.image_url),
        media_type: draft.media_type,
        image_urls: None,
        created_at,
    }
}

fn sorted(mut rows: Vec<Product>) -> Vec<Product> {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

#[async_trait]
impl RowStore for MemoryBackend {
    async fn select_products(
        &self,
        table: &str,
        _auth: &Authorization,
    ) -> Result<Vec<Product>, BackendError> {
        let inner = self.begin(BackendCall::Select {
            table: table.to_string(),
        })?;
        Ok(sorted(inner.tables.get(table).cloned().unwrap_or_default()))
    }

    async fn insert_product(
        &self,
        table: &str,
        draft: &ProductDraft,
        auth: &Authorization,
    ) -> Result<Product, BackendError> {
        let product = {
            let mut inner = self.begin(BackendCall::Insert {
                table: table.to_string(),
                draft: draft.clone(),
            })?;
            Self::require_user(&inner, auth)?;
            let product = new_row(&mut inner, draft.clone());
            inner.tables.entry(table.to_string()).or_default().push(product.clone());
            product
        };
        self.notify(table, ChangeKind::Insert);
        Ok(product)
    }

    async fn update_product(
        &self,
        table: &str,
        id: &ProductId,
        draft: &ProductDraft,
        auth: &Authorization,
    ) -> Result<Product, BackendError> {
        let product = {
            let mut inner = self.begin(BackendCall::Update {
                table: table.to_string(),
                id: id.clone(),
                draft: draft.clone(),
            })?;
            Self::require_user(&inner, auth)?;
            let row = inner
                .tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|row| &row.id == id))
                .ok_or_else(|| BackendError::api(404, format!("product {id} was not updated")))?;
            row.name = draft.name.clone();
            row.description = draft.description.clone();
            row.price = draft.price;
            row.affiliate_link = draft.affiliate_link.clone();
            row.image_url = Some(draft.image_url.clone());
            row.media_type = draft.media_type;
            row.clone()
        };
        self.notify(table, ChangeKind::Update);
        Ok(product)
    }

    async fn delete_product(
        &self,
        table: &str,
        id: &ProductId,
        auth: &Authorization,
    ) -> Result<(), BackendError> {
        {
            let mut inner = self.begin(BackendCall::Delete {
                table: table.to_string(),
                id: id.clone(),
            })?;
            Self::require_user(&inner, auth)?;
            if let Some(rows) = inner.tables.get_mut(table) {
                rows.retain(|row| &row.id != id);
            }
        }
        self.notify(table, ChangeKind::Delete);
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        object: UploadObject,
        auth: &Authorization,
    ) -> Result<(), BackendError> {
        let mut inner = self.begin(BackendCall::Upload {
            bucket: bucket.to_string(),
            path: path.to_string(),
            content_type: object.content_type.clone(),
        })?;
        Self::require_user(&inner, auth)?;
        let key = format!("{bucket}/{path}");
        if inner.objects.contains_key(&key) {
            return Err(BackendError::api(409, "The resource already exists"));
        }
        inner.objects.insert(key, object);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket}/{path}",
            self.public_base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl AuthService for MemoryBackend {
    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, BackendError> {
        let mut inner = self.begin(BackendCall::SignIn {
            email: credentials.email.clone(),
        })?;
        let identity = match inner.accounts.get(&credentials.email) {
            Some(account) if account.password == credentials.password => account.identity.clone(),
            _ => return Err(BackendError::api(400, "Invalid login credentials")),
        };
        Ok(self.issue_session(&mut inner, identity))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let mut inner = self.begin(BackendCall::Refresh)?;
        let identity = inner
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| BackendError::api(400, "Invalid Refresh Token"))?;
        Ok(self.issue_session(&mut inner, identity))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let mut inner = self.begin(BackendCall::SignOut)?;
        inner.access_tokens.remove(access_token);
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(
        &self,
        filter: ChangeFilter,
    ) -> Result<Subscription<ChangeEvent>, BackendError> {
        let (tx, rx) = mpsc::channel(32);
        let mut source = self.changes.subscribe();
        let relay = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) if event.table == filter.table => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.subscribers.fetch_add(1, Ordering::SeqCst);
        let subscribers = self.subscribers.clone();
        Ok(Subscription::new(rx, move || {
            relay.abort();
            subscribers.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}
