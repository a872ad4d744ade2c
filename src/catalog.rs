//! Product rows as the listing and the dashboard see them.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    backend::{Authorization, ChangeFeed, ChangeFilter, RowStore},
    models::Product,
};

#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub products: Vec<Product>,
    pub loading: bool,
    pub error: Option<String>,
    /// Bumped after every applied fetch.
    pub revision: u64,
    /// Sequence number of the fetch the rows came from.
    applied: u64,
}

pub struct CatalogFeed {
    rows: Arc<dyn RowStore>,
    table: String,
    state: watch::Sender<FeedSnapshot>,
    started: AtomicU64,
}

impl CatalogFeed {
    pub fn new(rows: Arc<dyn RowStore>, table: impl Into<String>) -> Arc<Self> {
        let (state, _) = watch::channel(FeedSnapshot {
            loading: true,
            ..FeedSnapshot::default()
        });
        Arc::new(Self {
            rows,
            table: table.into(),
            state,
            started: AtomicU64::new(0),
        })
    }

    /// Replaces the row set with a fresh ordered read. A failed read clears
    /// the rows and records the error instead. Fetches may overlap: a result
    /// older than the one already applied is dropped, and `loading` stays set
    /// until the newest fetch has landed.
    pub async fn refetch(&self) {
        let seq = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let result = self
            .rows
            .select_products(&self.table, &Authorization::Anonymous)
            .await;

        self.state.send_if_modified(|state| {
            if seq < state.applied {
                tracing::debug!(table = %self.table, seq, applied = state.applied, "dropping stale product fetch");
                return false;
            }
            match result {
                Ok(products) => {
                    state.products = products;
                    state.error = None;
                }
                Err(err) => {
                    tracing::error!(table = %self.table, error = %err, "failed to load products");
                    state.error = Some(err.to_string());
                    state.products.clear();
                }
            }
            state.applied = seq;
            state.loading = self.started.load(Ordering::SeqCst) > seq;
            state.revision += 1;
            true
        });
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.state.borrow().clone()
    }

    /// Snapshot once no fetch is in flight, or whatever holds at the deadline.
    pub async fn settled(&self, timeout: Duration) -> FeedSnapshot {
        let mut rx = self.state.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|state| !state.loading)).await {
            Ok(Ok(state)) => state.clone(),
            _ => self.snapshot(),
        }
    }

    pub fn watch(&self) -> watch::Receiver<FeedSnapshot> {
        self.state.subscribe()
    }

    /// Loads the rows and keeps them current: every change on the table
    /// triggers a full refetch. Dropping the handle stops the feed and
    /// releases the change subscription.
    pub fn start(self: &Arc<Self>, changes: Arc<dyn ChangeFeed>, channel: &str) -> FeedHandle {
        let feed = self.clone();
        let filter = ChangeFilter::all_events(channel, self.table.clone());

        let task = tokio::spawn(async move {
            let subscription = match changes.subscribe(filter).await {
                Ok(subscription) => Some(subscription),
                Err(err) => {
                    tracing::warn!(table = %feed.table, error = %err, "realtime unavailable");
                    None
                }
            };

            feed.refetch().await;

            let Some(mut subscription) = subscription else {
                return;
            };
            while let Some(event) = subscription.recv().await {
                tracing::debug!(table = %event.table, kind = ?event.kind, "change received, reloading products");
                feed.refetch().await;
            }
        });

        FeedHandle { task }
    }
}

pub struct FeedHandle {
    task: JoinHandle<()>,
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Products whose name contains `term`, ignoring case. An empty term keeps all.
pub fn filter_products<'a>(products: &'a [Product], term: &str) -> Vec<&'a Product> {
    if term.is_empty() {
        return products.iter().collect();
    }
    let needle = term.to_lowercase();
    products
        .iter()
        .filter(|product| product.name.to_lowercase().contains(&needle))
        .collect()
}
