mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use affiliate_catalog::{
    backend::{
        Authorization, Backend, ChangeKind, ObjectStorage, RowStore, UploadObject,
        memory::{BackendCall, Operation},
    },
    catalog::CatalogFeed,
    dashboard::{AdminContext, Dashboard, DeleteOutcome, FormView},
    error::BackendError,
    form::{FormError, FormMode, MediaSelection, ProductForm},
    media::MediaKind,
    models::{Product, ProductDraft, ProductId},
};
use async_trait::async_trait;
use chrono::Utc;
use common::{Harness, TABLE, draft, eventually, kaos_polos_fields, sample_jpg};
use tokio::sync::Notify;

#[tokio::test]
async fn kaos_polos_uploads_once_and_inserts_once() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let mut form = ProductForm::new(None);
    form.set_fields(kaos_polos_fields());
    form.select_file(sample_jpg());

    let submitted = form.submit(&h.submit_context()).await?;
    assert_eq!(submitted.message, "Product added successfully!");

    let calls = h.memory.calls();
    assert_eq!(calls.len(), 2, "unexpected calls: {calls:?}");
    let BackendCall::Upload { bucket, path, content_type } = &calls[0] else {
        panic!("first call should upload, got {:?}", calls[0]);
    };
    assert_eq!(bucket, "product_images");
    assert!(path.starts_with("product_images/"));
    assert!(path.ends_with(".jpg"));
    assert_eq!(content_type, "image/jpeg");

    let BackendCall::Insert { table, draft } = &calls[1] else {
        panic!("second call should insert, got {:?}", calls[1]);
    };
    assert_eq!(table, TABLE);
    assert_eq!(draft.name, "Kaos Polos");
    assert_eq!(draft.price, 50000.0);
    assert_eq!(draft.affiliate_link, "https://shopee.co.id/x");
    assert_eq!(
        draft.image_url,
        format!("https://memory.local/storage/v1/object/public/product_images/{path}")
    );
    assert_eq!(draft.media_type, Some(MediaKind::Image));

    assert!(h.memory.object(&format!("product_images/{path}")).is_some());
    let message = form.message().expect("form message");
    assert!(!message.is_error);
    assert!(!form.is_processing());
    Ok(())
}

#[tokio::test]
async fn editing_issues_one_update_keyed_by_id() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let existing = h.seed("Kemeja Flanel", "https://cdn.test/kemeja.jpg");

    let mut form = ProductForm::new(Some(&existing));
    let mut fields = form.fields().clone();
    fields.price = "99000".into();
    form.set_fields(fields);

    let submitted = form.submit(&h.submit_context()).await?;
    assert_eq!(submitted.message, "Product updated successfully!");

    let calls = h.memory.calls();
    assert_eq!(calls.len(), 1, "unexpected calls: {calls:?}");
    let BackendCall::Update { id, draft, .. } = &calls[0] else {
        panic!("expected an update, got {:?}", calls[0]);
    };
    assert_eq!(id, &existing.id);
    assert_eq!(draft.price, 99000.0);
    assert_eq!(draft.image_url, "https://cdn.test/kemeja.jpg");
    assert_eq!(h.memory.rows(TABLE)[0].price, 99000.0);
    Ok(())
}

#[tokio::test]
async fn replacing_media_during_edit_uploads_the_new_file() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let existing = h.seed("Topi", "https://cdn.test/topi.jpg");

    let mut form = ProductForm::new(Some(&existing));
    form.select_file(sample_jpg());
    assert!(matches!(form.media(), MediaSelection::Upload(_)));
    form.submit(&h.submit_context()).await?;

    assert_eq!(h.memory.calls_of(Operation::Upload).len(), 1);
    let updates = h.memory.calls_of(Operation::Update);
    let [BackendCall::Update { draft, .. }] = updates.as_slice() else {
        panic!("expected one update, got {updates:?}");
    };
    assert_ne!(draft.image_url, "https://cdn.test/topi.jpg");
    Ok(())
}

#[tokio::test]
async fn non_numeric_price_is_rejected_before_any_call() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let mut form = ProductForm::new(None);
    let mut fields = kaos_polos_fields();
    fields.price = "abc".into();
    form.set_fields(fields);
    form.select_file(sample_jpg());

    let err = form.submit(&h.submit_context()).await.unwrap_err();
    assert!(matches!(err, FormError::InvalidPrice));
    assert!(h.memory.calls().is_empty());
    assert_eq!(
        form.message().map(|m| m.text.as_str()),
        Some("Failed: Price must be a non-negative number.")
    );
    Ok(())
}

#[tokio::test]
async fn missing_media_is_rejected_before_any_call() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let mut form = ProductForm::new(None);
    form.set_fields(kaos_polos_fields());

    let err = form.submit(&h.submit_context()).await.unwrap_err();
    assert!(matches!(err, FormError::MissingMedia));
    assert!(h.memory.calls().is_empty());
    assert_eq!(
        form.message().map(|m| m.text.as_str()),
        Some("Failed: Product must have primary media (image or video).")
    );
    Ok(())
}

#[tokio::test]
async fn removing_existing_media_blocks_the_update() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let existing = h.seed("Dompet", "https://cdn.test/dompet.jpg");
    let mut form = ProductForm::new(Some(&existing));
    form.remove_media();

    let err = form.submit(&h.submit_context()).await.unwrap_err();
    assert!(matches!(err, FormError::MissingMedia));
    assert!(h.memory.calls_of(Operation::Update).is_empty());
    Ok(())
}

#[tokio::test]
async fn name_collision_in_the_bucket_stops_the_insert() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    h.memory.fail_next(Operation::Upload, 409, "The resource already exists");

    let mut form = ProductForm::new(None);
    form.set_fields(kaos_polos_fields());
    form.select_file(sample_jpg());

    let err = form.submit(&h.submit_context()).await.unwrap_err();
    assert!(matches!(err, FormError::MediaExists));
    assert!(h.memory.calls_of(Operation::Insert).is_empty());
    assert_eq!(
        form.message().map(|m| m.text.as_str()),
        Some("Failed: Media already exists in the bucket. Try uploading again or rename the file.")
    );
    Ok(())
}

#[tokio::test]
async fn other_upload_failures_report_the_platform_message() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    h.memory.fail_next(Operation::Upload, 404, "Bucket not found");

    let mut form = ProductForm::new(None);
    form.set_fields(kaos_polos_fields());
    form.select_file(sample_jpg());

    let err = form.submit(&h.submit_context()).await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to upload media: Bucket not found");
    assert!(h.memory.calls_of(Operation::Insert).is_empty());
    Ok(())
}

#[tokio::test]
async fn unsupported_files_are_rejected() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let mut form = ProductForm::new(None);
    form.set_fields(kaos_polos_fields());
    let mut file = sample_jpg();
    file.file_name = "katalog.pdf".into();
    file.content_type = "application/pdf".into();
    form.select_file(file);

    let err = form.submit(&h.submit_context()).await.unwrap_err();
    assert!(matches!(err, FormError::UnsupportedMedia(_)));
    assert!(h.memory.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_needs_confirmation() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let product = h.seed("Jaket", "https://cdn.test/jaket.jpg");
    let dashboard = Dashboard::new();

    let outcome = dashboard.delete(&product.id, &false, &h.admin_context()).await;
    assert_eq!(outcome, DeleteOutcome::Cancelled);
    assert!(h.memory.calls().is_empty());
    assert!(dashboard.take_notice().is_none());

    let outcome = dashboard.delete(&product.id, &true, &h.admin_context()).await;
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(
        h.memory.calls(),
        vec![BackendCall::Delete {
            table: TABLE.into(),
            id: product.id.clone(),
        }]
    );
    assert_eq!(
        dashboard.take_notice().map(|n| n.text),
        Some("Product deleted successfully!".to_string())
    );
    assert!(h.memory.rows(TABLE).is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_delete_is_reported() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let product = h.seed("Jaket", "https://cdn.test/jaket.jpg");
    h.memory.fail_next(Operation::Delete, 403, "permission denied for table products");
    let dashboard = Dashboard::new();

    let outcome = dashboard.delete(&product.id, &true, &h.admin_context()).await;
    assert_eq!(outcome, DeleteOutcome::Failed);
    let notice = dashboard.take_notice().expect("notice");
    assert!(notice.is_error);
    assert_eq!(
        notice.text,
        "Failed to delete product: permission denied for table products"
    );
    assert_eq!(h.memory.rows(TABLE).len(), 1);
    Ok(())
}

#[tokio::test]
async fn listing_is_newest_first_after_mixed_writes() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let auth = Authorization::for_session(&h.session);
    let rows = &h.backend.rows;

    let first = rows.insert_product(TABLE, &draft("Satu", 1.0, "https://c/1.jpg"), &auth).await?;
    rows.insert_product(TABLE, &draft("Dua", 2.0, "https://c/2.jpg"), &auth).await?;
    rows.insert_product(TABLE, &draft("Tiga", 3.0, "https://c/3.mp4"), &auth).await?;
    rows.update_product(TABLE, &first.id, &draft("Satu Baru", 1.5, "https://c/1.jpg"), &auth)
        .await?;
    rows.insert_product(TABLE, &draft("Empat", 4.0, "https://c/4.jpg"), &auth).await?;

    h.feed.refetch().await;
    let snapshot = h.feed.snapshot();
    let names: Vec<_> = snapshot.products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Empat", "Tiga", "Dua", "Satu Baru"]);
    assert!(snapshot
        .products
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at));
    assert!(!snapshot.loading);
    assert_eq!(snapshot.revision, 1);
    Ok(())
}

#[tokio::test]
async fn failed_fetch_clears_rows_and_keeps_the_error() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    h.seed("Kaos", "https://c/k.jpg");
    h.feed.refetch().await;
    assert_eq!(h.feed.snapshot().products.len(), 1);

    h.memory.fail_next(Operation::Select, 500, "connection reset");
    h.feed.refetch().await;
    let snapshot = h.feed.snapshot();
    assert!(snapshot.products.is_empty());
    assert_eq!(snapshot.error.as_deref(), Some("connection reset"));
    assert!(!snapshot.loading);
    Ok(())
}

#[tokio::test]
async fn change_events_trigger_a_refetch() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let _handle = h.feed.start(h.backend.realtime.clone(), &h.settings.realtime_channel);
    h.feed.settled(Duration::from_secs(1)).await;
    assert!(eventually(|| h.memory.active_subscriptions() == 1).await);

    h.seed("Masuk Diam-diam", "https://c/x.jpg");
    h.memory.notify(TABLE, ChangeKind::Insert);

    let mut rx = h.feed.watch();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(1),
        rx.wait_for(|state| state.products.len() == 1),
    )
    .await??
    .clone();
    assert_eq!(snapshot.products[0].name, "Masuk Diam-diam");
    assert!(snapshot.revision >= 2);

    h.memory.notify("other_table", ChangeKind::Insert);
    h.memory.clear_calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.memory.calls_of(Operation::Select).is_empty());
    Ok(())
}

#[tokio::test]
async fn dropping_the_feed_handle_releases_the_subscription() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let handle = h.feed.start(h.backend.realtime.clone(), &h.settings.realtime_channel);
    assert!(eventually(|| h.memory.active_subscriptions() == 1).await);

    drop(handle);
    assert!(eventually(|| h.memory.active_subscriptions() == 0).await);
    Ok(())
}

#[tokio::test]
async fn successful_submit_closes_the_form_after_the_delay() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let dashboard = Dashboard::new();
    dashboard.open_create().await;

    dashboard
        .submit(kaos_polos_fields(), Some(sample_jpg()), &h.admin_context())
        .await?;
    match dashboard.view() {
        FormView::Open(form) => {
            assert_eq!(
                form.message().map(|m| m.text.as_str()),
                Some("Product added successfully!")
            );
        }
        other => panic!("form should stay open until the delay passes, got {other:?}"),
    }

    assert!(eventually(|| matches!(dashboard.view(), FormView::Closed)).await);
    assert!(eventually(|| h.feed.snapshot().products.len() == 1).await);
    Ok(())
}

#[tokio::test]
async fn a_stale_close_timer_leaves_a_reopened_form_alone() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let other = h.seed("Sepatu", "https://c/sepatu.webm");
    let dashboard = Dashboard::new();
    dashboard.open_create().await;
    dashboard
        .submit(kaos_polos_fields(), Some(sample_jpg()), &h.admin_context())
        .await?;

    dashboard.open_edit(&other).await;
    tokio::time::sleep(h.settings.form_close_delay * 4).await;

    let FormView::Open(form) = dashboard.view() else {
        panic!("edit form should still be open");
    };
    assert!(matches!(form.mode(), FormMode::Edit(_)));
    assert_eq!(form.fields().name, "Sepatu");
    Ok(())
}

#[tokio::test]
async fn failed_submit_keeps_the_form_open_with_its_message() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let dashboard = Dashboard::new();
    dashboard.open_create().await;

    let err = dashboard
        .submit(kaos_polos_fields(), None, &h.admin_context())
        .await
        .unwrap_err();
    assert!(matches!(err, FormError::MissingMedia));

    tokio::time::sleep(h.settings.form_close_delay * 3).await;
    let FormView::Open(form) = dashboard.view() else {
        panic!("form should stay open");
    };
    assert_eq!(form.fields().name, "Kaos Polos");
    assert!(form.message().is_some_and(|m| m.is_error));
    Ok(())
}

#[tokio::test]
async fn submitting_without_an_open_form_is_rejected() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let dashboard = Dashboard::new();
    let err = dashboard
        .submit(kaos_polos_fields(), Some(sample_jpg()), &h.admin_context())
        .await
        .unwrap_err();
    assert!(matches!(err, FormError::Closed));
    assert!(h.memory.calls().is_empty());
    Ok(())
}

/// Each read waits its own delay. The first read still sees a row that later
/// reads no longer return.
struct LaggingReads {
    reads: AtomicUsize,
    delays_ms: Vec<u64>,
}

impl LaggingReads {
    fn new(delays_ms: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            reads: AtomicUsize::new(0),
            delays_ms: delays_ms.to_vec(),
        })
    }
}

#[async_trait]
impl RowStore for LaggingReads {
    async fn select_products(
        &self,
        _table: &str,
        _auth: &Authorization,
    ) -> Result<Vec<Product>, BackendError> {
        let read = self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays_ms.get(read).copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if read == 0 {
            return Ok(vec![Product {
                id: ProductId::new("gone"),
                name: "Sudah Dihapus".into(),
                description: String::new(),
                price: 1000.0,
                affiliate_link: "https://shopee.co.id/gone".into(),
                image_url: Some("https://c/gone.jpg".into()),
                media_type: None,
                image_urls: None,
                created_at: Utc::now(),
            }]);
        }
        Ok(Vec::new())
    }

    async fn insert_product(
        &self,
        _table: &str,
        _draft: &ProductDraft,
        _auth: &Authorization,
    ) -> Result<Product, BackendError> {
        Err(BackendError::api(405, "read only"))
    }

    async fn update_product(
        &self,
        _table: &str,
        _id: &ProductId,
        _draft: &ProductDraft,
        _auth: &Authorization,
    ) -> Result<Product, BackendError> {
        Err(BackendError::api(405, "read only"))
    }

    async fn delete_product(
        &self,
        _table: &str,
        _id: &ProductId,
        _auth: &Authorization,
    ) -> Result<(), BackendError> {
        Err(BackendError::api(405, "read only"))
    }
}

#[tokio::test]
async fn an_older_fetch_landing_late_does_not_replace_newer_rows() -> anyhow::Result<()> {
    let feed = CatalogFeed::new(LaggingReads::new(&[100, 0]), TABLE);

    let older = feed.refetch();
    let newer = async {
        // Let the older read start first.
        tokio::time::sleep(Duration::from_millis(10)).await;
        feed.refetch().await;
        let snapshot = feed.snapshot();
        assert!(snapshot.products.is_empty());
        assert!(!snapshot.loading);
        snapshot.revision
    };
    let ((), revision) = tokio::join!(older, newer);

    let snapshot = feed.snapshot();
    assert!(snapshot.products.is_empty(), "stale rows came back: {:?}", snapshot.products);
    assert_eq!(snapshot.revision, revision);
    assert!(!snapshot.loading);
    Ok(())
}

#[tokio::test]
async fn loading_holds_until_the_newest_fetch_lands() -> anyhow::Result<()> {
    let feed = CatalogFeed::new(LaggingReads::new(&[30, 100]), TABLE);

    let first = feed.refetch();
    let second = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        feed.refetch().await;
    };
    let check = async {
        tokio::time::sleep(Duration::from_millis(60)).await;
        let snapshot = feed.snapshot();
        (snapshot.loading, snapshot.products.len())
    };
    let ((), (), (loading_midway, rows_midway)) = tokio::join!(first, second, check);
    assert!(loading_midway, "the second fetch was still in flight");
    assert_eq!(rows_midway, 1);

    let snapshot = feed.snapshot();
    assert!(!snapshot.loading);
    assert!(snapshot.products.is_empty());
    Ok(())
}

#[tokio::test]
async fn a_resync_after_reconnect_reloads_the_rows() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let _handle = h.feed.start(h.backend.realtime.clone(), &h.settings.realtime_channel);
    h.feed.settled(Duration::from_secs(1)).await;
    assert!(eventually(|| h.memory.active_subscriptions() == 1).await);

    // Written while the socket was down; no change event was delivered for it.
    h.seed("Selama Putus", "https://c/putus.jpg");
    h.memory.notify(TABLE, ChangeKind::Resync);

    assert!(eventually(|| h.feed.snapshot().products.len() == 1).await);
    Ok(())
}

/// Holds every upload until released.
#[derive(Default)]
struct HeldUploads {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ObjectStorage for HeldUploads {
    async fn upload(
        &self,
        _bucket: &str,
        _path: &str,
        _object: UploadObject,
        _auth: &Authorization,
    ) -> Result<(), BackendError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://cdn.test/{bucket}/{path}")
    }
}

#[tokio::test]
async fn a_second_submit_while_one_is_running_is_busy() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let uploads = Arc::new(HeldUploads::default());
    let backend = Backend {
        storage: uploads.clone(),
        ..h.backend.clone()
    };
    let ctx = AdminContext {
        backend: &backend,
        settings: &h.settings,
        feed: &h.feed,
        session: &h.session,
    };
    let dashboard = Dashboard::new();
    dashboard.open_create().await;

    let first = dashboard.submit(kaos_polos_fields(), Some(sample_jpg()), &ctx);
    let second = async {
        uploads.entered.notified().await;
        let busy_view = matches!(dashboard.view(), FormView::Busy);
        let second = dashboard.submit(kaos_polos_fields(), Some(sample_jpg()), &ctx).await;
        uploads.release.notify_one();
        (busy_view, second)
    };
    let (first, (busy_view, second)) = tokio::join!(first, second);

    assert!(busy_view);
    let err = second.unwrap_err();
    assert!(matches!(err, FormError::Busy));
    assert_eq!(err.to_string(), "A submission is already in progress.");
    assert_eq!(first?.message, "Product added successfully!");
    assert_eq!(h.memory.calls_of(Operation::Insert).len(), 1);
    Ok(())
}
