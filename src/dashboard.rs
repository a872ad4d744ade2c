//! Admin dashboard state for one browser: the open product form, its
//! post-submit close timer, and delete with confirmation.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    audit,
    backend::{Authorization, Backend},
    catalog::CatalogFeed,
    config::CatalogSettings,
    form::{FormError, FormMessage, LocalMedia, ProductFields, ProductForm, SubmitContext, Submitted},
    models::{Product, ProductId, Session},
};

pub const DELETE_PROMPT: &str = "Are you sure you want to delete this product?";

/// Asks the admin to confirm a destructive action.
pub trait Confirmation {
    fn confirm(&self, prompt: &str) -> bool;
}

/// A confirmation answered ahead of time, e.g. by a submitted form field.
impl Confirmation for bool {
    fn confirm(&self, _prompt: &str) -> bool {
        *self
    }
}

#[derive(Debug, Clone, Default)]
pub enum FormState {
    #[default]
    Closed,
    Open(ProductForm),
}

/// What the page can show of the form right now.
#[derive(Debug, Clone)]
pub enum FormView {
    Closed,
    Open(ProductForm),
    /// A submit holds the form.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Cancelled,
    Deleted,
    Failed,
}

/// Collaborators of a dashboard action.
pub struct AdminContext<'a> {
    pub backend: &'a Backend,
    pub settings: &'a CatalogSettings,
    pub feed: &'a Arc<CatalogFeed>,
    pub session: &'a Session,
}

impl AdminContext<'_> {
    fn submit_context(&self) -> SubmitContext<'_> {
        SubmitContext {
            backend: self.backend,
            settings: self.settings,
            session: self.session,
        }
    }
}

#[derive(Default)]
pub struct Dashboard {
    form: Arc<Mutex<FormState>>,
    /// Bumped whenever the form is opened or closed; a close timer only
    /// fires for the generation it was scheduled in.
    generation: Arc<AtomicU64>,
    notice: std::sync::Mutex<Option<FormMessage>>,
    close_timer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open_create(&self) {
        self.transition(FormState::Open(ProductForm::new(None))).await;
    }

    pub async fn open_edit(&self, product: &Product) {
        self.transition(FormState::Open(ProductForm::new(Some(product)))).await;
    }

    /// Closes the form and reloads the rows.
    pub async fn close(&self, feed: &CatalogFeed) {
        self.transition(FormState::Closed).await;
        feed.refetch().await;
    }

    async fn transition(&self, next: FormState) {
        let mut form = self.form.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *form = next;
    }

    pub fn view(&self) -> FormView {
        match self.form.try_lock() {
            Ok(state) => match &*state {
                FormState::Closed => FormView::Closed,
                FormState::Open(form) => FormView::Open(form.clone()),
            },
            Err(_) => FormView::Busy,
        }
    }

    pub async fn remove_media(&self) -> Result<(), FormError> {
        let mut state = self.form.try_lock().map_err(|_| FormError::Busy)?;
        match &mut *state {
            FormState::Open(form) => {
                form.remove_media();
                Ok(())
            }
            FormState::Closed => Err(FormError::Closed),
        }
    }

    /// Applies the submitted fields and file, then runs the submit sequence.
    /// A second submit while one is running is rejected. On success the form
    /// closes after the configured delay unless it was reopened meanwhile.
    pub async fn submit(
        &self,
        fields: ProductFields,
        file: Option<LocalMedia>,
        ctx: &AdminContext<'_>,
    ) -> Result<Submitted, FormError> {
        let mut state = self.form.try_lock().map_err(|_| FormError::Busy)?;
        let FormState::Open(form) = &mut *state else {
            return Err(FormError::Closed);
        };

        form.set_fields(fields);
        if let Some(file) = file {
            form.select_file(file);
        }

        let submitted = form.submit(&ctx.submit_context()).await?;
        let generation = self.generation.load(Ordering::SeqCst);
        drop(state);

        self.schedule_close(generation, &submitted, ctx.feed.clone());
        Ok(submitted)
    }

    fn schedule_close(&self, generation: u64, submitted: &Submitted, feed: Arc<CatalogFeed>) {
        let form = self.form.clone();
        let current = self.generation.clone();
        let delay = submitted.close_after;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = form.lock().await;
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                current.fetch_add(1, Ordering::SeqCst);
                *state = FormState::Closed;
            }
            feed.refetch().await;
        });

        let mut slot = self
            .close_timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(timer) {
            previous.abort();
        }
    }

    /// Deletes one product after confirmation. The list itself refreshes
    /// through the change feed.
    pub async fn delete(
        &self,
        id: &ProductId,
        confirmation: &impl Confirmation,
        ctx: &AdminContext<'_>,
    ) -> DeleteOutcome {
        if !confirmation.confirm(DELETE_PROMPT) {
            return DeleteOutcome::Cancelled;
        }

        let auth = Authorization::for_session(ctx.session);
        let result = ctx
            .backend
            .rows
            .delete_product(&ctx.settings.table, id, &auth)
            .await;

        let (notice, outcome) = match result {
            Ok(()) => {
                audit::record(&ctx.session.user, "product_delete", id);
                (
                    FormMessage {
                        text: "Product deleted successfully!".into(),
                        is_error: false,
                    },
                    DeleteOutcome::Deleted,
                )
            }
            Err(err) => {
                tracing::error!(product_id = %id, error = %err, "failed to delete product");
                (
                    FormMessage {
                        text: format!("Failed to delete product: {err}"),
                        is_error: true,
                    },
                    DeleteOutcome::Failed,
                )
            }
        };
        self.set_notice(notice);
        outcome
    }

    /// The pending alert, shown once.
    pub fn take_notice(&self) -> Option<FormMessage> {
        self.notice
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn set_notice(&self, notice: FormMessage) {
        *self
            .notice
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(notice);
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        let slot = self
            .close_timer
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(timer) = slot.take() {
            timer.abort();
        }
    }
}
