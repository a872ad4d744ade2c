//! The product form: field state, the single media slot, and the submit
//! sequence (validate, upload, write).

use std::time::Duration;

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::{
    audit,
    backend::{Authorization, Backend, UploadObject},
    config::CatalogSettings,
    error::BackendError,
    media::{self, MediaKind, MediaRef},
    models::{Product, ProductDraft, ProductId, Session},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProductFields {
    #[validate(length(min = 1, message = "Product name is required."))]
    pub name: String,
    #[validate(length(min = 1, message = "Description is required."))]
    pub description: String,
    pub price: String,
    #[validate(
        length(min = 1, message = "Affiliate link is required."),
        url(message = "Affiliate link must be a valid URL.")
    )]
    pub affiliate_link: String,
}

impl ProductFields {
    pub fn from_product(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price.to_string(),
            affiliate_link: product.affiliate_link.clone(),
        }
    }
}

/// A file picked in the browser, not uploaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMedia {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl LocalMedia {
    /// MIME prefix first; the file extension only when the browser sent no
    /// image or video type.
    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_mime(&self.content_type).or_else(|| {
            let ext = media::extension(&self.file_name)?.to_ascii_lowercase();
            match ext.as_str() {
                "mp4" | "mov" | "webm" | "avi" | "mkv" => Some(MediaKind::Video),
                "jpg" | "jpeg" | "png" | "gif" | "webp" | "avif" | "svg" => Some(MediaKind::Image),
                _ => None,
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum MediaSelection {
    #[default]
    Empty,
    Existing(MediaRef),
    Upload(LocalMedia),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PreviewSource {
    Url(String),
    LocalFile(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaPreview {
    pub source: PreviewSource,
    pub kind: Option<MediaKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(ProductId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormMessage {
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, Error)]
pub enum FormError {
    #[error("{0}")]
    Validation(String),

    #[error("Price must be a non-negative number.")]
    InvalidPrice,

    #[error("Product must have primary media (image or video).")]
    MissingMedia,

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("Media already exists in the bucket. Try uploading again or rename the file.")]
    MediaExists,

    #[error("Failed to upload media: {0}")]
    Upload(BackendError),

    #[error("{0}")]
    Save(BackendError),

    #[error("A submission is already in progress.")]
    Busy,

    #[error("The product form is not open.")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct Submitted {
    pub product: Product,
    pub message: String,
    pub close_after: Duration,
}

/// Collaborators one submit needs.
pub struct SubmitContext<'a> {
    pub backend: &'a Backend,
    pub settings: &'a CatalogSettings,
    pub session: &'a Session,
}

#[derive(Debug, Clone)]
pub struct ProductForm {
    mode: FormMode,
    fields: ProductFields,
    media: MediaSelection,
    processing: bool,
    message: Option<FormMessage>,
}

impl ProductForm {
    /// Create mode for `None`, edit mode seeded from the record otherwise.
    pub fn new(target: Option<&Product>) -> Self {
        let mut form = Self {
            mode: FormMode::Create,
            fields: ProductFields::default(),
            media: MediaSelection::Empty,
            processing: false,
            message: None,
        };
        form.retarget(target);
        form
    }

    /// Resets every field to match a new target record.
    pub fn retarget(&mut self, target: Option<&Product>) {
        match target {
            Some(product) => {
                self.mode = FormMode::Edit(product.id.clone());
                self.fields = ProductFields::from_product(product);
                self.media = product
                    .primary_media()
                    .map(MediaSelection::Existing)
                    .unwrap_or_default();
            }
            None => {
                self.mode = FormMode::Create;
                self.fields = ProductFields::default();
                self.media = MediaSelection::Empty;
            }
        }
        self.message = None;
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn fields(&self) -> &ProductFields {
        &self.fields
    }

    pub fn set_fields(&mut self, fields: ProductFields) {
        self.fields = fields;
    }

    pub fn media(&self) -> &MediaSelection {
        &self.media
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn message(&self) -> Option<&FormMessage> {
        self.message.as_ref()
    }

    /// A new file replaces whatever media the form held.
    pub fn select_file(&mut self, file: LocalMedia) {
        self.media = MediaSelection::Upload(file);
        self.message = None;
    }

    pub fn remove_media(&mut self) {
        self.media = MediaSelection::Empty;
    }

    pub fn preview(&self) -> Option<MediaPreview> {
        match &self.media {
            MediaSelection::Empty => None,
            MediaSelection::Existing(media) => Some(MediaPreview {
                source: PreviewSource::Url(media.url.clone()),
                kind: Some(media.kind),
            }),
            MediaSelection::Upload(file) => Some(MediaPreview {
                source: PreviewSource::LocalFile(file.file_name.clone()),
                kind: file.kind(),
            }),
        }
    }

    pub async fn submit(&mut self, ctx: &SubmitContext<'_>) -> Result<Submitted, FormError> {
        self.processing = true;
        self.message = None;
        let result = self.run_submit(ctx).await;
        self.processing = false;

        self.message = Some(match &result {
            Ok(submitted) => FormMessage {
                text: submitted.message.clone(),
                is_error: false,
            },
            Err(err) => {
                tracing::warn!(error = %err, "product submit failed");
                FormMessage {
                    text: format!("Failed: {err}"),
                    is_error: true,
                }
            }
        });
        result
    }

    async fn run_submit(&self, ctx: &SubmitContext<'_>) -> Result<Submitted, FormError> {
        self.fields.validate().map_err(first_violation)?;
        let price = parse_price(&self.fields.price)?;

        if let MediaSelection::Upload(file) = &self.media {
            if file.kind().is_none() {
                return Err(FormError::UnsupportedMedia(file.content_type.clone()));
            }
        }

        let auth = Authorization::for_session(ctx.session);
        let media = match &self.media {
            MediaSelection::Empty => return Err(FormError::MissingMedia),
            MediaSelection::Existing(media) => media.clone(),
            MediaSelection::Upload(file) => upload(ctx, file, &auth).await?,
        };

        let draft = ProductDraft {
            name: self.fields.name.clone(),
            description: self.fields.description.clone(),
            price,
            affiliate_link: self.fields.affiliate_link.clone(),
            image_url: media.url,
            media_type: ctx.settings.persist_media_type.then_some(media.kind),
        };

        let rows = &ctx.backend.rows;
        let table = ctx.settings.table.as_str();
        let (product, message) = match &self.mode {
            FormMode::Edit(id) => {
                let product = rows
                    .update_product(table, id, &draft, &auth)
                    .await
                    .map_err(FormError::Save)?;
                audit::record(&ctx.session.user, "product_update", &product.id);
                (product, "Product updated successfully!")
            }
            FormMode::Create => {
                let product = rows
                    .insert_product(table, &draft, &auth)
                    .await
                    .map_err(FormError::Save)?;
                audit::record(&ctx.session.user, "product_create", &product.id);
                (product, "Product added successfully!")
            }
        };

        Ok(Submitted {
            product,
            message: message.to_string(),
            close_after: ctx.settings.form_close_delay,
        })
    }
}

async fn upload(
    ctx: &SubmitContext<'_>,
    file: &LocalMedia,
    auth: &Authorization,
) -> Result<MediaRef, FormError> {
    let settings = ctx.settings;
    let path = media::unique_object_path(&settings.media_folder, &file.file_name);
    let object = UploadObject {
        bytes: file.bytes.clone(),
        content_type: file.content_type.clone(),
    };

    ctx.backend
        .storage
        .upload(&settings.media_bucket, &path, object, auth)
        .await
        .map_err(|err| {
            if err.is_duplicate() {
                FormError::MediaExists
            } else {
                FormError::Upload(err)
            }
        })?;

    tracing::info!(bucket = %settings.media_bucket, path = %path, "media uploaded");
    let url = ctx.backend.storage.public_url(&settings.media_bucket, &path);
    Ok(MediaRef::new(url, file.kind()))
}

/// Finite, non-negative decimal; surrounding whitespace is ignored.
pub fn parse_price(raw: &str) -> Result<f64, FormError> {
    match raw.trim().parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => Ok(price),
        _ => Err(FormError::InvalidPrice),
    }
}

fn first_violation(errors: ValidationErrors) -> FormError {
    let fields = errors.field_errors();
    let message = ["name", "description", "affiliate_link"]
        .iter()
        .filter_map(|field| fields.get(*field))
        .flat_map(|violations| violations.iter())
        .find_map(|violation| violation.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Please fill in every required field.".to_string());
    FormError::Validation(message)
}
