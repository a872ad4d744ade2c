use axum::response::Html;
use serde::Serialize;
use tera::{Context, Tera};

use crate::{
    catalog::FeedSnapshot,
    dashboard::FormView,
    error::AppResult,
    form::{FormMessage, FormMode, PreviewSource, ProductFields},
    media::{MediaKind, MediaRef},
    models::{Identity, Product},
};

pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/300/CCCCCC/808080?text=No+Image";

const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../templates/layout.html")),
    ("product_list.html", include_str!("../templates/product_list.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("admin.html", include_str!("../templates/admin.html")),
    ("product_form.html", include_str!("../templates/product_form.html")),
    ("confirm_delete.html", include_str!("../templates/confirm_delete.html")),
    ("session_pending.html", include_str!("../templates/session_pending.html")),
];

pub fn templates() -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES.iter().copied())?;
    Ok(tera)
}

pub fn render_template(tera: &Tera, template: &str, context: &Context) -> AppResult<Html<String>> {
    let body = tera.render(template, context).inspect_err(|err| {
        tracing::error!(template, error = %err, "failed to render template");
    })?;
    Ok(Html(body))
}

/// Context every page shares: who is signed in and which nav item is active.
pub fn base_context(current_user: Option<&Identity>, current_page: &str) -> Context {
    let mut context = Context::new();
    context.insert("current_user", &current_user);
    context.insert("current_page", current_page);
    context
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaView {
    pub url: String,
    pub is_video: bool,
    pub label: &'static str,
}

impl From<MediaRef> for MediaView {
    fn from(media: MediaRef) -> Self {
        Self {
            url: media.url,
            is_video: media.kind.is_video(),
            label: media.kind.label(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductCard {
    pub id: String,
    pub name: String,
    pub description: String,
    pub excerpt: String,
    pub price: String,
    pub affiliate_link: String,
    pub media: Option<MediaView>,
    pub thumbnails: Vec<MediaView>,
}

impl ProductCard {
    /// Public listing card: legacy gallery rows still show their thumbnails.
    pub fn listing(product: &Product) -> Self {
        let (primary, thumbnails) = product.listing_media();
        Self::build(product, primary, thumbnails)
    }

    /// Dashboard card: only the primary media column counts.
    pub fn dashboard(product: &Product) -> Self {
        Self::build(product, product.primary_media(), Vec::new())
    }

    fn build(product: &Product, primary: Option<MediaRef>, thumbnails: Vec<MediaRef>) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name.clone(),
            description: product.description.clone(),
            excerpt: excerpt(&product.description),
            price: format_rupiah(product.price),
            affiliate_link: product.affiliate_link.clone(),
            media: primary.map(MediaView::from),
            thumbnails: thumbnails.into_iter().map(MediaView::from).collect(),
        }
    }
}

/// The product form as the dashboard template renders it.
#[derive(Debug, Clone, Serialize)]
pub struct FormPanel {
    pub busy: bool,
    pub is_edit: bool,
    pub title: &'static str,
    pub fields: ProductFields,
    pub preview: Option<PreviewPanel>,
    pub message: Option<FormMessage>,
    /// Saved and waiting for the delayed close; the page reloads to pick it up.
    pub closing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewPanel {
    pub url: Option<String>,
    pub file_name: Option<String>,
    pub is_video: bool,
    pub label: &'static str,
}

impl FormPanel {
    pub fn from_view(view: &FormView) -> Option<Self> {
        match view {
            FormView::Closed => None,
            FormView::Busy => Some(Self {
                busy: true,
                is_edit: false,
                title: "Saving product...",
                fields: ProductFields::default(),
                preview: None,
                message: None,
                closing: false,
            }),
            FormView::Open(form) => Some(Self {
                busy: form.is_processing(),
                is_edit: matches!(form.mode(), FormMode::Edit(_)),
                title: match form.mode() {
                    FormMode::Edit(_) => "Edit Product",
                    FormMode::Create => "Add New Product",
                },
                fields: form.fields().clone(),
                preview: form.preview().map(|preview| {
                    let kind = preview.kind.unwrap_or(MediaKind::Image);
                    let (url, file_name) = match preview.source {
                        PreviewSource::Url(url) => (Some(url), None),
                        PreviewSource::LocalFile(name) => (None, Some(name)),
                    };
                    PreviewPanel {
                        url,
                        file_name,
                        is_video: kind.is_video(),
                        label: kind.label(),
                    }
                }),
                message: form.message().cloned(),
                closing: !form.is_processing() && form.message().is_some_and(|message| !message.is_error),
            }),
        }
    }
}

/// Status line shown above the public listing, if any.
pub fn listing_notice(snapshot: &FeedSnapshot, term: &str, matches: usize) -> Option<String> {
    if let Some(error) = &snapshot.error {
        return Some(format!("Failed to load products. Error: {error}"));
    }
    if snapshot.loading {
        return None;
    }
    if snapshot.products.is_empty() && term.is_empty() {
        return Some("There are no affiliate products on display yet.".into());
    }
    if matches == 0 {
        return Some(format!("Product \"{term}\" not found."));
    }
    None
}

pub fn dashboard_notice(snapshot: &FeedSnapshot) -> Option<&'static str> {
    if snapshot.error.is_some() {
        Some("Failed to load product data.")
    } else if !snapshot.loading && snapshot.products.is_empty() {
        Some("No affiliate products have been added yet.")
    } else {
        None
    }
}

/// Indonesian rupiah: `.` groups thousands, `,` separates up to three
/// fraction digits.
pub fn format_rupiah(value: f64) -> String {
    let formatted = format!("{:.3}", value.abs());
    let (whole, fraction) = formatted.split_once('.').unwrap_or((formatted.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && (whole != "0" || !fraction.is_empty()) {
        "-"
    } else {
        ""
    };
    if fraction.is_empty() {
        format!("{sign}Rp{grouped}")
    } else {
        format!("{sign}Rp{grouped},{fraction}")
    }
}

/// First 100 characters followed by an ellipsis.
pub fn excerpt(text: &str) -> String {
    let head: String = text.chars().take(100).collect();
    format!("{head}...")
}
