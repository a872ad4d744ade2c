use axum::{
    Form, Router,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::post,
};
use serde::Deserialize;

use crate::{
    dashboard::DELETE_PROMPT,
    error::{AppError, AppResult},
    form::{FormError, LocalMedia, ProductFields},
    guard::{ADMIN_ROUTE, LOGIN_ROUTE},
    middleware::session::{BrowserSession, CurrentSession},
    models::{Product, ProductId, Session},
    state::AppState,
    views::{self, ProductCard},
};

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    /// Absent until the admin answered the confirmation page.
    pub confirmed: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/products/new", post(open_create))
        .route("/admin/products/{id}/edit", post(open_edit))
        .route("/admin/products/{id}/delete", post(delete_product))
        .route("/admin/form/submit", post(submit_form))
        .route("/admin/form/media/remove", post(remove_media))
        .route("/admin/form/close", post(close_form))
}

/// The signed-in platform session, if the browser still has one.
async fn platform_session(browser: &BrowserSession) -> Option<Session> {
    match browser.client().get_session().await {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(session_id = %browser.id(), error = %err, "session lookup failed");
            None
        }
    }
}

fn back_to(current: CurrentSession, target: &'static str) -> Response {
    (current.jar, Redirect::to(target)).into_response()
}

async fn find_product(state: &AppState, id: &str) -> AppResult<Product> {
    state
        .feed
        .settled(state.resolve_timeout)
        .await
        .products
        .into_iter()
        .find(|product| product.id.as_str() == id)
        .ok_or(AppError::NotFound)
}

pub async fn open_create(current: CurrentSession) -> Response {
    if platform_session(&current.session).await.is_none() {
        return back_to(current, LOGIN_ROUTE);
    }
    current.session.dashboard().open_create().await;
    back_to(current, ADMIN_ROUTE)
}

pub async fn open_edit(
    State(state): State<AppState>,
    current: CurrentSession,
    Path(id): Path<String>,
) -> AppResult<Response> {
    if platform_session(&current.session).await.is_none() {
        return Ok(back_to(current, LOGIN_ROUTE));
    }
    let product = find_product(&state, &id).await?;
    current.session.dashboard().open_edit(&product).await;
    Ok(back_to(current, ADMIN_ROUTE))
}

pub async fn delete_product(
    State(state): State<AppState>,
    current: CurrentSession,
    Path(id): Path<String>,
    Form(form): Form<DeleteForm>,
) -> AppResult<Response> {
    let Some(session) = platform_session(&current.session).await else {
        return Ok(back_to(current, LOGIN_ROUTE));
    };

    let Some(confirmed) = form.confirmed else {
        let product = find_product(&state, &id).await?;
        let mut context = views::base_context(Some(&session.user), "admin");
        context.insert("prompt", DELETE_PROMPT);
        context.insert("product", &ProductCard::dashboard(&product));
        let page = views::render_template(&state.templates, "confirm_delete.html", &context)?;
        return Ok((current.jar, page).into_response());
    };

    let id = ProductId::new(id);
    let outcome = current
        .session
        .dashboard()
        .delete(&id, &confirmed, &state.admin_context(&session))
        .await;
    tracing::debug!(product_id = %id, ?outcome, "delete handled");
    Ok(back_to(current, ADMIN_ROUTE))
}

pub async fn submit_form(
    State(state): State<AppState>,
    current: CurrentSession,
    multipart: Multipart,
) -> AppResult<Response> {
    let Some(session) = platform_session(&current.session).await else {
        return Ok(back_to(current, LOGIN_ROUTE));
    };

    let (fields, file) = read_product_form(multipart).await?;
    let result = current
        .session
        .dashboard()
        .submit(fields, file, &state.admin_context(&session))
        .await;

    match result {
        Ok(submitted) => {
            tracing::info!(product_id = %submitted.product.id, "product saved");
        }
        // The running submit keeps its own message.
        Err(FormError::Busy) | Err(FormError::Closed) => {}
        Err(err) => {
            tracing::debug!(error = %err, "product form rejected");
        }
    }
    Ok(back_to(current, ADMIN_ROUTE))
}

pub async fn remove_media(current: CurrentSession) -> Response {
    if platform_session(&current.session).await.is_none() {
        return back_to(current, LOGIN_ROUTE);
    }
    if let Err(err) = current.session.dashboard().remove_media().await {
        tracing::debug!(error = %err, "media not removed");
    }
    back_to(current, ADMIN_ROUTE)
}

pub async fn close_form(State(state): State<AppState>, current: CurrentSession) -> Response {
    if platform_session(&current.session).await.is_none() {
        return back_to(current, LOGIN_ROUTE);
    }
    current.session.dashboard().close(&state.feed).await;
    back_to(current, ADMIN_ROUTE)
}

/// Text fields plus the optional `media` file of the product form. An
/// empty file input counts as no selection.
async fn read_product_form(mut multipart: Multipart) -> AppResult<(ProductFields, Option<LocalMedia>)> {
    let mut fields = ProductFields::default();
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "media" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::BadRequest(err.to_string()))?;
            if !file_name.is_empty() && !bytes.is_empty() {
                file = Some(LocalMedia {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|err| AppError::BadRequest(err.to_string()))?;
        match name.as_str() {
            "name" => fields.name = value,
            "description" => fields.description = value,
            "price" => fields.price = value,
            "affiliate_link" => fields.affiliate_link = value,
            _ => {}
        }
    }

    Ok((fields, file))
}
