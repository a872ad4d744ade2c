use axum::{
    Form, Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};

use crate::{
    catalog::filter_products,
    dto::products::ProductQuery,
    error::AppResult,
    guard::{self, ADMIN_ROUTE, Guarded},
    middleware::session::{CurrentSession, KnownSession},
    models::{Credentials, Identity},
    state::AppState,
    views::{self, FormPanel, PLACEHOLDER_IMAGE, ProductCard},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(product_list))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .route(ADMIN_ROUTE, get(admin_dashboard))
}

pub async fn product_list(
    State(state): State<AppState>,
    KnownSession(known): KnownSession,
    Query(query): Query<ProductQuery>,
) -> AppResult<Response> {
    let identity = known
        .as_ref()
        .and_then(|session| session.auth().status().identity().cloned());
    let snapshot = state.feed.settled(state.resolve_timeout).await;
    let term = query.term();

    let cards: Vec<ProductCard> = filter_products(&snapshot.products, term)
        .into_iter()
        .map(ProductCard::listing)
        .collect();

    let mut context = views::base_context(identity.as_ref(), "products");
    context.insert("q", term);
    context.insert("products", &cards);
    context.insert("loading", &snapshot.loading);
    context.insert("notice", &views::listing_notice(&snapshot, term, cards.len()));
    context.insert("failed", &snapshot.error.is_some());
    context.insert("placeholder", PLACEHOLDER_IMAGE);
    context.insert("revision", &snapshot.revision);

    let page = views::render_template(&state.templates, "product_list.html", &context)?;
    Ok(page.into_response())
}

pub async fn login_page(State(state): State<AppState>, current: CurrentSession) -> AppResult<Response> {
    let status = current.session.auth().resolved(state.resolve_timeout).await;
    if let Some(target) = guard::login_redirect(&status) {
        return Ok((current.jar, Redirect::to(target)).into_response());
    }
    render_login(&state, current, None, "")
}

pub async fn login(
    State(state): State<AppState>,
    current: CurrentSession,
    Form(credentials): Form<Credentials>,
) -> AppResult<Response> {
    let browser = current.session.clone();
    let auth = browser.auth();
    let result = auth.client().sign_in_with_password(&credentials).await;
    match result {
        Ok(session) => {
            tracing::info!(user_id = %session.user.id, "admin signed in");
            auth.wait_until(state.resolve_timeout, |status| status.identity().is_some())
                .await;
            Ok((current.jar, Redirect::to(ADMIN_ROUTE)).into_response())
        }
        Err(err) => {
            tracing::warn!(email = %credentials.email, error = %err, "sign in failed");
            let message = format!("Login failed: {err}");
            render_login(&state, current, Some(message), &credentials.email)
        }
    }
}

fn render_login(
    state: &AppState,
    current: CurrentSession,
    message: Option<String>,
    email: &str,
) -> AppResult<Response> {
    let mut context = views::base_context(None, "login");
    context.insert("message", &message);
    context.insert("email", email);
    let page = views::render_template(&state.templates, "login.html", &context)?;
    Ok((current.jar, page).into_response())
}

pub async fn logout(State(state): State<AppState>, current: CurrentSession) -> Response {
    let auth = current.session.auth();
    // Failures are logged by the auth state; the local session ends either way.
    let _ = auth.sign_out().await;
    auth.wait_until(state.resolve_timeout, |status| status.identity().is_none())
        .await;
    (current.jar, Redirect::to("/")).into_response()
}

pub async fn admin_dashboard(State(state): State<AppState>, current: CurrentSession) -> AppResult<Response> {
    let status = current.session.auth().resolved(state.resolve_timeout).await;

    match guard::protect(&status, Identity::clone) {
        Guarded::Pending => {
            let context = views::base_context(None, "admin");
            let page = views::render_template(&state.templates, "session_pending.html", &context)?;
            Ok((current.jar, page).into_response())
        }
        Guarded::Redirect(target) => Ok((current.jar, Redirect::to(target)).into_response()),
        Guarded::Render(identity) => {
            let dashboard = current.session.dashboard();
            let snapshot = state.feed.settled(state.resolve_timeout).await;
            let cards: Vec<ProductCard> = snapshot.products.iter().map(ProductCard::dashboard).collect();
            let form = FormPanel::from_view(&dashboard.view());

            let mut context = views::base_context(Some(&identity), "admin");
            context.insert("identity", &identity);
            context.insert("products", &cards);
            context.insert("loading", &snapshot.loading);
            context.insert("notice", &views::dashboard_notice(&snapshot));
            context.insert("failed", &snapshot.error.is_some());
            context.insert("alert", &dashboard.take_notice());
            context.insert("form", &form);
            context.insert("placeholder", PLACEHOLDER_IMAGE);
            context.insert("revision", &snapshot.revision);
            context.insert("close_delay_ms", &(state.settings.form_close_delay.as_millis() as u64));

            let page = views::render_template(&state.templates, "admin.html", &context)?;
            Ok((current.jar, page).into_response())
        }
    }
}
