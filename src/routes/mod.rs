use std::time::Duration;

use axum::{Router, http::Method, routing::get};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub mod admin;
pub mod doc;
pub mod events;
pub mod health;
pub mod pages;
pub mod products;

// Build the routers without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .nest("/products", products::router())
        .layer(cors)
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(pages::router())
        .merge(admin::router())
        .route("/events", get(events::catalog_events))
        .route("/health", get(health::health_check))
        .nest("/api", create_api_router())
}
