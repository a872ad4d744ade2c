use axum::{
    Json, Router,
    extract::{Path, Query, State},
};

use crate::{
    catalog::filter_products,
    dto::products::{ProductList, ProductQuery},
    error::{AppError, AppResult},
    models::Product,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(list_products))
        .route("/{id}", axum::routing::get(get_product))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductQuery),
    responses(
        (status = 200, description = "List products, newest first", body = ApiResponse<ProductList>),
        (status = 502, description = "Product rows could not be loaded"),
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let snapshot = state.feed.settled(state.resolve_timeout).await;
    if let Some(error) = snapshot.error {
        return Err(AppError::BadGateway(error));
    }

    let items: Vec<Product> = filter_products(&snapshot.products, query.term())
        .into_iter()
        .cloned()
        .collect();
    let meta = Meta::new(items.len() as i64, snapshot.revision);
    Ok(Json(ApiResponse::success(
        "Products",
        ProductList { items },
        Some(meta),
    )))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = String, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Get product", body = ApiResponse<Product>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Products"
)]
pub async fn get_product(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let snapshot = state.feed.settled(state.resolve_timeout).await;
    let product = snapshot
        .products
        .into_iter()
        .find(|product| product.id.as_str() == id)
        .ok_or(AppError::NotFound)?;
    Ok(Json(ApiResponse::success("Product", product, None)))
}
