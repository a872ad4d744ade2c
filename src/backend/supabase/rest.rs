use async_trait::async_trait;
use reqwest::Method;

use super::{SupabaseClient, decode, expect_success};
use crate::{
    backend::{Authorization, RowStore},
    error::BackendError,
    models::{Product, ProductDraft, ProductId},
};

fn table_path(table: &str) -> String {
    format!("/rest/v1/{table}")
}

fn id_filter(id: &ProductId) -> String {
    format!("eq.{}", id.as_str())
}

#[async_trait]
impl RowStore for SupabaseClient {
    async fn select_products(
        &self,
        table: &str,
        auth: &Authorization,
    ) -> Result<Vec<Product>, BackendError> {
        let response = self
            .request(Method::GET, &table_path(table), auth)
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;
        decode(response).await
    }

    async fn insert_product(
        &self,
        table: &str,
        draft: &ProductDraft,
        auth: &Authorization,
    ) -> Result<Product, BackendError> {
        let response = self
            .request(Method::POST, &table_path(table), auth)
            .header("Prefer", "return=representation")
            .json(&[draft])
            .send()
            .await?;
        let rows: Vec<Product> = decode(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::api(500, "insert returned no row"))
    }

    async fn update_product(
        &self,
        table: &str,
        id: &ProductId,
        draft: &ProductDraft,
        auth: &Authorization,
    ) -> Result<Product, BackendError> {
        let response = self
            .request(Method::PATCH, &table_path(table), auth)
            .query(&[("id", id_filter(id))])
            .header("Prefer", "return=representation")
            .json(draft)
            .send()
            .await?;
        let rows: Vec<Product> = decode(response).await?;
        // Row level security turns a forbidden update into an empty result.
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::api(404, format!("product {id} was not updated")))
    }

    async fn delete_product(
        &self,
        table: &str,
        id: &ProductId,
        auth: &Authorization,
    ) -> Result<(), BackendError> {
        let response = self
            .request(Method::DELETE, &table_path(table), auth)
            .query(&[("id", id_filter(id))])
            .send()
            .await?;
        expect_success(response).await
    }
}
