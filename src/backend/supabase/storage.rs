use async_trait::async_trait;
use reqwest::{Method, header::CONTENT_TYPE};

use super::{SupabaseClient, expect_success};
use crate::{
    backend::{Authorization, ObjectStorage, UploadObject},
    error::BackendError,
};

const CACHE_CONTROL: &str = "max-age=3600";

#[async_trait]
impl ObjectStorage for SupabaseClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        object: UploadObject,
        auth: &Authorization,
    ) -> Result<(), BackendError> {
        let path = format!("/storage/v1/object/{bucket}/{}", path.trim_start_matches('/'));
        let response = self
            .request(Method::POST, &path, auth)
            .header(CONTENT_TYPE, object.content_type)
            .header("cache-control", CACHE_CONTROL)
            .header("x-upsert", "false")
            .body(object.bytes)
            .send()
            .await?;
        expect_success(response).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.url(&format!(
            "/storage/v1/object/public/{bucket}/{}",
            path.trim_start_matches('/')
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_urls_point_at_the_public_object_route() {
        let client = SupabaseClient::new("https://demo.supabase.co", "anon").unwrap();
        assert_eq!(
            client.public_url("product_images", "product_images/a.jpg"),
            "https://demo.supabase.co/storage/v1/object/public/product_images/product_images/a.jpg"
        );
    }
}
