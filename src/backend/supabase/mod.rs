//! reqwest/websocket client for a Supabase-compatible project.

use std::{sync::Arc, time::Duration};

use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::{
    backend::{Authorization, Backend},
    error::BackendError,
};

mod auth;
pub mod realtime;
mod rest;
mod storage;

pub use realtime::RealtimeClient;

/// HTTP side of the platform: rows, storage and auth share one connection pool.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(project_url: &str, api_key: impl Into<String>) -> Result<Self, BackendError> {
        let base = Url::parse(project_url.trim_end_matches('/'))
            .map_err(|e| BackendError::api(0, format!("invalid project url: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("affiliate-catalog/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base,
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str, auth: &Authorization) -> RequestBuilder {
        let bearer = match auth {
            Authorization::Anonymous => self.api_key.as_str(),
            Authorization::User(token) => token.as_str(),
        };
        self.http
            .request(method, self.url(path))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }
}

/// Builds the backend handle: HTTP services plus the realtime socket.
pub fn connect(
    project_url: &str,
    api_key: &str,
    heartbeat: Duration,
    reconnect_delay: Duration,
) -> Result<Backend, BackendError> {
    let client = Arc::new(SupabaseClient::new(project_url, api_key)?);
    let realtime = RealtimeClient::new(client.base_url(), api_key, heartbeat, reconnect_delay)?;
    Ok(Backend {
        rows: client.clone(),
        storage: client.clone(),
        auth: client,
        realtime: Arc::new(realtime),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(api_error(status.as_u16(), &body));
    }
    Ok(serde_json::from_str(&body)?)
}

async fn expect_success(response: Response) -> Result<(), BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status.as_u16(), &body))
}

/// REST, storage and auth each shape error bodies differently; take the
/// first human-readable field any of them uses.
fn api_error(status: u16, body: &str) -> BackendError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_owned))
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body.trim().to_string()
            }
        });
    BackendError::api(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bodies_from_each_service_are_understood() {
        let rest = api_error(400, r#"{"code":"PGRST204","message":"column missing"}"#);
        assert_eq!(rest.to_string(), "column missing");

        let auth = api_error(400, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#);
        assert_eq!(auth.to_string(), "Invalid login credentials");

        let gotrue = api_error(400, r#"{"code":400,"msg":"Email not confirmed"}"#);
        assert_eq!(gotrue.to_string(), "Email not confirmed");

        let storage = api_error(400, r#"{"statusCode":"409","error":"Duplicate","message":"The resource already exists"}"#);
        assert!(storage.is_duplicate());

        assert_eq!(api_error(502, "").to_string(), "HTTP 502");
        assert_eq!(api_error(500, "oops").to_string(), "oops");
    }

    #[test]
    fn requests_target_the_project() {
        let client = SupabaseClient::new("https://demo.supabase.co/", "anon").unwrap();
        assert_eq!(client.url("/rest/v1/products"), "https://demo.supabase.co/rest/v1/products");
    }
}
