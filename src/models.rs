use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::media::{MediaKind, MediaRef};

/// Platform-generated row identifier. The table may use integer or uuid keys,
/// so the value is kept as opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => ProductId(n.to_string()),
            Raw::Text(s) => ProductId(s),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub affiliate_link: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
    /// Legacy multi-media column; only read, never written.
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// The single media reference the dashboard and the form work with.
    pub fn primary_media(&self) -> Option<MediaRef> {
        self.image_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| MediaRef::new(url, self.media_type))
    }

    /// Media shown on the public listing: `image_url` first, then the legacy
    /// array. Thumbnails are the rest of the array when the array supplied
    /// the primary item.
    pub fn listing_media(&self) -> (Option<MediaRef>, Vec<MediaRef>) {
        if let Some(primary) = self.primary_media() {
            let thumbnails = match self.image_urls.as_deref() {
                Some([first, rest @ ..]) if *first == primary.url => {
                    rest.iter().map(|url| MediaRef::new(url.as_str(), None)).collect()
                }
                _ => Vec::new(),
            };
            return (Some(primary), thumbnails);
        }

        match self.image_urls.as_deref() {
            Some([first, rest @ ..]) => (
                Some(MediaRef::new(first.as_str(), None)),
                rest.iter().map(|url| MediaRef::new(url.as_str(), None)).collect(),
            ),
            _ => (None, Vec::new()),
        }
    }
}

/// Row payload written by the product form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub affiliate_link: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens issued by the auth service for one signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}
