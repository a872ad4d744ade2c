use std::{env, str::FromStr, time::Duration};

/// Where product rows and media live on the platform, and how the form behaves.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub table: String,
    pub media_bucket: String,
    pub media_folder: String,
    pub realtime_channel: String,
    pub form_close_delay: Duration,
    pub persist_media_type: bool,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            table: "products".to_string(),
            media_bucket: "product_images".to_string(),
            media_folder: "product_images".to_string(),
            realtime_channel: "product_changes".to_string(),
            form_close_delay: Duration::from_millis(1000),
            persist_media_type: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub host: String,
    pub port: u16,
    pub catalog: CatalogSettings,
    pub session_idle_ttl: Duration,
    pub session_resolve_timeout: Duration,
    pub cookie_secure: bool,
    pub max_upload_bytes: usize,
    pub realtime_heartbeat: Duration,
    pub realtime_reconnect: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let supabase_url = env::var("SUPABASE_URL")?;
        let supabase_anon_key = env::var("SUPABASE_ANON_KEY")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parsed("APP_PORT", 3000);

        let defaults = CatalogSettings::default();
        let catalog = CatalogSettings {
            table: env::var("CATALOG_TABLE").unwrap_or(defaults.table),
            media_bucket: env::var("CATALOG_MEDIA_BUCKET").unwrap_or(defaults.media_bucket),
            media_folder: env::var("CATALOG_MEDIA_FOLDER").unwrap_or(defaults.media_folder),
            realtime_channel: env::var("CATALOG_REALTIME_CHANNEL")
                .unwrap_or(defaults.realtime_channel),
            form_close_delay: Duration::from_millis(parsed("CATALOG_FORM_CLOSE_DELAY_MS", 1000)),
            persist_media_type: parsed("CATALOG_PERSIST_MEDIA_TYPE", true),
        };

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            host,
            port,
            catalog,
            session_idle_ttl: Duration::from_secs(60 * parsed("SESSION_IDLE_MINUTES", 60u64)),
            session_resolve_timeout: Duration::from_millis(parsed(
                "SESSION_RESOLVE_TIMEOUT_MS",
                2000,
            )),
            cookie_secure: parsed("SESSION_COOKIE_SECURE", false),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            realtime_heartbeat: Duration::from_secs(parsed("REALTIME_HEARTBEAT_SECS", 25)),
            realtime_reconnect: Duration::from_secs(parsed("REALTIME_RECONNECT_SECS", 5)),
        })
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
