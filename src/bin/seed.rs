use affiliate_catalog::{
    backend::{Authorization, supabase},
    config::AppConfig,
    media::MediaKind,
    models::{Credentials, ProductDraft},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let credentials = Credentials {
        email: std::env::var("SEED_ADMIN_EMAIL")?,
        password: std::env::var("SEED_ADMIN_PASSWORD")?,
    };

    let backend = supabase::connect(
        &config.supabase_url,
        &config.supabase_anon_key,
        config.realtime_heartbeat,
        config.realtime_reconnect,
    )?;
    let session = backend.auth.sign_in_with_password(&credentials).await?;
    let auth = Authorization::for_session(&session);
    let table = config.catalog.table.as_str();

    let existing = backend.rows.select_products(table, &auth).await?;
    let mut inserted = 0;
    for draft in sample_products(config.catalog.persist_media_type) {
        if existing.iter().any(|product| product.name == draft.name) {
            tracing::info!(name = %draft.name, "already seeded, skipping");
            continue;
        }
        let product = backend.rows.insert_product(table, &draft, &auth).await?;
        tracing::info!(id = %product.id, name = %product.name, "seeded product");
        inserted += 1;
    }

    if let Err(err) = backend.auth.sign_out(&session.access_token).await {
        tracing::warn!(error = %err, "sign out after seeding failed");
    }
    println!("Seed completed. Inserted {inserted} products.");
    Ok(())
}

fn sample_products(persist_media_type: bool) -> Vec<ProductDraft> {
    let kind = |kind: MediaKind| persist_media_type.then_some(kind);
    vec![
        ProductDraft {
            name: "Kaos Polos Premium".into(),
            description: "Kaos katun combed 30s, adem dan nyaman dipakai harian.".into(),
            price: 50000.0,
            affiliate_link: "https://shopee.co.id/kaos-polos-premium".into(),
            image_url: "https://images.unsplash.com/photo-1521572163474-6864f9cf17ab.jpg".into(),
            media_type: kind(MediaKind::Image),
        },
        ProductDraft {
            name: "Sepatu Lari Ringan".into(),
            description: "Sepatu lari dengan sol empuk untuk jarak jauh.".into(),
            price: 349000.0,
            affiliate_link: "https://shopee.co.id/sepatu-lari-ringan".into(),
            image_url: "https://images.unsplash.com/photo-1542291026-7eec264c27ff.jpg".into(),
            media_type: kind(MediaKind::Image),
        },
        ProductDraft {
            name: "Tumbler Stainless 750ml".into(),
            description: "Menjaga minuman tetap dingin hingga 24 jam.".into(),
            price: 89500.0,
            affiliate_link: "https://shopee.co.id/tumbler-stainless".into(),
            image_url: "https://videos.example.com/tumbler-demo.mp4".into(),
            media_type: kind(MediaKind::Video),
        },
    ]
}
