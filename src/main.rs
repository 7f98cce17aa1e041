use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_link_resolver::cache::ResolverCache;
use media_link_resolver::config::Config;
use media_link_resolver::http::{HttpFetch, ReqwestFetcher};
use media_link_resolver::legacy::{LegacyFallback, LegacySource};
use media_link_resolver::resolvers::default_registry;
use media_link_resolver::web::{self, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    init_tracing()?;

    info!("Starting media-link-resolver");

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if config.flickr_api_key.is_empty() {
        warn!("FLICKR_API_KEY is not set - Flickr lookups will fail");
    }

    let http: Arc<dyn HttpFetch> = Arc::new(
        ReqwestFetcher::new(config.http_timeout).context("Failed to build HTTP client")?,
    );
    let cache = ResolverCache::new(config.cache_capacity);
    let registry = default_registry(&config, &http, &cache);

    info!(
        providers = registry.providers().len(),
        cache_capacity = config.cache_capacity,
        "Resolver registry ready"
    );

    let legacy = match config.legacy_api_url.as_deref() {
        Some(base) => load_legacy(&config, &http, base).await,
        None => {
            info!("Legacy fallback disabled");
            None
        }
    };

    web::serve(&config, AppState::new(registry, legacy)).await?;

    info!("Shutdown complete");

    Ok(())
}

async fn load_legacy(
    config: &Config,
    http: &Arc<dyn HttpFetch>,
    base: &str,
) -> Option<LegacyFallback> {
    let source = match LegacySource::new(
        Arc::clone(http),
        base,
        config.legacy_service_allowlist.clone(),
    ) {
        Ok(source) => source,
        Err(e) => {
            warn!(url = %base, error = %e, "Invalid legacy URL - fallback disabled");
            return None;
        }
    };

    match LegacyFallback::load(source).await {
        Ok(fallback) => {
            info!(url = %base, services = fallback.providers().len(), "Legacy fallback enabled");
            Some(fallback)
        }
        Err(e) => {
            warn!(url = %base, error = %e, "Failed to load legacy pattern list - fallback disabled");
            None
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,media_link_resolver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
