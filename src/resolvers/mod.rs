mod registry;
mod traits;

// Service resolvers
pub mod cameran;
pub mod flickr;
pub mod hatena_fotolife;

use std::sync::Arc;

pub use registry::{ProviderListing, Registry, ResolutionOutcome};
pub use traits::{PatternMatch, Provider, Resolver};

use crate::cache::{CachePolicy, ResolverCache};
use crate::config::Config;
use crate::http::HttpFetch;

/// Build the registry of every locally implemented service.
///
/// Page-scraping services cache not-found results for
/// `config.not_found_ttl`; Flickr does not, since its API errors are not
/// cached at all.
#[must_use]
pub fn default_registry(config: &Config, http: &Arc<dyn HttpFetch>, cache: &ResolverCache) -> Registry {
    let scrape_policy = CachePolicy::with_not_found(config.cache_ttl, config.not_found_ttl);
    let api_policy = CachePolicy::positive_only(config.cache_ttl);

    let mut registry = Registry::new();
    registry.register(
        cameran::CameranResolver::new(Arc::clone(http), cache.clone(), scrape_policy)
            .into_provider(),
    );
    registry.register(
        flickr::FlickrResolver::new(
            Arc::clone(http),
            cache.clone(),
            api_policy,
            config.flickr_api_key.clone(),
        )
        .into_provider(),
    );
    registry.register(
        hatena_fotolife::HatenaFotolifeResolver::new(Arc::clone(http), cache.clone(), scrape_policy)
            .into_provider(),
    );
    registry
}
