use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde::Serialize;
use tracing::{debug, warn};

use super::traits::Provider;
use crate::error::{ErrorKind, ResolveError};
use crate::image::ImageInfo;

/// Result of resolving one URL.
#[derive(Debug)]
pub enum ResolutionOutcome<'a> {
    /// No registered pattern matched the URL.
    NoMatch,
    /// The resolver succeeded. `images` may be empty.
    Resolved {
        provider: &'a Provider,
        images: Vec<ImageInfo>,
    },
    /// The resolver failed.
    Failed {
        provider: &'a Provider,
        error: ResolveError,
    },
}

impl ResolutionOutcome<'_> {
    #[must_use]
    pub fn provider(&self) -> Option<&Provider> {
        match self {
            Self::NoMatch => None,
            Self::Resolved { provider, .. } | Self::Failed { provider, .. } => Some(provider),
        }
    }

    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { error, .. } => Some(error.kind()),
            _ => None,
        }
    }
}

/// Entry of the provider listing, serialized as `{"name", "regex"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderListing {
    pub name: String,
    pub regex: String,
}

/// Ordered collection of providers and the dispatcher over them.
#[derive(Debug, Default)]
pub struct Registry {
    providers: Vec<Provider>,
}

impl Registry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Register a provider. Providers are tried in registration order.
    pub fn register(&mut self, provider: Provider) {
        self.providers.push(provider);
    }

    /// Find the first provider whose pattern matches `url`.
    #[must_use]
    pub fn find_provider(&self, url: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.pattern().is_match(url))
    }

    /// Get all registered providers.
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Name and pattern of every registered provider.
    #[must_use]
    pub fn listing(&self) -> Vec<ProviderListing> {
        self.providers
            .iter()
            .map(|p| ProviderListing {
                name: p.service_name().to_string(),
                regex: p.pattern().as_str().to_string(),
            })
            .collect()
    }

    /// Resolve `url` with the first matching provider.
    ///
    /// Never fails: every resolver error, and a resolver panic, is folded
    /// into [`ResolutionOutcome::Failed`] with the provider attached.
    pub async fn resolve(&self, url: &str) -> ResolutionOutcome<'_> {
        let Some((provider, m)) = self
            .providers
            .iter()
            .find_map(|p| p.matches(url).map(|m| (p, m)))
        else {
            debug!(url = %url, "No provider matches");
            return ResolutionOutcome::NoMatch;
        };

        debug!(url = %url, service = provider.service_id(), "Resolving");

        let result = AssertUnwindSafe(provider.resolver().get_images(&m))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "resolver panicked".to_string());
                Err(ResolveError::Unknown(message))
            });

        match result {
            Ok(images) => {
                debug!(
                    service = provider.service_id(),
                    count = images.len(),
                    "Resolved"
                );
                ResolutionOutcome::Resolved { provider, images }
            }
            Err(error) => {
                if error.kind() == ErrorKind::Unknown {
                    warn!(url = %url, service = provider.service_id(), error = %error, "Resolver failed unexpectedly");
                } else {
                    debug!(url = %url, service = provider.service_id(), error = %error, "Resolver failed");
                }
                ResolutionOutcome::Failed { provider, error }
            }
        }
    }
}
