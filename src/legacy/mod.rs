//! Interoperation with a legacy resolver instance.
//!
//! Services that are not implemented locally can be relayed to an older
//! deployment. Its pattern list is filtered against an allow-list of service
//! names, and its responses are passed through unchanged. Redirects are never
//! followed: a 30x from `redirect` is the resolved URL itself.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ResolveError;
use crate::http::{HttpFetch, RedirectPolicy};
use crate::resolvers::ProviderListing;

/// A status and body relayed verbatim from the legacy instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passthrough {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Answer of the legacy `redirect` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyRedirect {
    /// The legacy instance resolved the URL to this location.
    Location(String),
    /// Anything else, typically a JSON error body.
    Passthrough(Passthrough),
}

#[derive(Debug, Deserialize)]
struct NameRegexPair {
    name: String,
    regex: String,
}

/// A service pattern accepted from the legacy instance.
#[derive(Debug, Clone)]
pub struct LegacyProvider {
    pub service_name: String,
    pub pattern: Regex,
}

/// Client for a legacy instance.
pub struct LegacySource {
    http: Arc<dyn HttpFetch>,
    base: Url,
    allowlist: BTreeSet<String>,
}

impl LegacySource {
    /// Create a client for the instance at `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not an absolute URL.
    pub fn new(
        http: Arc<dyn HttpFetch>,
        base: &str,
        allowlist: BTreeSet<String>,
    ) -> Result<Self, ResolveError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http,
            base,
            allowlist,
        })
    }

    fn endpoint(&self, name: &str, query: &str) -> Result<Url, ResolveError> {
        Ok(self.base.join(&format!("{name}{query}"))?)
    }

    /// Fetch the legacy pattern list, keeping only allow-listed services.
    ///
    /// Patterns the local regex engine cannot compile are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be fetched or parsed.
    pub async fn fetch_providers(&self) -> Result<Vec<LegacyProvider>, ResolveError> {
        let url = self.endpoint("regex.json", "")?;
        let response = self
            .http
            .get(url.as_str(), RedirectPolicy::CarriesLocation)
            .await?;
        if !response.status.is_success() {
            return Err(ResolveError::UnexpectedStatus(response.status));
        }

        let pairs: Vec<NameRegexPair> = response.json()?;
        let total = pairs.len();

        let providers: Vec<LegacyProvider> = pairs
            .into_iter()
            .filter(|pair| self.allowlist.contains(&pair.name))
            .filter_map(|pair| match Regex::new(&pair.regex) {
                Ok(pattern) => Some(LegacyProvider {
                    service_name: pair.name,
                    pattern,
                }),
                Err(e) => {
                    warn!(service = %pair.name, error = %e, "Skipping legacy pattern");
                    None
                }
            })
            .collect();

        info!(
            accepted = providers.len(),
            offered = total,
            "Loaded legacy provider list"
        );
        Ok(providers)
    }

    /// Relay an `all_sizes.json` request. `query` includes the leading `?`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the request cannot be sent.
    pub async fn all_sizes(&self, query: &str) -> Result<Passthrough, ResolveError> {
        let url = self.endpoint("all_sizes.json", query)?;
        let response = self
            .http
            .get(url.as_str(), RedirectPolicy::CarriesLocation)
            .await?;
        Ok(Passthrough {
            status: response.status,
            body: response.body,
        })
    }

    /// Relay a `redirect` request. `query` includes the leading `?`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or a redirect has no
    /// `Location`.
    pub async fn redirect(&self, query: &str) -> Result<LegacyRedirect, ResolveError> {
        let url = self.endpoint("redirect", query)?;
        let response = self
            .http
            .get(url.as_str(), RedirectPolicy::CarriesLocation)
            .await?;

        if response.is_redirect() {
            let location = response.location.ok_or_else(|| {
                ResolveError::Extraction("legacy redirect without Location".to_string())
            })?;
            debug!(location = %location, "Legacy instance resolved redirect");
            return Ok(LegacyRedirect::Location(location));
        }

        Ok(LegacyRedirect::Passthrough(Passthrough {
            status: response.status,
            body: response.body,
        }))
    }
}

/// A legacy source together with the patterns it was found to serve.
pub struct LegacyFallback {
    source: LegacySource,
    providers: Vec<LegacyProvider>,
}

impl LegacyFallback {
    /// Load the pattern list from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be fetched.
    pub async fn load(source: LegacySource) -> Result<Self, ResolveError> {
        let providers = source.fetch_providers().await?;
        Ok(Self { source, providers })
    }

    #[must_use]
    pub fn source(&self) -> &LegacySource {
        &self.source
    }

    #[must_use]
    pub fn providers(&self) -> &[LegacyProvider] {
        &self.providers
    }

    /// Whether some legacy pattern matches `url`.
    #[must_use]
    pub fn handles(&self, url: &str) -> bool {
        self.providers.iter().any(|p| p.pattern.is_match(url))
    }

    #[must_use]
    pub fn listing(&self) -> Vec<ProviderListing> {
        self.providers
            .iter()
            .map(|p| ProviderListing {
                name: p.service_name.clone(),
                regex: p.pattern.as_str().to_string(),
            })
            .collect()
    }
}
