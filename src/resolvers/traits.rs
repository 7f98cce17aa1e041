use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::error::ResolveError;
use crate::image::ImageInfo;

/// Capture groups of a URL matched against a provider's pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    groups: Vec<Option<String>>,
}

impl PatternMatch {
    /// Match `url` against `pattern`, returning the owned capture groups.
    #[must_use]
    pub fn capture(pattern: &Regex, url: &str) -> Option<Self> {
        pattern.captures(url).map(|caps| Self {
            groups: caps
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        })
    }

    /// Value of capture group `index`, if it participated in the match.
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(Option::as_deref)
    }

    /// Value of capture group `index`, or an extraction error naming it.
    ///
    /// # Errors
    ///
    /// Returns an error if the group did not participate in the match.
    pub fn required(&self, index: usize) -> Result<&str, ResolveError> {
        self.group(index).ok_or_else(|| {
            ResolveError::Extraction(format!("capture group {index} did not match"))
        })
    }
}

/// Turns a pattern match into direct media URLs.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve the matched URL. An empty result means the page exists but
    /// carries no picture.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource is missing or the remote service
    /// cannot be queried.
    async fn get_images(&self, m: &PatternMatch) -> Result<Vec<ImageInfo>, ResolveError>;
}

/// A supported URL family: identity, pattern and the resolver behind it.
#[derive(Clone)]
pub struct Provider {
    service_id: &'static str,
    service_name: &'static str,
    pattern: Regex,
    resolver: Arc<dyn Resolver>,
}

impl Provider {
    #[must_use]
    pub fn new(
        service_id: &'static str,
        service_name: &'static str,
        pattern: Regex,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            service_id,
            service_name,
            pattern,
            resolver,
        }
    }

    /// Stable machine identifier.
    #[must_use]
    pub fn service_id(&self) -> &'static str {
        self.service_id
    }

    /// Human-readable name shown in listings.
    #[must_use]
    pub fn service_name(&self) -> &'static str {
        self.service_name
    }

    #[must_use]
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    #[must_use]
    pub fn matches(&self, url: &str) -> Option<PatternMatch> {
        PatternMatch::capture(&self.pattern, url)
    }

    #[must_use]
    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("service_id", &self.service_id)
            .field("service_name", &self.service_name)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}
