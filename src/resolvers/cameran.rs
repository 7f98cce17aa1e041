//! Cameran: one still image per post, read from page metadata.
//!
//! A deleted post redirects to the top page, so redirects mean not found.
//! Not-found results are cached.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;

use super::traits::{PatternMatch, Provider, Resolver};
use crate::cache::{CachePolicy, ResolverCache};
use crate::error::ResolveError;
use crate::http::{HttpFetch, RedirectPolicy};
use crate::image::ImageInfo;
use crate::og_extractor::extract_preview_image;

pub const SERVICE_ID: &str = "cameran";
pub const SERVICE_NAME: &str = "cameran";

// Only the /p/v1/ form; the old /posts/get/v1/{hex} links no longer resolve.
static PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^http://cameran\.in/p/v1/(\w+)/?(?:[\?#].*)?$").unwrap()
});

const PAGE_BASE: &str = "http://cameran.in/p/v1/";

pub struct CameranResolver {
    http: Arc<dyn HttpFetch>,
    cache: ResolverCache,
    policy: CachePolicy,
    page_base: String,
}

impl CameranResolver {
    #[must_use]
    pub fn new(http: Arc<dyn HttpFetch>, cache: ResolverCache, policy: CachePolicy) -> Self {
        Self {
            http,
            cache,
            policy,
            page_base: PAGE_BASE.to_string(),
        }
    }

    /// Fetch pages from `page_base` instead of cameran.in.
    #[must_use]
    pub fn with_page_base(mut self, page_base: impl Into<String>) -> Self {
        self.page_base = page_base.into();
        self
    }

    #[must_use]
    pub fn into_provider(self) -> Provider {
        Provider::new(SERVICE_ID, SERVICE_NAME, PATTERN.clone(), Arc::new(self))
    }
}

#[async_trait]
impl Resolver for CameranResolver {
    async fn get_images(&self, m: &PatternMatch) -> Result<Vec<ImageInfo>, ResolveError> {
        let id = m.required(1)?;
        let url = format!("{}{id}", self.page_base);
        let http = Arc::clone(&self.http);

        let image = self
            .cache
            .get_or_set(&format!("cameran-{id}"), self.policy, move || {
                fetch(http, url)
            })
            .await?;

        Ok(vec![ImageInfo::single(image.as_str())])
    }
}

async fn fetch(http: Arc<dyn HttpFetch>, url: String) -> Result<String, ResolveError> {
    let response = http
        .get(&url, RedirectPolicy::MasksAbsence)
        .await?
        .check(RedirectPolicy::MasksAbsence)?;

    let document = Html::parse_document(&response.text());
    extract_preview_image(&document)
        .ok_or_else(|| ResolveError::Extraction(format!("no preview image on {url}")))
}
