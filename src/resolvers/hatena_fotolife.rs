//! Hatena Fotolife: CDN URLs are built from the user name and photo id; the
//! page is only scraped for the file extension and whether an original is
//! available.
//!
//! Deleted photos redirect, so redirects mean not found. Not-found results
//! are cached.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};

use super::traits::{PatternMatch, Provider, Resolver};
use crate::cache::{CachePolicy, ResolverCache};
use crate::error::ResolveError;
use crate::http::{HttpFetch, RedirectPolicy};
use crate::image::ImageInfo;

pub const SERVICE_ID: &str = "HatenaFotolife";
pub const SERVICE_NAME: &str = "はてなフォトライフ";

static PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^http://f\.hatena\.ne\.jp/(\w+)/(\d{14})(?:[\?#]|$)").unwrap());

const PAGE_BASE: &str = "http://f.hatena.ne.jp/";
const CDN_BASE: &str = "http://cdn-ak.f.st-hatena.com/images/fotolife/";
const ORIGINAL_INDICATOR: &str = "/images/original.gif";
const VIDEO_EXTENSION: &str = "flv";

/// What the photo page tells us beyond the URL itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FotoAttributes {
    pub extension: String,
    pub original_available: bool,
}

pub struct HatenaFotolifeResolver {
    http: Arc<dyn HttpFetch>,
    cache: ResolverCache,
    policy: CachePolicy,
    page_base: String,
}

impl HatenaFotolifeResolver {
    #[must_use]
    pub fn new(http: Arc<dyn HttpFetch>, cache: ResolverCache, policy: CachePolicy) -> Self {
        Self {
            http,
            cache,
            policy,
            page_base: PAGE_BASE.to_string(),
        }
    }

    /// Fetch pages from `page_base` instead of f.hatena.ne.jp.
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
impl Resolver for HatenaFotolifeResolver {
    async fn get_images(&self, m: &PatternMatch) -> Result<Vec<ImageInfo>, ResolveError> {
        let username = m.required(1)?;
        let id = m.required(2)?;

        let url = format!("{}{username}/{id}", self.page_base);
        let http = Arc::clone(&self.http);
        let owned_id = id.to_string();

        let attributes = self
            .cache
            .get_or_set(
                &format!("hatenafotolife-{username}/{id}"),
                self.policy,
                move || async move {
                    let html = fetch_page(http.as_ref(), &url).await?;
                    parse_attributes(&html, &owned_id)
                },
            )
            .await?;

        Ok(vec![build_image(username, id, &attributes)?])
    }
}

async fn fetch_page(http: &dyn HttpFetch, url: &str) -> Result<String, ResolveError> {
    let response = http
        .get(url, RedirectPolicy::MasksAbsence)
        .await?
        .check(RedirectPolicy::MasksAbsence)?;
    Ok(response.text())
}

/// Read the extension and original-availability marker from a photo page.
///
/// The photo's `<img>` is `#foto-for-html-tag-{id}` inside `#foto-body`; its
/// `class` holds the extension. A missing element means the photo is gone.
fn parse_attributes(html: &str, id: &str) -> Result<FotoAttributes, ResolveError> {
    let document = Html::parse_document(html);
    let body = selector("#foto-body")?;
    let images = selector("img")?;
    let target = format!("foto-for-html-tag-{id}");

    let foto_body = document
        .select(&body)
        .next()
        .ok_or(ResolveError::NotFound)?;

    let photo = foto_body
        .select(&images)
        .find(|img| img.value().id() == Some(target.as_str()))
        .ok_or(ResolveError::NotFound)?;

    let extension = photo
        .value()
        .attr("class")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(ResolveError::NotFound)?
        .to_string();

    let original_available = foto_body
        .select(&images)
        .any(|img| img.value().attr("src") == Some(ORIGINAL_INDICATOR));

    Ok(FotoAttributes {
        extension,
        original_available,
    })
}

fn selector(css: &str) -> Result<Selector, ResolveError> {
    Selector::parse(css).map_err(|e| ResolveError::Extraction(format!("bad selector {css}: {e}")))
}

/// Build CDN URLs: `{CDN}/{first char}/{user}/{yyyymmdd}/{id}`.
fn build_image(
    username: &str,
    id: &str,
    attributes: &FotoAttributes,
) -> Result<ImageInfo, ResolveError> {
    let (initial, date) = username
        .chars()
        .next()
        .zip(id.get(..8))
        .ok_or_else(|| ResolveError::Extraction(format!("malformed photo id {username}/{id}")))?;
    let base = format!("{CDN_BASE}{initial}/{username}/{date}/{id}");
    let thumb = format!("{base}_120.jpg");

    if attributes.extension == VIDEO_EXTENSION {
        let video = format!("{base}.{VIDEO_EXTENSION}");
        let poster = format!("{base}.jpg");
        return Ok(ImageInfo::still(poster.clone(), poster, thumb).with_video(
            Some(video.clone()),
            Some(video.clone()),
            Some(video),
        ));
    }

    let large = format!("{base}.{}", attributes.extension);
    let full = if attributes.original_available {
        format!("{base}_original.{}", attributes.extension)
    } else {
        large.clone()
    };
    Ok(ImageInfo::still(full, large, thumb))
}
