//! Flickr: photos, albums and galleries through the REST API.
//!
//! The API is reached with redirects followed; its errors arrive as a JSON
//! envelope with `stat != "ok"`. Remote code 1 ("not found") maps to
//! [`ResolveError::NotFound`] after the cache, so not-found results are never
//! cached and a later lookup asks the API again.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::traits::{PatternMatch, Provider, Resolver};
use crate::cache::{CachePolicy, ResolverCache};
use crate::error::ResolveError;
use crate::http::{HttpFetch, RedirectPolicy};
use crate::image::ImageInfo;

pub const SERVICE_ID: &str = "Flickr";
pub const SERVICE_NAME: &str = "Flickr";

// Group 1: "albums" | "galleries", group 2: numeric id, group 3: flic.kr short code.
static PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?:www\.)?(?:flickr\.com/photos/(?:[\w\-_@]+)/(?:(albums|galleries)/)?(\d+)(?:/(?:in|with|sizes)(?:/.*)?)?|flic\.kr/p/([1-9a-zA-Z]+))/?(?:[\?#]|$)",
    )
    .unwrap()
});

const API_ENDPOINT: &str = "https://api.flickr.com/services/rest/";
const LIST_EXTRAS: &str = "url_o,url_l,url_m,url_s,media";

/// Remote error code Flickr uses for a missing photo, photoset or gallery.
const NOT_FOUND_CODE: i64 = 1;

const BASE58_ALPHABET: &str = "123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// Decode a flic.kr short code into a photo id.
///
/// Returns `None` for characters outside the alphabet or on overflow.
#[must_use]
pub fn decode_base58(code: &str) -> Option<u64> {
    code.chars().try_fold(0_u64, |acc, c| {
        let digit = BASE58_ALPHABET.find(c)?;
        acc.checked_mul(58)?.checked_add(digit as u64)
    })
}

pub struct FlickrResolver {
    http: Arc<dyn HttpFetch>,
    cache: ResolverCache,
    policy: CachePolicy,
    api: Arc<ApiClient>,
}

struct ApiClient {
    http: Arc<dyn HttpFetch>,
    endpoint: String,
    api_key: String,
}

impl FlickrResolver {
    #[must_use]
    pub fn new(
        http: Arc<dyn HttpFetch>,
        cache: ResolverCache,
        policy: CachePolicy,
        api_key: impl Into<String>,
    ) -> Self {
        let api = Arc::new(ApiClient {
            http: Arc::clone(&http),
            endpoint: API_ENDPOINT.to_string(),
            api_key: api_key.into(),
        });
        Self {
            http,
            cache,
            policy,
            api,
        }
    }

    /// Call the REST API at `endpoint` instead of api.flickr.com.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api = Arc::new(ApiClient {
            http: Arc::clone(&self.http),
            endpoint: endpoint.into(),
            api_key: self.api.api_key.clone(),
        });
        self
    }

    #[must_use]
    pub fn into_provider(self) -> Provider {
        Provider::new(SERVICE_ID, SERVICE_NAME, PATTERN.clone(), Arc::new(self))
    }

    async fn resolve(&self, m: &PatternMatch) -> Result<Vec<ImageInfo>, ResolveError> {
        let api = Arc::clone(&self.api);

        match m.group(1) {
            None => {
                let id = match m.group(3) {
                    // A code outside the alphabet cannot name any photo
                    Some(code) => decode_base58(code)
                        .ok_or(ResolveError::NotFound)?
                        .to_string(),
                    None => m.required(2)?.to_string(),
                };
                let photo = self
                    .cache
                    .get_or_set(&format!("flickrphoto-{id}"), self.policy, move || async move {
                        api.fetch_photo(&id).await
                    })
                    .await?;
                Ok(vec![(*photo).clone()])
            }
            Some(kind) => {
                let id = m.required(2)?.to_string();
                let key = format!("flickr{}-{id}", if kind == "albums" { "album" } else { "gallery" });
                let is_album = kind == "albums";
                let items = self
                    .cache
                    .get_or_set(&key, self.policy, move || async move {
                        if is_album {
                            api.fetch_album(&id).await
                        } else {
                            api.fetch_gallery(&id).await
                        }
                    })
                    .await?;
                Ok((*items).clone())
            }
        }
    }
}

#[async_trait]
impl Resolver for FlickrResolver {
    async fn get_images(&self, m: &PatternMatch) -> Result<Vec<ImageInfo>, ResolveError> {
        match self.resolve(m).await {
            Err(ResolveError::RemoteApi { code, .. }) if code == NOT_FOUND_CODE => {
                Err(ResolveError::NotFound)
            }
            other => other,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Status {
    stat: String,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct GetSizesResponse {
    sizes: Sizes,
}

#[derive(Debug, Deserialize)]
struct Sizes {
    #[serde(default)]
    size: Vec<Size>,
}

#[derive(Debug, Deserialize)]
struct Size {
    label: String,
    source: String,
}

#[derive(Debug, Deserialize)]
struct PhotosetResponse {
    photoset: Photoset,
}

#[derive(Debug, Deserialize)]
struct Photoset {
    owner: String,
    #[serde(default)]
    photo: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct GalleryResponse {
    photos: GalleryPhotos,
}

#[derive(Debug, Deserialize)]
struct GalleryPhotos {
    #[serde(default)]
    photo: Vec<Photo>,
}

#[derive(Debug, Default, Deserialize)]
struct Photo {
    id: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    secret: String,
    url_o: Option<String>,
    url_l: Option<String>,
    url_m: Option<String>,
    url_s: Option<String>,
    #[serde(default)]
    media: String,
}

impl ApiClient {
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ResolveError> {
        let mut url = Url::parse(&self.endpoint)?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("nojsoncallback", "1")
            .append_pair("api_key", &self.api_key)
            .append_pair("method", method)
            .extend_pairs(params);

        let response = self
            .http
            .get(url.as_str(), RedirectPolicy::Follow)
            .await?
            .check(RedirectPolicy::Follow)?;

        let status: Status = response.json()?;
        if status.stat != "ok" {
            return Err(ResolveError::RemoteApi {
                code: status.code,
                message: status.message,
            });
        }
        response.json()
    }

    async fn fetch_photo(&self, id: &str) -> Result<ImageInfo, ResolveError> {
        let response: GetSizesResponse = self
            .call("flickr.photos.getSizes", &[("photo_id", id)])
            .await?;
        let sizes: HashMap<String, String> = response
            .sizes
            .size
            .into_iter()
            .map(|s| (s.label, s.source))
            .collect();
        photo_from_sizes(&sizes)
    }

    async fn fetch_album(&self, id: &str) -> Result<Vec<ImageInfo>, ResolveError> {
        let response: PhotosetResponse = self
            .call(
                "flickr.photosets.getPhotos",
                &[("extras", LIST_EXTRAS), ("photoset_id", id)],
            )
            .await?;
        let owner = response.photoset.owner;
        Ok(response
            .photoset
            .photo
            .iter()
            .filter_map(|photo| list_item(photo, photo.owner.as_deref().unwrap_or(&owner)))
            .collect())
    }

    async fn fetch_gallery(&self, id: &str) -> Result<Vec<ImageInfo>, ResolveError> {
        let response: GalleryResponse = self
            .call(
                "flickr.galleries.getPhotos",
                &[("extras", LIST_EXTRAS), ("gallery_id", id)],
            )
            .await?;
        Ok(response
            .photos
            .photo
            .iter()
            .filter_map(|photo| list_item(photo, photo.owner.as_deref().unwrap_or_default()))
            .collect())
    }
}

fn first_of<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates.iter().copied().flatten().next()
}

/// Pick still and video sizes from a `getSizes` label map.
fn photo_from_sizes(sizes: &HashMap<String, String>) -> Result<ImageInfo, ResolveError> {
    let get = |label: &str| sizes.get(label).map(String::as_str);

    let full = first_of(&[get("Original"), get("Large"), get("Medium"), get("Small")]);
    let large = first_of(&[get("Large"), get("Medium"), get("Original"), get("Small")]);
    let thumb = first_of(&[get("Small"), get("Thumbnail"), get("Medium"), large]);

    let (Some(full), Some(large), Some(thumb)) = (full, large, thumb) else {
        return Err(ResolveError::NotAPicture);
    };

    Ok(ImageInfo::still(full, large, thumb).with_video(
        first_of(&[get("HD MP4"), get("Site MP4")]).map(str::to_string),
        get("Site MP4").map(str::to_string),
        get("Mobile MP4").map(str::to_string),
    ))
}

/// Build one album or gallery item from its `url_*` extras.
///
/// Items without any still URL are skipped, so every returned item carries
/// `full`, `large` and `thumb`.
fn list_item(photo: &Photo, owner: &str) -> Option<ImageInfo> {
    let full = first_of(&[
        photo.url_o.as_deref(),
        photo.url_l.as_deref(),
        photo.url_m.as_deref(),
        photo.url_s.as_deref(),
    ]);
    let large = first_of(&[
        photo.url_l.as_deref(),
        photo.url_m.as_deref(),
        photo.url_o.as_deref(),
        photo.url_s.as_deref(),
    ]);
    let thumb = first_of(&[photo.url_s.as_deref(), photo.url_m.as_deref(), large]);

    let (Some(full), Some(large), Some(thumb)) = (full, large, thumb) else {
        debug!(id = %photo.id, "Skipping list item without sizes");
        return None;
    };
    let image = ImageInfo::still(full, large, thumb);

    if photo.media == "video" {
        let play = |label| video_url(label, &photo.id, owner, &photo.secret);
        Some(image.with_video(Some(play("hd")), Some(play("site")), Some(play("mobile"))))
    } else {
        Some(image)
    }
}

fn video_url(label: &str, id: &str, owner: &str, secret: &str) -> String {
    format!("https://www.flickr.com/photos/{owner}/{id}/play/{label}/{secret}/")
}
