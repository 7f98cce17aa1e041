//! Integration tests for the resolvers and the dispatcher, against mocked
//! hosting services.

use std::sync::Arc;
use std::time::Duration;

use media_link_resolver::cache::{CachePolicy, ResolverCache};
use media_link_resolver::config::Config;
use media_link_resolver::http::{HttpFetch, ReqwestFetcher};
use media_link_resolver::resolvers::cameran::CameranResolver;
use media_link_resolver::resolvers::default_registry;
use media_link_resolver::resolvers::flickr::FlickrResolver;
use media_link_resolver::resolvers::hatena_fotolife::HatenaFotolifeResolver;
use media_link_resolver::{ErrorKind, Registry, ResolutionOutcome, ResolveError};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TTL: Duration = Duration::from_secs(60);

/// Build a registry whose resolvers talk to `server`.
fn create_registry(server: &MockServer) -> Registry {
    let http: Arc<dyn HttpFetch> =
        Arc::new(ReqwestFetcher::new(Duration::from_secs(5)).expect("Failed to build client"));
    let cache = ResolverCache::new(1_000);
    let scrape_policy = CachePolicy::with_not_found(TTL, TTL);
    let api_policy = CachePolicy::positive_only(TTL);

    let mut registry = Registry::new();
    registry.register(
        CameranResolver::new(Arc::clone(&http), cache.clone(), scrape_policy)
            .with_page_base(format!("{}/p/v1/", server.uri()))
            .into_provider(),
    );
    registry.register(
        FlickrResolver::new(Arc::clone(&http), cache.clone(), api_policy, "test-key")
            .with_endpoint(format!("{}/services/rest/", server.uri()))
            .into_provider(),
    );
    registry.register(
        HatenaFotolifeResolver::new(Arc::clone(&http), cache, scrape_policy)
            .with_page_base(format!("{}/", server.uri()))
            .into_provider(),
    );
    registry
}

fn og_page(image: &str) -> String {
    format!(
        r#"<html><head><meta property="og:image" content="{image}"></head><body></body></html>"#
    )
}

// ========== Dispatcher ==========

#[tokio::test]
async fn test_unsupported_url_is_no_match_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let registry = create_registry(&server);
    let outcome = registry.resolve("https://example.com/photo/1").await;

    assert!(matches!(outcome, ResolutionOutcome::NoMatch));
}

#[tokio::test]
async fn test_listed_patterns_round_trip() {
    let server = MockServer::start().await;
    let registry = create_registry(&server);

    let samples = [
        "http://cameran.in/p/v1/3hbTqO2U4W",
        "https://www.flickr.com/photos/85669226@N02/23816761306/in/datetaken/",
        "http://f.hatena.ne.jp/azyobuzin/20150412015830",
    ];

    let listing = registry.listing();
    assert_eq!(listing.len(), samples.len());

    for (entry, sample) in listing.iter().zip(samples) {
        let pattern = regex::Regex::new(&entry.regex).unwrap();
        assert!(pattern.is_match(sample), "{} should match {sample}", entry.name);
        assert!(registry.find_provider(sample).is_some());
    }
}

#[test]
fn test_default_registry_order() {
    let config = Config::for_testing();
    let http: Arc<dyn HttpFetch> =
        Arc::new(ReqwestFetcher::new(config.http_timeout).expect("Failed to build client"));
    let cache = ResolverCache::new(config.cache_capacity);

    let registry = default_registry(&config, &http, &cache);
    let ids: Vec<&str> = registry.providers().iter().map(|p| p.service_id()).collect();

    assert_eq!(ids, ["cameran", "Flickr", "HatenaFotolife"]);
    assert_eq!(registry.listing()[2].name, "はてなフォトライフ");
}

// ========== Cameran ==========

#[tokio::test]
async fn test_cameran_reads_og_image() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/v1/3hbTqO2U4W"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(og_page("https://cdn.example/3hbTqO2U4W.jpg")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    // Second lookup is served from the cache
    for _ in 0..2 {
        match registry.resolve("http://cameran.in/p/v1/3hbTqO2U4W").await {
            ResolutionOutcome::Resolved { provider, images } => {
                assert_eq!(provider.service_id(), "cameran");
                assert_eq!(images.len(), 1);
                let image = &images[0];
                assert_eq!(image.full.as_deref(), Some("https://cdn.example/3hbTqO2U4W.jpg"));
                assert_eq!(image.large, image.full);
                assert_eq!(image.thumb, image.full);
                assert!(!image.is_video());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_cameran_deletion_redirect_is_not_found_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/v1/deleted"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "http://cameran.in/"))
        .expect(1)
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    for _ in 0..2 {
        let outcome = registry.resolve("http://cameran.in/p/v1/deleted").await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));
    }
}

#[tokio::test]
async fn test_cameran_server_error_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/v1/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    // Failures are not cached, so both lookups reach the server
    for _ in 0..2 {
        match registry.resolve("http://cameran.in/p/v1/flaky").await {
            ResolutionOutcome::Failed { provider, error } => {
                assert_eq!(provider.service_id(), "cameran");
                assert_eq!(error.kind(), ErrorKind::Transport);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_cameran_page_without_image_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/p/v1/blank"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><head></head></html>"))
        .mount(&server)
        .await;

    let registry = create_registry(&server);
    let outcome = registry.resolve("http://cameran.in/p/v1/blank").await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::Unknown));
}

// ========== Flickr ==========

fn sizes_response() -> serde_json::Value {
    json!({
        "sizes": {
            "canblog": 0,
            "size": [
                {"label": "Small", "width": 240, "source": "https://live.staticflickr.com/5725/23816761306_123ded3e11_m.jpg"},
                {"label": "Medium", "width": 500, "source": "https://live.staticflickr.com/5725/23816761306_123ded3e11.jpg"},
                {"label": "Large", "width": 1024, "source": "https://live.staticflickr.com/5725/23816761306_123ded3e11_b.jpg"},
                {"label": "Original", "width": 4000, "source": "https://live.staticflickr.com/5725/23816761306_d95dabb2be_o.jpg"}
            ]
        },
        "stat": "ok"
    })
}

#[tokio::test]
async fn test_flickr_photo() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .and(query_param("method", "flickr.photos.getSizes"))
        .and(query_param("photo_id", "23816761306"))
        .and(query_param("api_key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sizes_response()))
        .expect(1)
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    match registry
        .resolve("https://www.flickr.com/photos/85669226@N02/23816761306/in/datetaken/")
        .await
    {
        ResolutionOutcome::Resolved { images, .. } => {
            let image = &images[0];
            assert_eq!(
                image.full.as_deref(),
                Some("https://live.staticflickr.com/5725/23816761306_d95dabb2be_o.jpg")
            );
            assert_eq!(
                image.large.as_deref(),
                Some("https://live.staticflickr.com/5725/23816761306_123ded3e11_b.jpg")
            );
            assert_eq!(
                image.thumb.as_deref(),
                Some("https://live.staticflickr.com/5725/23816761306_123ded3e11_m.jpg")
            );
            assert!(!image.is_video());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_flickr_short_url_shares_cache_with_photo_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .and(query_param("photo_id", "23816761306"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sizes_response()))
        .expect(1)
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    let short = registry.resolve("https://flic.kr/p/ChB8nC").await;
    assert!(matches!(short, ResolutionOutcome::Resolved { .. }));

    let long = registry
        .resolve("https://www.flickr.com/photos/85669226@N02/23816761306")
        .await;
    assert!(matches!(long, ResolutionOutcome::Resolved { .. }));
}

#[tokio::test]
async fn test_flickr_not_found_code_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stat": "fail",
            "code": 1,
            "message": "Photo not found"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    for _ in 0..2 {
        let outcome = registry
            .resolve("https://www.flickr.com/photos/someone/1")
            .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));
    }
}

#[tokio::test]
async fn test_flickr_other_codes_are_remote_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stat": "fail",
            "code": 100,
            "message": "Invalid API Key (Key has invalid format)"
        })))
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    match registry.resolve("https://www.flickr.com/photos/someone/1").await {
        ResolutionOutcome::Failed { error, .. } => match error {
            ResolveError::RemoteApi { code, message } => {
                assert_eq!(code, 100);
                assert!(message.starts_with("Invalid API Key"));
            }
            other => panic!("unexpected error: {other:?}"),
        },
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_flickr_album_preserves_order_and_video_flags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .and(query_param("method", "flickr.photosets.getPhotos"))
        .and(query_param("photoset_id", "72157661860595319"))
        .and(query_param("extras", "url_o,url_l,url_m,url_s,media"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photoset": {
                "id": "72157661860595319",
                "owner": "85669226@N02",
                "photo": [
                    {
                        "id": "23816761306", "secret": "123ded3e11", "media": "video",
                        "url_l": "https://live.staticflickr.com/a_b.jpg",
                        "url_m": "https://live.staticflickr.com/a.jpg",
                        "url_s": "https://live.staticflickr.com/a_m.jpg"
                    },
                    {
                        "id": "23816761307", "secret": "feedface00", "media": "photo",
                        "url_o": "https://live.staticflickr.com/b_o.jpg",
                        "url_l": "https://live.staticflickr.com/b_b.jpg",
                        "url_m": "https://live.staticflickr.com/b.jpg",
                        "url_s": "https://live.staticflickr.com/b_m.jpg"
                    }
                ]
            },
            "stat": "ok"
        })))
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    let images = match registry
        .resolve("https://www.flickr.com/photos/85669226@N02/albums/72157661860595319")
        .await
    {
        ResolutionOutcome::Resolved { images, .. } => images,
        other => panic!("unexpected outcome: {other:?}"),
    };

    assert_eq!(images.len(), 2);

    let video = &images[0];
    assert_eq!(video.full.as_deref(), Some("https://live.staticflickr.com/a_b.jpg"));
    assert_eq!(
        video.video_large.as_deref(),
        Some("https://www.flickr.com/photos/85669226@N02/23816761306/play/site/123ded3e11/")
    );
    assert_ne!(video.video_large, video.video_mobile);
    assert_ne!(video.video_full, video.video_mobile);

    let photo = &images[1];
    assert_eq!(photo.full.as_deref(), Some("https://live.staticflickr.com/b_o.jpg"));
    assert_eq!(photo.large.as_deref(), Some("https://live.staticflickr.com/b_b.jpg"));
    assert_eq!(photo.thumb.as_deref(), Some("https://live.staticflickr.com/b_m.jpg"));
    assert!(!photo.is_video());
}

#[tokio::test]
async fn test_flickr_malformed_short_code_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sizes_response()))
        .expect(0)
        .mount(&server)
        .await;

    let registry = create_registry(&server);
    let outcome = registry.resolve("https://flic.kr/p/lIO").await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_flickr_album_skips_items_without_sizes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .and(query_param("method", "flickr.photosets.getPhotos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photoset": {
                "id": "72157658404341455",
                "owner": "takeshik",
                "photo": [
                    {"id": "1", "secret": "s1", "media": "photo"},
                    {
                        "id": "2", "secret": "s2", "media": "photo",
                        "url_m": "https://live.staticflickr.com/2.jpg"
                    }
                ]
            },
            "stat": "ok"
        })))
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    match registry
        .resolve("https://www.flickr.com/photos/takeshik/albums/72157658404341455")
        .await
    {
        ResolutionOutcome::Resolved { images, .. } => {
            assert_eq!(images.len(), 1);
            assert_eq!(images[0].large.as_deref(), Some("https://live.staticflickr.com/2.jpg"));
            assert_eq!(images[0].thumb, images[0].large);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_flickr_gallery_uses_item_owner() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .and(query_param("method", "flickr.galleries.getPhotos"))
        .and(query_param("gallery_id", "72157662518421935"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "photos": {
                "photo": [
                    {
                        "id": "1", "owner": "alice", "secret": "s1", "media": "video",
                        "url_m": "https://live.staticflickr.com/1.jpg",
                        "url_s": "https://live.staticflickr.com/1_m.jpg"
                    },
                    {
                        "id": "2", "owner": "bob", "secret": "s2", "media": "photo",
                        "url_m": "https://live.staticflickr.com/2.jpg",
                        "url_s": "https://live.staticflickr.com/2_m.jpg"
                    }
                ]
            },
            "stat": "ok"
        })))
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    let images = match registry
        .resolve("https://www.flickr.com/photos/flickr/galleries/72157662518421935/")
        .await
    {
        ResolutionOutcome::Resolved { images, .. } => images,
        other => panic!("unexpected outcome: {other:?}"),
    };

    assert_eq!(images.len(), 2);
    assert_eq!(
        images[0].video_mobile.as_deref(),
        Some("https://www.flickr.com/photos/alice/1/play/mobile/s1/")
    );
    assert_eq!(images[1].large.as_deref(), Some("https://live.staticflickr.com/2.jpg"));
    assert!(!images[1].is_video());
}

#[tokio::test]
async fn test_flickr_concurrent_lookups_hit_api_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/rest/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sizes_response())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let registry = Arc::new(create_registry(&server));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            matches!(
                registry.resolve("https://flic.kr/p/ChB8nC").await,
                ResolutionOutcome::Resolved { .. }
            )
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }
}

// ========== Hatena Fotolife ==========

const HATENA_CDN: &str = "http://cdn-ak.f.st-hatena.com/images/fotolife";

#[tokio::test]
async fn test_hatena_fotolife_photo_with_original() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/azyobuzin/20150412015830"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><div id="foto-body">
                <img id="foto-for-html-tag-20150412015830" src="" style="display:none;" class="png" alt="" />
                <img src="/images/original.gif" alt="original" />
            </div></body></html>"#,
        ))
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    match registry
        .resolve("http://f.hatena.ne.jp/azyobuzin/20150412015830")
        .await
    {
        ResolutionOutcome::Resolved { provider, images } => {
            assert_eq!(provider.service_id(), "HatenaFotolife");
            let base = format!("{HATENA_CDN}/a/azyobuzin/20150412/20150412015830");
            assert_eq!(images[0].full, Some(format!("{base}_original.png")));
            assert_eq!(images[0].large, Some(format!("{base}.png")));
            assert_eq!(images[0].thumb, Some(format!("{base}_120.jpg")));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_hatena_fotolife_video() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/azyobuzin_test/20070423171636"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><div id="foto-body">
                <img id="foto-for-html-tag-20070423171636" class="flv" />
            </div></body></html>"#,
        ))
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    match registry
        .resolve("http://f.hatena.ne.jp/azyobuzin_test/20070423171636")
        .await
    {
        ResolutionOutcome::Resolved { images, .. } => {
            let base = format!("{HATENA_CDN}/a/azyobuzin_test/20070423/20070423171636");
            assert_eq!(images[0].video_full, Some(format!("{base}.flv")));
            assert_eq!(images[0].full, Some(format!("{base}.jpg")));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_hatena_fotolife_missing_photo_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/azyobuzin/20000101000000"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let registry = create_registry(&server);

    for _ in 0..2 {
        let outcome = registry
            .resolve("http://f.hatena.ne.jp/azyobuzin/20000101000000")
            .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));
    }
}

#[tokio::test]
async fn test_hatena_fotolife_see_other_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/azyobuzin/20000101000001"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", "/azyobuzin/"))
        .mount(&server)
        .await;

    let registry = create_registry(&server);
    let outcome = registry
        .resolve("http://f.hatena.ne.jp/azyobuzin/20000101000001")
        .await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));
}
