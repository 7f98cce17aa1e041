//! Shared constants used across the application.

/// User agent string sent with every outbound request to hosting services.
pub const RESOLVER_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; media-link-resolver/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Service names accepted from the legacy instance's pattern list when
/// `LEGACY_SERVICE_ALLOWLIST` is not set.
pub const DEFAULT_LEGACY_SERVICES: &[&str] = &[
    "携帯百景",
    "飯テロ.in",
    "My365",
    "MyPix",
    "ニコニコ動画",
    "ニコニコ静画",
    "OneDrive",
    "Ow.ly",
    "Path",
    "Pckles",
    "PHOTOHITO",
    "Photomemo",
    "Big Canvas PhotoShare",
    "フォト蔵",
    "PIAPRO",
    "Pikubo",
    "pixiv",
    "Shamoji",
    "SkyDrive",
    "Streamzoo",
    "TINAMI",
    "Tumblr",
    "つなビィ",
    "ついっぷるフォト",
    "TwitCasting",
    "Twitgoo",
    "TwitrPix",
    "Twitter",
    "Ustream.tv",
    "Via.Me",
    "Vimeo",
    "Vine",
    "yfrog",
    "YouTube",
];
