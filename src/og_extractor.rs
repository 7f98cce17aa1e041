//! Preview image extraction from HTML page metadata.

use scraper::{Html, Selector};

/// Meta properties that carry a page's primary preview image, in order of
/// preference.
const IMAGE_PROPERTIES: &[&str] = &["og:image", "og:image:url", "twitter:image"];

/// Extract the primary preview image URL of a page.
///
/// Looks at `<meta property=...>` and `<meta name=...>` tags for
/// [`IMAGE_PROPERTIES`] and falls back to `<link rel="image_src">`. Empty
/// values are ignored.
#[must_use]
pub fn extract_preview_image(document: &Html) -> Option<String> {
    let meta = Selector::parse("meta[content]").ok()?;

    for property in IMAGE_PROPERTIES {
        let found = document.select(&meta).find_map(|element| {
            let el = element.value();
            let key = el.attr("property").or_else(|| el.attr("name"))?;
            if !key.eq_ignore_ascii_case(property) {
                return None;
            }
            non_empty(el.attr("content"))
        });
        if found.is_some() {
            return found;
        }
    }

    let link = Selector::parse(r#"link[rel="image_src"]"#).ok()?;
    document
        .select(&link)
        .find_map(|element| non_empty(element.value().attr("href")))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Option<String> {
        extract_preview_image(&Html::parse_document(html))
    }

    #[test]
    fn test_extract_og_image() {
        let html = r#"
            <html>
                <head>
                    <meta property="og:title" content="Test Page">
                    <meta property="og:image" content="https://example.com/image.jpg">
                </head>
            </html>
        "#;

        assert_eq!(
            extract(html),
            Some("https://example.com/image.jpg".to_string())
        );
    }

    #[test]
    fn test_prefers_og_over_twitter() {
        let html = r#"
            <html>
                <head>
                    <meta name="twitter:image" content="https://example.com/twitter.jpg">
                    <meta property="og:image" content="https://example.com/og.jpg">
                </head>
            </html>
        "#;

        assert_eq!(extract(html), Some("https://example.com/og.jpg".to_string()));
    }

    #[test]
    fn test_falls_back_to_twitter_and_image_src() {
        let twitter = r#"<html><head><meta name="twitter:image" content="https://example.com/t.jpg"></head></html>"#;
        assert_eq!(extract(twitter), Some("https://example.com/t.jpg".to_string()));

        let link = r#"<html><head><link rel="image_src" href="https://example.com/l.jpg"></head></html>"#;
        assert_eq!(extract(link), Some("https://example.com/l.jpg".to_string()));
    }

    #[test]
    fn test_ignores_empty_content() {
        let html = r#"
            <html>
                <head>
                    <meta property="og:image" content="  ">
                    <meta property="og:title" content="Title">
                </head>
            </html>
        "#;

        assert_eq!(extract(html), None);
    }

    #[test]
    fn test_no_metadata() {
        assert_eq!(extract("<html><head><title>Plain</title></head></html>"), None);
    }
}
