//! Resource resolution: turn a source URL into a downloadable image URL.
//!
//! A source URL is either the image itself or a product page that embeds the
//! cover. A HEAD probe tells the two apart by content type; pages are fetched
//! and searched with the configured CSS selector.

use crate::error::ItemError;
use crate::pipeline::fetch::Fetcher;
use kuchiki::traits::TendrilSink;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A source URL paired with the image it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImage {
    pub source_url: String,
    /// May equal `source_url` when the source already is an image.
    pub image_url: String,
}

/// Resolve `url` to a concrete image URL.
///
/// 1. HEAD probe; a 2xx image content type returns `url` unchanged.
/// 2. Otherwise GET the page; non-2xx or transport failure drops the item.
/// 3. First element matching `selector`, attribute `attribute`, joined onto
///    the URL the page was served from after redirects.
///
/// A failed probe is only logged: some servers reject HEAD outright, so the
/// full fetch still gets a chance.
pub async fn resolve(
    fetcher: &dyn Fetcher,
    url: &str,
    selector: &str,
    attribute: &str,
) -> Result<ResolvedImage, ItemError> {
    match fetcher.head(url).await {
        Ok(head) if head.is_success() && head.is_image() => {
            debug!("{} is an image ({:?})", url, head.content_type);
            return Ok(ResolvedImage {
                source_url: url.to_string(),
                image_url: url.to_string(),
            });
        }
        Ok(head) => debug!(
            "{} is not an image (HTTP {}, {:?}); fetching page",
            url, head.status, head.content_type
        ),
        Err(e) => warn!("Could not check URL type for {}: {}", url, e),
    }

    let page = fetcher.get(url).await?;
    if !page.head.is_success() {
        return Err(ItemError::HttpStatus {
            url: url.to_string(),
            status: page.head.status,
        });
    }

    let html = String::from_utf8_lossy(&page.body);
    let image_url = extract_image_url(&html, &page.final_url, selector, attribute)?;
    debug!("{} → {}", url, image_url);

    Ok(ResolvedImage {
        source_url: url.to_string(),
        image_url,
    })
}

/// Find the image location inside an HTML document.
///
/// Relative and protocol-relative values are joined onto `page_url`.
pub fn extract_image_url(
    html: &str,
    page_url: &str,
    selector: &str,
    attribute: &str,
) -> Result<String, ItemError> {
    let document = kuchiki::parse_html().one(html);

    let element = document
        .select_first(selector)
        .map_err(|_| ItemError::SelectorNotFound {
            url: page_url.to_string(),
            selector: selector.to_string(),
        })?;

    let attrs = element.attributes.borrow();
    let value = attrs
        .get(attribute)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ItemError::AttributeMissing {
            url: page_url.to_string(),
            selector: selector.to_string(),
            attribute: attribute.to_string(),
        })?;

    Ok(absolutize(page_url, value))
}

fn absolutize(page_url: &str, value: &str) -> String {
    reqwest::Url::parse(page_url)
        .and_then(|base| base.join(value))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fetch::{FetchedBody, ResponseHead};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PAGE: &str = "https://shop.example/book/42";

    fn page_with(img: &str) -> String {
        format!(
            "<html><body><div class=\"gallery\">{img}</div>\
             <img class=\"main-image-nosrc\" data-src=\"https://cdn.example/second.jpg\"></body></html>"
        )
    }

    #[derive(Default)]
    struct ScriptedFetcher {
        heads: HashMap<String, Result<ResponseHead, ItemError>>,
        pages: HashMap<String, FetchedBody>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn head(mut self, url: &str, status: u16, ct: &str) -> Self {
            self.heads.insert(
                url.into(),
                Ok(ResponseHead {
                    status,
                    content_type: Some(ct.into()),
                }),
            );
            self
        }

        fn page(mut self, url: &str, status: u16, body: &str) -> Self {
            self.pages.insert(
                url.into(),
                FetchedBody {
                    head: ResponseHead {
                        status,
                        content_type: Some("text/html".into()),
                    },
                    final_url: url.into(),
                    body: body.as_bytes().to_vec(),
                },
            );
            self
        }

        fn redirected_page(mut self, url: &str, final_url: &str, body: &str) -> Self {
            self.pages.insert(
                url.into(),
                FetchedBody {
                    head: ResponseHead {
                        status: 200,
                        content_type: Some("text/html".into()),
                    },
                    final_url: final_url.into(),
                    body: body.as_bytes().to_vec(),
                },
            );
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn head(&self, url: &str) -> Result<ResponseHead, ItemError> {
            self.calls.lock().unwrap().push(format!("HEAD {url}"));
            self.heads.get(url).cloned().unwrap_or_else(|| {
                Err(ItemError::Transport {
                    url: url.into(),
                    reason: "connection refused".into(),
                })
            })
        }

        async fn get(&self, url: &str) -> Result<FetchedBody, ItemError> {
            self.calls.lock().unwrap().push(format!("GET {url}"));
            self.pages.get(url).cloned().ok_or_else(|| ItemError::Transport {
                url: url.into(),
                reason: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn image_url_is_returned_without_page_fetch() {
        let url = "https://cdn.example/cover.jpg";
        let fetcher = ScriptedFetcher::default().head(url, 200, "image/jpeg");
        let resolved = resolve(&fetcher, url, ".main-image-nosrc", "data-src")
            .await
            .unwrap();
        assert_eq!(resolved.image_url, url);
        assert_eq!(fetcher.calls(), vec![format!("HEAD {url}")]);
    }

    #[tokio::test]
    async fn page_url_resolves_via_selector() {
        let fetcher = ScriptedFetcher::default()
            .head(PAGE, 200, "text/html; charset=utf-8")
            .page(
                PAGE,
                200,
                &page_with("<img class=\"main-image-nosrc\" data-src=\"https://cdn.example/first.jpg\">"),
            );
        let resolved = resolve(&fetcher, PAGE, ".main-image-nosrc", "data-src")
            .await
            .unwrap();
        assert_eq!(resolved.image_url, "https://cdn.example/first.jpg");
        assert_eq!(resolved.source_url, PAGE);
    }

    #[tokio::test]
    async fn failed_probe_still_tries_the_page() {
        let fetcher = ScriptedFetcher::default().page(PAGE, 200, &page_with(""));
        let resolved = resolve(&fetcher, PAGE, ".main-image-nosrc", "data-src")
            .await
            .unwrap();
        assert_eq!(resolved.image_url, "https://cdn.example/second.jpg");
        assert_eq!(fetcher.calls(), vec![format!("HEAD {PAGE}"), format!("GET {PAGE}")]);
    }

    #[tokio::test]
    async fn image_type_with_error_status_is_not_trusted() {
        let fetcher = ScriptedFetcher::default()
            .head(PAGE, 403, "image/png")
            .page(PAGE, 403, "forbidden");
        let err = resolve(&fetcher, PAGE, ".main-image-nosrc", "data-src")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ItemError::HttpStatus {
                url: PAGE.into(),
                status: 403
            }
        );
    }

    #[tokio::test]
    async fn relative_link_follows_redirected_page() {
        let short = "http://sho.rt/abc";
        let fetcher = ScriptedFetcher::default().redirected_page(
            short,
            "https://shop.example/book/42",
            "<img class=\"main-image-nosrc\" data-src=\"/covers/42.jpg\">",
        );
        let resolved = resolve(&fetcher, short, ".main-image-nosrc", "data-src")
            .await
            .unwrap();
        assert_eq!(resolved.image_url, "https://shop.example/covers/42.jpg");
        assert_eq!(resolved.source_url, short);
    }

    #[tokio::test]
    async fn page_without_match_is_dropped() {
        let fetcher = ScriptedFetcher::default()
            .head(PAGE, 200, "text/html")
            .page(PAGE, 200, "<html><body><p>Out of print</p></body></html>");
        let err = resolve(&fetcher, PAGE, ".main-image-nosrc", "data-src")
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::SelectorNotFound { .. }));
    }

    #[tokio::test]
    async fn unreachable_page_is_dropped() {
        let fetcher = ScriptedFetcher::default();
        let err = resolve(&fetcher, PAGE, ".main-image-nosrc", "data-src")
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::Transport { .. }));
    }

    #[test]
    fn missing_or_empty_attribute_is_an_error() {
        let html = "<img class=\"cover\" src=\"a.jpg\"><img class=\"cover\" data-src=\"b.jpg\">";
        let err = extract_image_url(html, PAGE, ".cover", "data-src").unwrap_err();
        assert!(matches!(err, ItemError::AttributeMissing { .. }));

        let html = "<img class=\"cover\" data-src=\"  \">";
        let err = extract_image_url(html, PAGE, ".cover", "data-src").unwrap_err();
        assert!(matches!(err, ItemError::AttributeMissing { .. }));
    }

    #[test]
    fn relative_locations_are_joined_onto_the_page() {
        let html = "<img id=\"c\" data-src=\"/img/42.jpg\">";
        assert_eq!(
            extract_image_url(html, PAGE, "#c", "data-src").unwrap(),
            "https://shop.example/img/42.jpg"
        );
        let html = "<img id=\"c\" data-src=\"//cdn.example/42.jpg\">";
        assert_eq!(
            extract_image_url(html, PAGE, "#c", "data-src").unwrap(),
            "https://cdn.example/42.jpg"
        );
    }

    #[test]
    fn custom_attribute_is_honoured() {
        let html = "<div class=\"hero\" data-zoom=\"https://cdn.example/z.jpg\"></div>";
        assert_eq!(
            extract_image_url(html, PAGE, "div.hero", "data-zoom").unwrap(),
            "https://cdn.example/z.jpg"
        );
    }
}
