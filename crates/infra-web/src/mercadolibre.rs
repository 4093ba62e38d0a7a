// MercadoLibre Colombia listing scraper

use crate::error::{map_reqwest_error, truncate_body};
use async_trait::async_trait;
use scraper::{Html, Selector};
use smartsearch_core::error::{AppError, Result};
use smartsearch_core::port::{MarketplaceSearch, SearchPage};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

pub const LISTING_BASE_URL: &str = "https://listado.mercadolibre.com.co";
/// Substring identifying product detail links
pub const PRODUCT_HOST: &str = "articulo.mercadolibre.com.co";
pub const RESULTS_PER_PAGE: u32 = 50;
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(10);
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const NEXT_PAGE_LABEL: &str = "Siguiente";

static SEL_LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static SEL_NEXT_TITLED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[title="Siguiente"]"#).unwrap());

#[derive(Debug, Clone)]
pub struct MercadoLibreConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for MercadoLibreConfig {
    fn default() -> Self {
        Self {
            base_url: LISTING_BASE_URL.to_string(),
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout: PAGE_TIMEOUT,
        }
    }
}

/// Listing URL for a query and 1-based page
///
/// The query becomes a slug: lower-cased, spaces to '-', commas removed.
/// Pages after the first append `_Desde_<offset>` with 50 results per page.
pub fn listing_url(base_url: &str, query: &str, page: u32) -> String {
    let slug = query.to_lowercase().replace(' ', "-").replace(',', "");
    let url = format!("{}/{}", base_url.trim_end_matches('/'), slug);
    if page > 1 {
        format!("{}_Desde_{}", url, (page - 1) * RESULTS_PER_PAGE + 1)
    } else {
        url
    }
}

/// Extract product links (page order, duplicates kept) and the next-page flag
pub fn parse_listing(html: &str) -> SearchPage {
    let document = Html::parse_document(html);

    let urls = document
        .select(&SEL_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.contains(PRODUCT_HOST))
        .map(str::to_string)
        .collect();

    let titled = document.select(&SEL_NEXT_TITLED).next();
    let next = match titled {
        Some(a) => Some(a),
        None => document
            .select(&SEL_LINKS)
            .find(|a| a.text().collect::<String>().trim() == NEXT_PAGE_LABEL),
    };
    let has_next = next
        .and_then(|a| a.value().attr("href"))
        .is_some_and(|href| !href.trim().is_empty());

    SearchPage { urls, has_next }
}

/// Marketplace search over plain HTTP + HTML parsing (no JavaScript rendering)
#[derive(Clone)]
pub struct MercadoLibreSearch {
    client: reqwest::Client,
    base_url: String,
}

impl MercadoLibreSearch {
    pub fn new(config: MercadoLibreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }
}

#[async_trait]
impl MarketplaceSearch for MercadoLibreSearch {
    async fn fetch_page(&self, query: &str, page: u32) -> Result<SearchPage> {
        let url = listing_url(&self.base_url, query, page);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message: format!("{}: {}", url, truncate_body(&text, 200)),
            });
        }

        let html = response.text().await.map_err(map_reqwest_error)?;
        let parsed = parse_listing(&html);
        debug!(query, page, links = parsed.urls.len(), has_next = parsed.has_next, "Listing page parsed");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <ol>
            <li><a href="https://articulo.mercadolibre.com.co/MCO-111-camara">Cámara</a></li>
            <li><a href="https://www.mercadolibre.com.co/ayuda">Ayuda</a></li>
            <li><a href="https://articulo.mercadolibre.com.co/MCO-222-lente">Lente</a></li>
            <li><a href="https://articulo.mercadolibre.com.co/MCO-111-camara">Cámara</a></li>
            <li><a>sin enlace</a></li>
          </ol>
          <ul class="andes-pagination">
            <li><a title="Siguiente" href="https://listado.mercadolibre.com.co/camara_Desde_51">Siguiente</a></li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn test_listing_url_slug_and_pagination() {
        assert_eq!(
            listing_url(LISTING_BASE_URL, "Cámara Mirrorless, Sony", 1),
            "https://listado.mercadolibre.com.co/cámara-mirrorless-sony"
        );
        assert_eq!(
            listing_url("https://listado.mercadolibre.com.co/", "audifonos", 2),
            "https://listado.mercadolibre.com.co/audifonos_Desde_51"
        );
        assert_eq!(
            listing_url(LISTING_BASE_URL, "audifonos", 3),
            "https://listado.mercadolibre.com.co/audifonos_Desde_101"
        );
    }

    #[test]
    fn test_parse_listing_keeps_product_links_in_order() {
        let page = parse_listing(LISTING);
        assert_eq!(
            page.urls,
            vec![
                "https://articulo.mercadolibre.com.co/MCO-111-camara",
                "https://articulo.mercadolibre.com.co/MCO-222-lente",
                "https://articulo.mercadolibre.com.co/MCO-111-camara",
            ]
        );
        assert!(page.has_next);
    }

    #[test]
    fn test_next_link_found_by_text() {
        let html = r#"<a href="/x_Desde_51"><span> Siguiente </span></a>"#;
        assert!(parse_listing(html).has_next);
    }

    #[test]
    fn test_last_page_has_no_next() {
        let html = r#"
            <a href="https://articulo.mercadolibre.com.co/MCO-1">p</a>
            <a title="Siguiente">Siguiente</a>
        "#;
        let page = parse_listing(html);
        assert_eq!(page.urls.len(), 1);
        assert!(!page.has_next);

        assert_eq!(parse_listing("<html></html>"), SearchPage::default());
    }
}
