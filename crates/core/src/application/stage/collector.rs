// Product URL collection across search terms
use crate::application::failure::{classify, FailureClass};
use crate::application::worker::constants::{MAX_PAGES_PER_SEARCH, PAGE_FETCH_ATTEMPTS};
use crate::error::Result;
use crate::port::{MarketplaceSearch, SearchPage};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Walks result pages per term, deduplicating across pages and terms
pub struct UrlCollector {
    search: Arc<dyn MarketplaceSearch>,
    retry_delay: Duration,
}

impl UrlCollector {
    pub fn new(search: Arc<dyn MarketplaceSearch>) -> Self {
        Self {
            search,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Delay between attempts of one page fetch
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Collect up to `max_per_term` new URLs for every term
    ///
    /// Result holds each URL once, in discovery order. A term whose pages
    /// keep failing is skipped; the error surfaces only when it is a
    /// configuration problem or when no term yielded anything.
    pub async fn collect(&self, terms: &[String], max_per_term: usize) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        let mut last_failure = None;
        let mut succeeded = 0;

        for term in terms {
            let before = urls.len();
            match self
                .collect_term(term, max_per_term, &mut seen, &mut urls)
                .await
            {
                Ok(()) => {
                    succeeded += 1;
                    info!(term = %term, found = urls.len() - before, "Search term collected");
                }
                Err(e) if classify(&e) == FailureClass::ConfigFatal => return Err(e),
                Err(e) => {
                    warn!(term = %term, kept = urls.len() - before, error = %e, "Search term failed, skipping");
                    last_failure = Some(e);
                }
            }
        }

        match last_failure {
            Some(e) if succeeded == 0 && urls.is_empty() => Err(e),
            _ => Ok(urls),
        }
    }

    async fn collect_term(
        &self,
        term: &str,
        max_per_term: usize,
        seen: &mut HashSet<String>,
        urls: &mut Vec<String>,
    ) -> Result<()> {
        let mut taken = 0;
        let mut page = 1;

        while taken < max_per_term && page <= MAX_PAGES_PER_SEARCH {
            let result = self.fetch_with_retry(term, page).await?;

            let mut new_links = 0;
            for url in result.urls {
                if taken >= max_per_term {
                    break;
                }
                if seen.insert(url.clone()) {
                    urls.push(url);
                    taken += 1;
                    new_links += 1;
                }
            }

            if !result.has_next {
                break;
            }
            if new_links == 0 && page > 1 {
                debug!(term = %term, page, "No new links, stopping pagination");
                break;
            }
            page += 1;
        }
        Ok(())
    }

    async fn fetch_with_retry(&self, term: &str, page: u32) -> Result<SearchPage> {
        let mut attempt = 1;
        loop {
            match self.search.fetch_page(term, page).await {
                Ok(result) => return Ok(result),
                Err(e) if attempt < PAGE_FETCH_ATTEMPTS => {
                    warn!(term = %term, page, attempt, error = %e, "Page fetch failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
