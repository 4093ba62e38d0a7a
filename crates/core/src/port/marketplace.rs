// Marketplace Search Port (scraping collaborator)

use crate::error::Result;
use async_trait::async_trait;

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Product URLs in page order (may contain duplicates)
    pub urls: Vec<String>,
    /// A "next page" link exists
    pub has_next: bool,
}

/// Paged product search on the marketplace
#[async_trait]
pub trait MarketplaceSearch: Send + Sync {
    /// Fetch one result page (1-based)
    async fn fetch_page(&self, query: &str, page: u32) -> Result<SearchPage>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Marketplace serving fixed pages per query
    #[derive(Clone, Default)]
    pub struct StaticMarketplace {
        pages: Arc<Mutex<HashMap<String, Vec<Vec<String>>>>>,
        failures: Arc<Mutex<HashMap<String, usize>>>,
        calls: Arc<Mutex<Vec<(String, u32)>>>,
    }

    impl StaticMarketplace {
        pub fn new() -> Self {
            Self::default()
        }

        /// Serve `pages` for `query`; every page but the last links to the next one
        pub fn with_pages(self, query: &str, pages: Vec<Vec<&str>>) -> Self {
            let pages = pages
                .into_iter()
                .map(|p| p.into_iter().map(String::from).collect())
                .collect();
            self.pages.lock().unwrap().insert(query.to_string(), pages);
            self
        }

        /// Fail the next `n` fetches of `query` with a network error
        pub fn failing(self, query: &str, n: usize) -> Self {
            self.failures.lock().unwrap().insert(query.to_string(), n);
            self
        }

        pub fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MarketplaceSearch for StaticMarketplace {
        async fn fetch_page(&self, query: &str, page: u32) -> Result<SearchPage> {
            self.calls.lock().unwrap().push((query.to_string(), page));

            if let Some(remaining) = self.failures.lock().unwrap().get_mut(query) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::Network(format!("timeout fetching '{}'", query)));
                }
            }

            let pages = self.pages.lock().unwrap();
            let Some(result_pages) = pages.get(query) else {
                return Ok(SearchPage::default());
            };
            let index = page.saturating_sub(1) as usize;
            Ok(SearchPage {
                urls: result_pages.get(index).cloned().unwrap_or_default(),
                has_next: index + 1 < result_pages.len(),
            })
        }
    }
}
