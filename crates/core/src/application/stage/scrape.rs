// Scrape Stage: collect product URLs for the search terms and store them
use super::collector::UrlCollector;
use super::StageHandler;
use crate::application::codec::envelope_for;
use crate::domain::{
    Outbound, PipelineTopology, QueueSpec, ScrapeRequest, ScrapedUrls, StageKind, StageSpec,
};
use crate::error::Result;
use crate::port::ProfileRepository;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ScrapeStage {
    spec: StageSpec,
    output: QueueSpec,
    collector: UrlCollector,
    repo: Arc<dyn ProfileRepository>,
    default_max_products: usize,
}

impl ScrapeStage {
    pub fn new(
        topology: &PipelineTopology,
        collector: UrlCollector,
        repo: Arc<dyn ProfileRepository>,
        default_max_products: usize,
    ) -> Self {
        let spec = StageSpec::new(
            StageKind::Scrape,
            topology.scrape_requests.clone(),
            Some(topology.scraped_urls.clone()),
        );
        Self {
            spec,
            output: topology.scraped_urls.clone(),
            collector,
            repo,
            default_max_products: default_max_products.max(1),
        }
    }
}

#[async_trait]
impl StageHandler for ScrapeStage {
    type Input = ScrapeRequest;

    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    async fn handle(&self, request: ScrapeRequest) -> Result<Vec<Outbound>> {
        let max_per_term = request
            .max_products_per_search
            .unwrap_or(self.default_max_products);
        let urls = self.collector.collect(&request.busquedas, max_per_term).await?;

        // Replace semantics: a redelivered request converges to the same set
        match self.repo.find_latest_request(request.user_id).await? {
            Some(latest) => {
                let stored = self.repo.replace_found_urls(latest.id, &urls).await?;
                info!(user_id = request.user_id, request_id = latest.id, stored, "Found URLs stored");
            }
            None => warn!(
                user_id = request.user_id,
                "No request found for user, URLs not persisted"
            ),
        }

        let result = ScrapedUrls {
            user_id: request.user_id,
            urls,
        };
        Ok(vec![Outbound::new(self.output.clone(), envelope_for(&result)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::codec::decode_payload;
    use crate::port::marketplace::mocks::StaticMarketplace;
    use crate::port::profile_repository::mocks::InMemoryProfileRepository;

    fn stage(market: StaticMarketplace, repo: &InMemoryProfileRepository) -> ScrapeStage {
        ScrapeStage::new(
            &PipelineTopology::standard(),
            UrlCollector::new(Arc::new(market)),
            Arc::new(repo.clone()),
            3,
        )
    }

    fn request(user_id: i64, terms: &[&str]) -> ScrapeRequest {
        ScrapeRequest {
            user_id,
            busquedas: terms.iter().map(|s| s.to_string()).collect(),
            max_products_per_search: None,
        }
    }

    #[tokio::test]
    async fn test_urls_are_stored_and_published() {
        let repo = InMemoryProfileRepository::new();
        let (user_id, request_id) = repo.seed_request("Ana", "");
        let market = StaticMarketplace::new()
            .with_pages("a", vec![vec!["https://x/1", "https://x/2"]])
            .with_pages("b", vec![vec!["https://x/1"]]);

        let out = stage(market, &repo)
            .handle(request(user_id, &["a", "b"]))
            .await
            .unwrap();

        let result: ScrapedUrls = decode_payload(&out[0].envelope.payload).unwrap();
        assert_eq!(result.urls, vec!["https://x/1", "https://x/2"]);
        assert_eq!(repo.urls_for(request_id), result.urls);
    }

    #[tokio::test]
    async fn test_unknown_user_still_publishes() {
        let repo = InMemoryProfileRepository::new();
        let market = StaticMarketplace::new().with_pages("a", vec![vec!["https://x/1"]]);

        let out = stage(market, &repo)
            .handle(request(77, &["a"]))
            .await
            .unwrap();
        let result: ScrapedUrls = decode_payload(&out[0].envelope.payload).unwrap();
        assert_eq!(result.user_id, 77);
        assert_eq!(repo.replace_calls(), 0);
    }

    #[tokio::test]
    async fn test_message_override_limits_results() {
        let repo = InMemoryProfileRepository::new();
        let market = StaticMarketplace::new()
            .with_pages("a", vec![vec!["https://x/1", "https://x/2", "https://x/3"]]);

        let mut req = request(1, &["a"]);
        req.max_products_per_search = Some(1);
        let out = stage(market, &repo).handle(req).await.unwrap();
        let result: ScrapedUrls = decode_payload(&out[0].envelope.payload).unwrap();
        assert_eq!(result.urls.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_term_does_not_lose_the_others() {
        let repo = InMemoryProfileRepository::new();
        let (user_id, request_id) = repo.seed_request("Ana", "");
        let market = StaticMarketplace::new()
            .with_pages("ok", vec![vec!["https://x/1", "https://x/2"]])
            .with_pages("broken", vec![vec!["https://x/9"]])
            .failing("broken", 100);
        let stage = ScrapeStage::new(
            &PipelineTopology::standard(),
            UrlCollector::new(Arc::new(market)).with_retry_delay(std::time::Duration::from_millis(1)),
            Arc::new(repo.clone()),
            3,
        );

        let out = stage.handle(request(user_id, &["broken", "ok"])).await.unwrap();

        let result: ScrapedUrls = decode_payload(&out[0].envelope.payload).unwrap();
        assert_eq!(result.urls, vec!["https://x/1", "https://x/2"]);
        assert_eq!(repo.urls_for(request_id), result.urls);
    }
}
