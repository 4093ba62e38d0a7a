// Queue Domain Model

use super::error::{DomainError, Result};

/// Queue identifier
pub type QueueId = String;

/// Form intake: HTTP front door -> Intake Stage
pub const INTAKE_QUEUE: &str = "intake";
/// Registration replies: Intake Stage -> display surface
pub const RESPONSES_QUEUE: &str = "responses";
/// Profile analysis requests: Intake Stage -> AI Stage
pub const AI_REQUESTS_QUEUE: &str = "ai-requests";
/// Search terms: AI Stage -> Scrape Stage
pub const SCRAPE_REQUESTS_QUEUE: &str = "scrape-requests";
/// Collected product URLs: Scrape Stage -> display surface
pub const SCRAPED_URLS_QUEUE: &str = "scraped-urls";

/// Exchange the display-facing queues are bound to
pub const DISPLAY_EXCHANGE: &str = "display";

const MAX_QUEUE_NAME_LEN: usize = 64;

/// Exchange binding for a queue (exchange + routing key)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeBinding {
    pub exchange: String,
    pub routing_key: String,
}

/// Queue declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: QueueId,
    pub durable: bool,
    pub binding: Option<ExchangeBinding>,
}

impl QueueSpec {
    /// Durable queue without exchange binding
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            binding: None,
        }
    }

    /// Bind this queue to an exchange under a routing key
    pub fn bound_to(mut self, exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        self.binding = Some(ExchangeBinding {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        });
        self
    }

    /// Queue names double as broker subjects: ASCII alphanumerics, '-' and '_' only
    pub fn validate(&self) -> Result<()> {
        let valid = !self.name.is_empty()
            && self.name.len() <= MAX_QUEUE_NAME_LEN
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(())
        } else {
            Err(DomainError::InvalidQueueName(self.name.clone()))
        }
    }
}

/// Every queue the pipeline uses, in data-flow order
#[derive(Debug, Clone)]
pub struct PipelineTopology {
    pub intake: QueueSpec,
    pub responses: QueueSpec,
    pub ai_requests: QueueSpec,
    pub scrape_requests: QueueSpec,
    pub scraped_urls: QueueSpec,
}

impl PipelineTopology {
    /// Standard topology: five durable queues, display queues bound to the display exchange
    pub fn standard() -> Self {
        Self {
            intake: QueueSpec::durable(INTAKE_QUEUE),
            responses: QueueSpec::durable(RESPONSES_QUEUE)
                .bound_to(DISPLAY_EXCHANGE, RESPONSES_QUEUE),
            ai_requests: QueueSpec::durable(AI_REQUESTS_QUEUE),
            scrape_requests: QueueSpec::durable(SCRAPE_REQUESTS_QUEUE),
            scraped_urls: QueueSpec::durable(SCRAPED_URLS_QUEUE)
                .bound_to(DISPLAY_EXCHANGE, SCRAPED_URLS_QUEUE),
        }
    }

    pub fn queues(&self) -> Vec<&QueueSpec> {
        vec![
            &self.intake,
            &self.responses,
            &self.ai_requests,
            &self.scrape_requests,
            &self.scraped_urls,
        ]
    }
}

impl Default for PipelineTopology {
    fn default() -> Self {
        Self::standard()
    }
}
