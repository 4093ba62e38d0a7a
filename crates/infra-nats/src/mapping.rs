// Queue -> JetStream naming and stream configuration

use async_nats::jetstream::consumer::{pull, AckPolicy};
use async_nats::jetstream::stream::{Config, RetentionPolicy, StorageType};
use smartsearch_core::domain::QueueSpec;
use std::time::Duration;

/// Subject prefix every queue publishes under
pub const SUBJECT_PREFIX: &str = "pipeline";

/// Stream name for a queue: upper-cased, '-' replaced by '_'
pub fn stream_name(queue: &str) -> String {
    queue.to_ascii_uppercase().replace('-', "_")
}

/// Subject a publish to `queue` is sent to
pub fn publish_subject(queue: &str) -> String {
    format!("{}.{}", SUBJECT_PREFIX, queue)
}

pub(crate) fn storage_for(queue: &QueueSpec) -> StorageType {
    if queue.durable {
        StorageType::File
    } else {
        StorageType::Memory
    }
}

/// Every subject the queue's stream captures
pub(crate) fn subjects_for(queue: &QueueSpec) -> Vec<String> {
    let mut subjects = vec![publish_subject(&queue.name)];
    if let Some(binding) = &queue.binding {
        subjects.push(format!("{}.{}", binding.exchange, binding.routing_key));
    }
    subjects
}

pub(crate) fn stream_config(queue: &QueueSpec) -> Config {
    Config {
        name: stream_name(&queue.name),
        subjects: subjects_for(queue),
        retention: RetentionPolicy::WorkQueue,
        storage: storage_for(queue),
        num_replicas: 1,
        ..Default::default()
    }
}

/// Durable pull consumer for one stage
///
/// `ack_wait` bounds how long a delivery may stay unresolved before the
/// server redelivers it; the stage consumer renews it with progress acks.
pub(crate) fn consumer_config(name: &str, prefetch: u16, ack_wait: Duration) -> pull::Config {
    pull::Config {
        durable_name: Some(name.to_string()),
        ack_policy: AckPolicy::Explicit,
        ack_wait,
        max_ack_pending: i64::from(prefetch.max(1)),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartsearch_core::domain::PipelineTopology;

    #[test]
    fn test_stream_names() {
        assert_eq!(stream_name("ai-requests"), "AI_REQUESTS");
        assert_eq!(stream_name("intake"), "INTAKE");
        assert_eq!(publish_subject("scrape-requests"), "pipeline.scrape-requests");
    }

    #[test]
    fn test_bound_queue_captures_exchange_subject() {
        let topology = PipelineTopology::standard();
        let config = stream_config(&topology.scraped_urls);
        assert_eq!(config.name, "SCRAPED_URLS");
        assert_eq!(
            config.subjects,
            vec!["pipeline.scraped-urls", "display.scraped-urls"]
        );
        assert_eq!(config.retention, RetentionPolicy::WorkQueue);

        assert_eq!(subjects_for(&topology.ai_requests), vec!["pipeline.ai-requests"]);
    }

    #[test]
    fn test_durability_selects_storage() {
        let mut queue = QueueSpec::durable("intake");
        assert_eq!(storage_for(&queue), StorageType::File);
        queue.durable = false;
        assert_eq!(storage_for(&queue), StorageType::Memory);
    }

    #[test]
    fn test_consumer_config_sets_ack_wait_and_prefetch() {
        let config = consumer_config("scrape", 1, Duration::from_secs(300));
        assert_eq!(config.durable_name.as_deref(), Some("scrape"));
        assert_eq!(config.ack_policy, AckPolicy::Explicit);
        assert_eq!(config.ack_wait, Duration::from_secs(300));
        assert_eq!(config.max_ack_pending, 1);

        // Prefetch 0 is never sent to the server
        assert_eq!(consumer_config("ai", 0, Duration::from_secs(1)).max_ack_pending, 1);
    }
}
