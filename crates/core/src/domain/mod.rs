// Domain Layer - Queues, stages, envelopes and payload schemas

pub mod envelope;
pub mod error;
pub mod payload;
pub mod profile;
pub mod queue;
pub mod stage;

// Re-exports
pub use envelope::{DeliveryTag, Envelope, Outbound, JSON_CONTENT_TYPE};
pub use error::DomainError;
pub use payload::{
    AiRequest, IntakeForm, IntakeReply, ProfileAnswers, ScrapeRequest, ScrapedUrls,
    StagePayload, UserSummary,
};
pub use profile::{FoundUrl, NewUser, RequestId, RequestRecord, StoredProfile, UserId};
pub use queue::{
    ExchangeBinding, PipelineTopology, QueueId, QueueSpec, AI_REQUESTS_QUEUE, DISPLAY_EXCHANGE,
    INTAKE_QUEUE, RESPONSES_QUEUE, SCRAPED_URLS_QUEUE, SCRAPE_REQUESTS_QUEUE,
};
pub use stage::{ConsumerState, StageKind, StageSpec, STAGE_PREFETCH};
