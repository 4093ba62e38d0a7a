// Application Layer - Pipeline orchestration

pub mod codec;
pub mod connection;
pub mod failure;
pub mod producer;
pub mod stage;
pub mod topology;
pub mod worker;

// Re-exports
pub use connection::{connect_with_retry, ConnectPolicy};
pub use failure::{classify, FailureClass};
pub use producer::StageProducer;
pub use stage::{AiStage, IntakeStage, ScrapeStage, SearchTermExtractor, StageHandler, UrlCollector};
pub use topology::TopologyRegistrar;
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, StageConsumer};
