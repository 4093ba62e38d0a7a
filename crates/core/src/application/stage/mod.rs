// Stage Handlers - the domain action of each pipeline stage

pub mod ai;
pub mod collector;
pub mod extraction;
pub mod intake;
pub mod scrape;

pub use ai::AiStage;
pub use collector::UrlCollector;
pub use extraction::{
    BareArray, BoxedNotation, ExtractionStrategy, FencedCodeBlock, SearchTermExtractor,
};
pub use intake::IntakeStage;
pub use scrape::ScrapeStage;

use crate::domain::{Outbound, StagePayload, StageSpec};
use crate::error::{AppError, Result};
use async_trait::async_trait;

/// Domain action run by a stage consumer for every decoded message
///
/// The consumer owns delivery: it decodes, calls `handle`, publishes the
/// returned messages and only then acks.
#[async_trait]
pub trait StageHandler: Send + Sync + 'static {
    type Input: StagePayload;

    fn spec(&self) -> &StageSpec;

    /// Process one input, returning messages for downstream queues
    async fn handle(&self, input: Self::Input) -> Result<Vec<Outbound>>;

    /// Message published (best effort) when an input is dropped
    fn rejection_notice(&self, _error: &AppError) -> Option<Outbound> {
        None
    }
}
