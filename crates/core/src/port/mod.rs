// Port Layer - Interfaces for external dependencies

pub mod broker;
pub mod completion;
pub mod marketplace;
pub mod profile_repository;
pub mod time_provider; // For deterministic testing
pub mod transaction;

// Re-exports
pub use broker::{BrokerConnection, BrokerConnector, Delivery, DeliveryAcker, DeliveryStream};
pub use completion::{ChatCompletionRequest, ChatCompletions, TextCompleter};
pub use marketplace::{MarketplaceSearch, SearchPage};
pub use profile_repository::ProfileRepository;
pub use time_provider::{SystemTimeProvider, TimeProvider};
pub use transaction::{ProfileTransaction, Transaction, TransactionalProfileRepository};
