// Smart Search Infrastructure - NATS JetStream Adapter
// Implements: BrokerConnector, BrokerConnection, DeliveryStream, DeliveryAcker
//
// Queue vocabulary maps onto JetStream as follows:
//   queue            -> stream (work-queue retention), subject "pipeline.<queue>"
//   exchange binding -> extra subject "<exchange>.<routing_key>" on the same stream
//   prefetch         -> durable pull consumer with max_ack_pending

mod config;
mod connection;
mod delivery;
mod error;
mod mapping;

pub use config::NatsConfig;
pub use connection::{NatsConnection, NatsConnector};
pub use delivery::NatsDeliveryStream;
pub use mapping::{publish_subject, stream_name};
