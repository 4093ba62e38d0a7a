// async-nats error mapping

use smartsearch_core::error::AppError;
use std::fmt::Display;

/// Wrap any async-nats error as a broker failure, keeping the operation name
pub(crate) fn broker_error<E: Display>(operation: &'static str) -> impl Fn(E) -> AppError {
    move |err| AppError::Broker(format!("{}: {}", operation, err))
}
