//! HTTP API Layer
//!
//! Thin synchronous front door: it validates a form, hands it to the
//! intake queue and answers immediately. Profile lookups read the store,
//! and chat completions are relayed to the model provider.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::AppState;
pub use server::{HttpServer, HttpServerConfig};
