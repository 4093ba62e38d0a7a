// Smart Search Infrastructure - Web Collaborators
// Implements: TextCompleter (OpenRouter), MarketplaceSearch (MercadoLibre)

mod error;
mod mercadolibre;
mod openrouter;

pub use mercadolibre::{listing_url, parse_listing, MercadoLibreConfig, MercadoLibreSearch};
pub use openrouter::{OpenRouterClient, OpenRouterConfig};
