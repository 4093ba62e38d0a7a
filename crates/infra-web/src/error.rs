// reqwest error mapping

use smartsearch_core::error::AppError;

/// Convert a transport-level reqwest error into AppError
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> AppError {
    if let Some(status) = err.status() {
        return AppError::Upstream {
            status: status.as_u16(),
            message: err.to_string(),
        };
    }
    if err.is_builder() {
        return AppError::Config(format!("HTTP client: {}", err));
    }
    // timeouts, refused/reset connections, body read failures
    AppError::Network(err.to_string())
}

/// Cap upstream bodies quoted in error messages
pub(crate) fn truncate_body(body: &str, max_chars: usize) -> String {
    let mut out: String = body.chars().take(max_chars).collect();
    if body.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
