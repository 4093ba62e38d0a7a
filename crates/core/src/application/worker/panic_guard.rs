// Panic isolation for stage handlers
use std::future::Future;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed (successfully or with an error value)
    Completed(T),
    /// Execution panicked
    Panicked(String),
}

/// Run a future on its own task so a panic cannot take the stage loop down
///
/// The JoinHandle reports the panic; the payload is turned into a message.
pub async fn execute_guarded<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn(future).await {
        Ok(value) => PanicGuardResult::Completed(value),
        Err(join_err) => {
            let panic_msg = if join_err.is_panic() {
                let payload = join_err.into_panic();
                if let Some(s) = payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                }
            } else {
                "Handler task cancelled".to_string()
            };

            error!(panic_msg = %panic_msg, "Stage handler panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_is_caught() {
        let result = execute_guarded(async { panic!("boom") }).await;
        match result {
            PanicGuardResult::<()>::Panicked(msg) => assert_eq!(msg, "boom"),
            PanicGuardResult::Completed(_) => panic!("expected panic"),
        }
    }

    #[tokio::test]
    async fn test_value_passes_through() {
        let result = execute_guarded(async { 41 + 1 }).await;
        assert!(matches!(result, PanicGuardResult::Completed(42)));
    }
}
