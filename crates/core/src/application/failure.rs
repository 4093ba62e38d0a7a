// Failure Classifier
use crate::error::AppError;

/// Retry policy class of a failed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying: nack with requeue
    Transient,
    /// Will fail identically: nack without requeue
    Permanent,
    /// Missing configuration: drop and alert an operator
    ConfigFatal,
}

impl FailureClass {
    /// Requeue flag for the nack
    pub fn requeue(&self) -> bool {
        matches!(self, FailureClass::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::Permanent => "permanent",
            FailureClass::ConfigFatal => "config_fatal",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an error to its failure class
///
/// Anything not explicitly permanent or fatal is transient: losing work is
/// worse than processing it twice.
pub fn classify(error: &AppError) -> FailureClass {
    match error {
        AppError::Decode(_) | AppError::Validation(_) | AppError::NotFound(_) => {
            FailureClass::Permanent
        }
        AppError::Upstream { status, .. } => classify_status(*status),
        AppError::Config(_) | AppError::TopologyConflict(_) => FailureClass::ConfigFatal,
        AppError::Network(_)
        | AppError::EmptyCompletion(_)
        | AppError::Database(_)
        | AppError::Broker(_)
        | AppError::Domain(_)
        | AppError::Internal(_) => FailureClass::Transient,
    }
}

fn classify_status(status: u16) -> FailureClass {
    match status {
        429 => FailureClass::Transient,
        400..=499 => FailureClass::Permanent,
        _ => FailureClass::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: u16) -> AppError {
        AppError::Upstream {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_http_status_classes() {
        assert_eq!(classify(&upstream(429)), FailureClass::Transient);
        assert_eq!(classify(&upstream(500)), FailureClass::Transient);
        assert_eq!(classify(&upstream(503)), FailureClass::Transient);
        assert_eq!(classify(&upstream(400)), FailureClass::Permanent);
        assert_eq!(classify(&upstream(401)), FailureClass::Permanent);
        assert_eq!(classify(&upstream(404)), FailureClass::Permanent);
    }

    #[test]
    fn test_payload_errors_are_permanent() {
        assert_eq!(
            classify(&AppError::Decode("x".into())),
            FailureClass::Permanent
        );
        assert_eq!(
            classify(&AppError::Validation("x".into())),
            FailureClass::Permanent
        );
    }

    #[test]
    fn test_config_is_fatal_and_unknown_is_transient() {
        assert_eq!(
            classify(&AppError::Config("no key".into())),
            FailureClass::ConfigFatal
        );
        assert_eq!(
            classify(&AppError::TopologyConflict("q".into())),
            FailureClass::ConfigFatal
        );
        assert_eq!(
            classify(&AppError::Internal("?".into())),
            FailureClass::Transient
        );
        assert_eq!(
            classify(&AppError::Network("reset".into())),
            FailureClass::Transient
        );
    }

    #[test]
    fn test_only_transient_requeues() {
        assert!(FailureClass::Transient.requeue());
        assert!(!FailureClass::Permanent.requeue());
        assert!(!FailureClass::ConfigFatal.requeue());
    }
}
