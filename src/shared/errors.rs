//! Error handling for the application

use thiserror::Error;

/// Retailer fetch errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Product not found")]
    NotFound,

    #[error("Failed to parse product page: {0}")]
    ParseFailure(String),

    #[error("Rate limited by retailer")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl FetchError {
    /// Transient failures worth another attempt. `NotFound` and
    /// `ParseFailure` mean the listing is gone or the layout changed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout | FetchError::NetworkError(_) | FetchError::RateLimited
        )
    }
}

/// Persistence errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Notification delivery error
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unsupported retailer: {0}")]
    UnsupportedRetailer(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("A sweep is already running")]
    SweepInProgress,

    #[error("Sweep cancelled by shutdown")]
    SweepCancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::NetworkError("reset".into()).is_retryable());
        assert!(!FetchError::NotFound.is_retryable());
        assert!(!FetchError::ParseFailure("no price".into()).is_retryable());
    }

    #[test]
    fn test_app_error_from_store_error() {
        let err: AppError = StoreError::NotFound("user 42".into()).into();
        assert_eq!(err.to_string(), "Store error: Record not found: user 42");
    }
}
