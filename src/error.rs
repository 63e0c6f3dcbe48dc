use crate::domain::events::{ErrorCode, PurchaseErrorEvent};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Developer error: {0}")]
    DeveloperError(String),

    #[error("None of the requested product ids are valid")]
    InvalidProductIds,

    #[error("Product load failed for {0:?}")]
    ProductsNotLoaded(Vec<String>),

    #[error("Storefront error: {0}")]
    Storefront(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Maps a synchronously returned error onto the `purchase-error` record the
    /// host understands.
    pub fn to_error_event(&self) -> PurchaseErrorEvent {
        match self {
            StoreError::DeveloperError(msg) => {
                PurchaseErrorEvent::new(ErrorCode::DeveloperError, Some(msg.clone()))
            }
            StoreError::InvalidProductIds | StoreError::ProductsNotLoaded(_) => {
                PurchaseErrorEvent::new(ErrorCode::DeveloperError, Some(self.to_string()))
            }
            other => PurchaseErrorEvent::new(ErrorCode::Unknown, Some(other.to_string())),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::InternalError(Box::new(err))
    }
}

impl From<tokio::sync::watch::error::RecvError> for StoreError {
    fn from(err: tokio::sync::watch::error::RecvError) -> Self {
        StoreError::InternalError(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_developer_error_maps_to_developer_code() {
        let event = StoreError::DeveloperError("unknown product".into()).to_error_event();
        assert_eq!(event.code, ErrorCode::DeveloperError);
        assert_eq!(event.debug_message, "unknown product");
    }

    #[test]
    fn test_storefront_error_maps_to_unknown_with_message() {
        let event = StoreError::Storefront("offline".into()).to_error_event();
        assert_eq!(event.code, ErrorCode::Unknown);
        assert_eq!(event.response_code, 500);
        assert!(event.debug_message.contains("offline"));
    }
}
