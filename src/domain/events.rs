//! Records pushed asynchronously to the host.

use super::purchase::PurchaseOutcome;
use super::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PURCHASED_STATE: &str = "purchased";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ProductIdMismatch,
    TransactionNotFound,
    UnverifiedPurchase,
    PurchasePending,
    UserCancelled,
    Unknown,
    DeveloperError,
}

impl ErrorCode {
    fn response_code(self) -> u16 {
        match self {
            ErrorCode::ProductIdMismatch => 400,
            ErrorCode::TransactionNotFound => 404,
            ErrorCode::UnverifiedPurchase => 403,
            ErrorCode::PurchasePending => 202,
            ErrorCode::UserCancelled => 499,
            ErrorCode::Unknown => 520,
            ErrorCode::DeveloperError => 400,
        }
    }

    fn debug_message(self) -> &'static str {
        match self {
            ErrorCode::ProductIdMismatch => "Product ID mismatch after verification.",
            ErrorCode::TransactionNotFound => "Transaction not found.",
            ErrorCode::UnverifiedPurchase => "Unverified purchase. Possibly jailbroken device.",
            ErrorCode::PurchasePending => "Purchase is pending approval.",
            ErrorCode::UserCancelled => "User cancelled the transaction.",
            ErrorCode::Unknown => "Unknown error occurred.",
            ErrorCode::DeveloperError => "Invalid purchase request.",
        }
    }

    fn message(self) -> &'static str {
        match self {
            ErrorCode::ProductIdMismatch => "Something went wrong. Please contact support.",
            ErrorCode::TransactionNotFound => {
                "We couldn't verify your purchase. Please try again later."
            }
            ErrorCode::UnverifiedPurchase => "We couldn't verify your purchase.",
            ErrorCode::PurchasePending => {
                "Your purchase is pending. Please wait or check with your payment provider."
            }
            ErrorCode::UserCancelled => "You cancelled the transaction.",
            ErrorCode::Unknown => "Something went wrong. Please try again later.",
            ErrorCode::DeveloperError => "This product is not available for purchase.",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseUpdate {
    pub product_id: String,
    pub transaction_id: String,
    pub transaction_date: DateTime<Utc>,
    pub original_transaction_date: DateTime<Utc>,
    pub original_transaction_id: String,
    pub state: String,
}

impl From<&Transaction> for PurchaseUpdate {
    fn from(tx: &Transaction) -> Self {
        Self {
            product_id: tx.product_id.clone(),
            transaction_id: tx.id.to_string(),
            transaction_date: tx.purchase_date,
            original_transaction_date: tx.original_purchase_date,
            original_transaction_id: tx.original_id.to_string(),
            state: PURCHASED_STATE.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseErrorEvent {
    pub response_code: u16,
    pub debug_message: String,
    pub code: ErrorCode,
    pub message: String,
}

impl PurchaseErrorEvent {
    /// Builds the record for `code`; a `detail` replaces the default debug
    /// message and, for `Unknown`, marks the error as an underlying exception.
    pub fn new(code: ErrorCode, detail: Option<String>) -> Self {
        let response_code = match (code, &detail) {
            (ErrorCode::Unknown, Some(_)) => 500,
            _ => code.response_code(),
        };
        Self {
            response_code,
            debug_message: detail.unwrap_or_else(|| code.debug_message().to_string()),
            code,
            message: code.message().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "event", content = "payload")]
pub enum OutboundEvent {
    #[serde(rename = "purchase-updated")]
    PurchaseUpdated(PurchaseUpdate),
    #[serde(rename = "purchase-error")]
    PurchaseError(PurchaseErrorEvent),
    #[serde(rename = "iap-promoted-product", rename_all = "camelCase")]
    PromotedProduct { intent_id: String, product_id: String },
}

impl From<&PurchaseOutcome> for OutboundEvent {
    fn from(outcome: &PurchaseOutcome) -> Self {
        let error = |code, detail| OutboundEvent::PurchaseError(PurchaseErrorEvent::new(code, detail));
        match outcome {
            PurchaseOutcome::Success(tx) => OutboundEvent::PurchaseUpdated(tx.into()),
            PurchaseOutcome::Pending => error(ErrorCode::PurchasePending, None),
            PurchaseOutcome::UserCancelled => error(ErrorCode::UserCancelled, None),
            PurchaseOutcome::Unverified { reason } => error(
                ErrorCode::UnverifiedPurchase,
                Some(format!("Unverified purchase: {reason}")),
            ),
            PurchaseOutcome::ProductMismatch { .. } => error(ErrorCode::ProductIdMismatch, None),
            PurchaseOutcome::TransactionNotFound { .. } => {
                error(ErrorCode::TransactionNotFound, None)
            }
            PurchaseOutcome::Unknown { message } => error(ErrorCode::Unknown, message.clone()),
        }
    }
}
