use super::product::Product;
use super::transaction::Transaction;
use super::verification::SignedTransaction;
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};

/// Signed promotional offer payload supplied by the host's server.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct OfferSignature {
    pub offer_id: String,
    pub key_id: String,
    pub nonce: String,
    pub signature: String,
    pub timestamp: i64,
}

impl OfferSignature {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("offer id", &self.offer_id),
            ("key id", &self.key_id),
            ("nonce", &self.nonce),
            ("signature", &self.signature),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(StoreError::DeveloperError(format!(
                "promotional offer is missing its {name}"
            )));
        }
        if self.timestamp <= 0 {
            return Err(StoreError::DeveloperError(
                "promotional offer timestamp must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct PurchaseRequest {
    pub product_id: String,
    pub offer: Option<OfferSignature>,
    pub quantity: u32,
}

impl PurchaseRequest {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            offer: None,
            quantity: 1,
        }
    }

    pub fn with_offer(mut self, offer: OfferSignature) -> Self {
        self.offer = Some(offer);
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Checks the request against the resolved catalog product before any
    /// storefront call is made.
    pub fn validate_for(&self, product: &Product) -> Result<()> {
        if self.quantity == 0 {
            return Err(StoreError::DeveloperError(
                "purchase quantity must be at least 1".to_string(),
            ));
        }
        if let Some(offer) = &self.offer {
            offer.validate()?;
            if product.promotional_offer(&offer.offer_id).is_none() {
                return Err(StoreError::DeveloperError(format!(
                    "product '{}' has no promotional offer '{}'",
                    product.id, offer.offer_id
                )));
            }
        }
        Ok(())
    }
}

/// What the storefront's purchase call answered.
#[derive(Debug, PartialEq, Clone)]
pub enum StorefrontPurchaseResult {
    Success(SignedTransaction),
    Pending,
    UserCancelled,
    Unknown,
}

/// The single terminal result of one purchase attempt.
#[derive(Debug, PartialEq, Clone)]
pub enum PurchaseOutcome {
    Success(Transaction),
    Pending,
    UserCancelled,
    Unverified {
        reason: String,
    },
    /// Payment went through but the delivered transaction or the entitlement
    /// feed disagrees with the requested product.
    ProductMismatch {
        transaction: Transaction,
        finished: bool,
    },
    /// Payment went through but the entitlement feed came back empty or could
    /// not be queried.
    TransactionNotFound {
        transaction: Transaction,
        finished: bool,
    },
    Unknown {
        message: Option<String>,
    },
}

impl PurchaseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PurchaseOutcome::Success(_))
    }
}
