use super::product::{PaymentMode, ProductKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TransactionId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OfferType {
    Introductory,
    Promotional,
    Code,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct TransactionOffer {
    pub offer_type: OfferType,
    pub payment_mode: Option<PaymentMode>,
}

/// A purchase fact delivered by the storefront.
///
/// Transactions are never mutated here; the only decision taken about one is
/// whether to finish it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub product_id: String,
    pub product_kind: ProductKind,
    pub purchase_date: DateTime<Utc>,
    pub original_purchase_date: DateTime<Utc>,
    /// Links renewals back to the first purchase.
    pub original_id: TransactionId,
    pub quantity: u32,
    pub revocation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub offer: Option<TransactionOffer>,
}

impl Transaction {
    /// A first purchase: original id and date equal its own.
    pub fn new(
        id: TransactionId,
        product_id: impl Into<String>,
        product_kind: ProductKind,
        purchase_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id: product_id.into(),
            product_kind,
            purchase_date,
            original_purchase_date: purchase_date,
            original_id: id,
            quantity: 1,
            revocation_date: None,
            expiration_date: None,
            offer: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revocation_date.is_some()
    }

    pub fn is_renewal(&self) -> bool {
        self.id != self.original_id
    }

    /// Expiration date of a transaction bought under a free trial or an
    /// introductory offer, `None` for a paid period.
    pub fn trial_expiration(&self) -> Option<DateTime<Utc>> {
        let offer = self.offer?;
        let trial = match offer.payment_mode {
            Some(mode) => mode == PaymentMode::FreeTrial,
            None => offer.offer_type == OfferType::Introductory,
        };
        if trial { self.expiration_date } else { None }
    }
}
