use crate::error::StoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ProductKind {
    Consumable,
    NonConsumable,
    Subscription,
}

impl ProductKind {
    /// Whether the storefront lists this kind of product in its entitlement feed.
    pub fn is_entitlement_tracked(self) -> bool {
        !matches!(self, ProductKind::Consumable)
    }
}

impl FromStr for ProductKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumable" => Ok(ProductKind::Consumable),
            "non-consumable" => Ok(ProductKind::NonConsumable),
            "subscription" => Ok(ProductKind::Subscription),
            other => Err(StoreError::DeveloperError(format!(
                "unknown product kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Price {
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct SubscriptionPeriod {
    pub value: u32,
    pub unit: PeriodUnit,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMode {
    FreeTrial,
    PayAsYouGo,
    PayUpFront,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct IntroductoryOffer {
    pub price: Decimal,
    pub payment_mode: PaymentMode,
    pub period: SubscriptionPeriod,
    pub period_count: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PromotionalOffer {
    pub id: String,
    pub price: Decimal,
    pub payment_mode: PaymentMode,
    pub period: SubscriptionPeriod,
}

/// A catalog entry as returned by the storefront.
///
/// Products are immutable once fetched; the whole catalog snapshot is replaced
/// on every load.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Product {
    pub id: String,
    pub kind: ProductKind,
    pub price: Price,
    pub display_name: String,
    pub description: String,
    pub display_price: String,
    pub introductory_offer: Option<IntroductoryOffer>,
    pub promotional_offers: Vec<PromotionalOffer>,
    pub subscription_period: Option<SubscriptionPeriod>,
}

impl Product {
    pub fn new(id: impl Into<String>, kind: ProductKind, amount: Decimal, currency: &str) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            description: String::new(),
            display_price: format!("{amount} {currency}"),
            price: Price {
                amount,
                currency: currency.to_string(),
            },
            id,
            kind,
            introductory_offer: None,
            promotional_offers: Vec::new(),
            subscription_period: None,
        }
    }

    pub fn promotional_offer(&self, offer_id: &str) -> Option<&PromotionalOffer> {
        self.promotional_offers.iter().find(|o| o.id == offer_id)
    }
}
