use super::product::Product;

/// A purchase started from the storefront itself rather than from the host.
#[derive(Debug, PartialEq, Clone)]
pub struct PurchaseIntent {
    pub id: String,
    pub product: Product,
}
