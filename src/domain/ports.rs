use super::intent::PurchaseIntent;
use super::product::Product;
use super::purchase::{OfferSignature, StorefrontPurchaseResult};
use super::transaction::TransactionId;
use super::verification::SignedTransaction;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unbounded, order-preserving push stream of transaction changes.
pub type TransactionUpdates = mpsc::UnboundedReceiver<SignedTransaction>;
/// Push stream of storefront-initiated purchase intents.
pub type PurchaseIntents = mpsc::UnboundedReceiver<PurchaseIntent>;

/// The remote storefront: catalog, payments, signing and transaction history.
///
/// Treated as a trusted oracle. Every record it hands out carries the outcome
/// of its own signature check, which callers classify with
/// [`crate::domain::verification::verify`].
#[async_trait]
pub trait Storefront: Send + Sync {
    async fn products(&self, product_ids: &[String]) -> Result<Vec<Product>>;
    async fn purchase(
        &self,
        product: &Product,
        quantity: u32,
        offer: Option<&OfferSignature>,
    ) -> Result<StorefrontPurchaseResult>;
    async fn current_entitlements(&self) -> Result<Vec<SignedTransaction>>;
    async fn all_transactions(&self) -> Result<Vec<SignedTransaction>>;
    async fn unfinished_transactions(&self) -> Result<Vec<SignedTransaction>>;
    /// Finishing an already finished transaction is a no-op.
    async fn finish(&self, transaction_id: TransactionId) -> Result<()>;
    /// Forces the storefront to re-deliver entitlements from its servers.
    async fn sync(&self) -> Result<()>;
    async fn can_make_payments(&self) -> bool;
    async fn is_eligible_for_intro_offer(&self, product: &Product) -> Result<bool>;
    fn transaction_updates(&self) -> TransactionUpdates;
    fn purchase_intents(&self) -> PurchaseIntents;
}

/// Holds the most recently loaded catalog snapshot.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn replace(&self, products: Vec<Product>) -> Result<()>;
    async fn get(&self, product_id: &str) -> Result<Option<Product>>;
    async fn all(&self) -> Result<Vec<Product>>;
}

/// Records which transactions this process has finished.
#[async_trait]
pub trait FinishLedger: Send + Sync {
    /// Claims `transaction_id`; `false` if it was already claimed.
    async fn claim(&self, transaction_id: TransactionId) -> Result<bool>;
    /// Drops a claim whose finish call did not go through.
    async fn release(&self, transaction_id: TransactionId) -> Result<()>;
    async fn contains(&self, transaction_id: TransactionId) -> Result<bool>;
}

pub type StorefrontHandle = Arc<dyn Storefront>;
pub type CatalogStoreBox = Box<dyn CatalogStore>;
pub type FinishLedgerHandle = Arc<dyn FinishLedger>;
