use crate::domain::ports::{CatalogStore, FinishLedger};
use crate::domain::product::Product;
use crate::domain::transaction::TransactionId;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory catalog snapshot.
///
/// Uses `Arc<RwLock<HashMap<String, Product>>>` so purchase resolution can read
/// concurrently while a catalog load swaps the whole snapshot.
#[derive(Default, Clone)]
pub struct InMemoryCatalogStore {
    products: Arc<RwLock<HashMap<String, Product>>>,
}

impl InMemoryCatalogStore {
    /// Creates a new, empty catalog store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn replace(&self, products: Vec<Product>) -> Result<()> {
        let mut snapshot = self.products.write().await;
        *snapshot = products.into_iter().map(|p| (p.id.clone(), p)).collect();
        Ok(())
    }

    async fn get(&self, product_id: &str) -> Result<Option<Product>> {
        let snapshot = self.products.read().await;
        Ok(snapshot.get(product_id).cloned())
    }

    async fn all(&self) -> Result<Vec<Product>> {
        let snapshot = self.products.read().await;
        let mut products: Vec<Product> = snapshot.values().cloned().collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(products)
    }
}

/// A thread-safe in-memory record of finished transaction ids.
///
/// Claims are taken under the write lock, so two concurrent finishers of the
/// same id can never both win.
#[derive(Default, Clone)]
pub struct InMemoryFinishLedger {
    finished: Arc<RwLock<HashSet<TransactionId>>>,
}

impl InMemoryFinishLedger {
    /// Creates a new, empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FinishLedger for InMemoryFinishLedger {
    async fn claim(&self, transaction_id: TransactionId) -> Result<bool> {
        let mut finished = self.finished.write().await;
        Ok(finished.insert(transaction_id))
    }

    async fn release(&self, transaction_id: TransactionId) -> Result<()> {
        let mut finished = self.finished.write().await;
        finished.remove(&transaction_id);
        Ok(())
    }

    async fn contains(&self, transaction_id: TransactionId) -> Result<bool> {
        let finished = self.finished.read().await;
        Ok(finished.contains(&transaction_id))
    }
}
