use crate::domain::entitlement::EntitlementSet;
use crate::domain::ports::StorefrontHandle;
use crate::domain::transaction::Transaction;
use crate::domain::verification::verified_only;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Builds entitlement views from fresh storefront queries.
///
/// Queries take the sync gate for reading and `sync` takes it for writing, so
/// a cross-check never observes a half-finished storefront sync.
#[derive(Clone)]
pub struct EntitlementReconciler {
    storefront: StorefrontHandle,
    sync_gate: Arc<RwLock<()>>,
}

impl EntitlementReconciler {
    pub fn new(storefront: StorefrontHandle) -> Self {
        Self {
            storefront,
            sync_gate: Arc::new(RwLock::new(())),
        }
    }

    /// Verified, non-revoked transactions from the live entitlement feed.
    pub async fn current_entitlements(&self) -> Result<EntitlementSet> {
        let _gate = self.sync_gate.read().await;
        let records = self.storefront.current_entitlements().await?;
        let set = EntitlementSet::from_verified(verified_only(records));
        debug!(entitlements = set.len(), "Entitlements queried");
        Ok(set)
    }

    /// Every verified transaction the user ever made, revoked ones included.
    pub async fn all_historical_transactions(&self) -> Result<Vec<Transaction>> {
        let _gate = self.sync_gate.read().await;
        let records = self.storefront.all_transactions().await?;
        Ok(verified_only(records))
    }

    /// Verified transactions the storefront still considers unfinished.
    pub async fn unfinished_transactions(&self) -> Result<Vec<Transaction>> {
        let _gate = self.sync_gate.read().await;
        let records = self.storefront.unfinished_transactions().await?;
        Ok(verified_only(records))
    }

    pub async fn sync(&self) -> Result<()> {
        let _gate = self.sync_gate.write().await;
        self.storefront.sync().await?;
        info!("Storefront sync completed");
        Ok(())
    }
}
