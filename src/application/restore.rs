use super::reconciler::EntitlementReconciler;
use crate::domain::transaction::Transaction;
use serde::Serialize;
use tracing::{info, instrument, warn};

#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum RestoreOutcome {
    Active(Vec<Transaction>),
    /// The user bought something before but nothing is active now.
    Expired,
    NeverPurchased,
    /// The sync itself failed; says nothing about what the user owns.
    Failure(String),
}

pub struct RestoreCoordinator {
    reconciler: EntitlementReconciler,
}

impl RestoreCoordinator {
    pub fn new(reconciler: EntitlementReconciler) -> Self {
        Self { reconciler }
    }

    #[instrument(skip(self))]
    pub async fn restore(&self) -> RestoreOutcome {
        if let Err(err) = self.reconciler.sync().await {
            warn!(error = %err, "Restore sync failed");
            return RestoreOutcome::Failure(err.to_string());
        }

        let active = match self.reconciler.current_entitlements().await {
            Ok(set) => set,
            Err(err) => return RestoreOutcome::Failure(err.to_string()),
        };
        if !active.is_empty() {
            info!(entitlements = active.len(), "Restored active entitlements");
            return RestoreOutcome::Active(active.into_transactions());
        }

        match self.reconciler.all_historical_transactions().await {
            Ok(history) if history.is_empty() => RestoreOutcome::NeverPurchased,
            Ok(_) => RestoreOutcome::Expired,
            Err(err) => RestoreOutcome::Failure(err.to_string()),
        }
    }
}
