use crate::domain::ports::{FinishLedgerHandle, StorefrontHandle};
use crate::domain::transaction::TransactionId;
use crate::error::Result;
use tracing::{debug, warn};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FinishStatus {
    Finished,
    AlreadyFinished,
}

/// Acknowledges verified transactions to the storefront at most once.
///
/// Shared by the purchase path, the update listener and the host's finish
/// calls, so a transaction reached from several paths is still acknowledged a
/// single time.
#[derive(Clone)]
pub struct Finisher {
    storefront: StorefrontHandle,
    ledger: FinishLedgerHandle,
}

impl Finisher {
    pub fn new(storefront: StorefrontHandle, ledger: FinishLedgerHandle) -> Self {
        Self { storefront, ledger }
    }

    /// Callers must only pass ids of transactions classified as verified.
    pub async fn finish(&self, transaction_id: TransactionId) -> Result<FinishStatus> {
        if !self.ledger.claim(transaction_id).await? {
            debug!(transaction_id, "Transaction already finished");
            return Ok(FinishStatus::AlreadyFinished);
        }

        if let Err(err) = self.storefront.finish(transaction_id).await {
            warn!(transaction_id, error = %err, "Finish failed, transaction stays unfinished");
            self.ledger.release(transaction_id).await?;
            return Err(err);
        }

        debug!(transaction_id, "Transaction finished");
        Ok(FinishStatus::Finished)
    }

    pub async fn is_finished(&self, transaction_id: TransactionId) -> Result<bool> {
        self.ledger.contains(transaction_id).await
    }
}
