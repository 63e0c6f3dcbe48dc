use super::finisher::Finisher;
use crate::domain::ports::TransactionUpdates;
use crate::domain::verification::{VerificationOutcome, verify};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Drains transaction changes that did not start from a local purchase call:
/// resolved pending purchases, refunds, renewals and family-sharing grants.
///
/// Every verified item is finished; unverified items are logged and skipped.
pub struct TransactionUpdateListener {
    finisher: Finisher,
    handled: watch::Sender<u64>,
}

impl TransactionUpdateListener {
    pub fn new(finisher: Finisher, handled: watch::Sender<u64>) -> Self {
        Self { finisher, handled }
    }

    /// Runs until `shutdown` flips or the storefront closes the stream.
    ///
    /// An item that has been received is always handled to completion before
    /// shutdown is observed; items still queued stay unfinished at the
    /// storefront and are delivered again on the next start.
    pub async fn run(self, mut updates: TransactionUpdates, mut shutdown: watch::Receiver<bool>) {
        info!("Transaction update listener started");
        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Transaction update listener shutting down");
                    break;
                }
                update = updates.recv() => match update {
                    Some(record) => {
                        match verify(record) {
                            VerificationOutcome::Verified(tx) => {
                                debug!(
                                    transaction_id = tx.id,
                                    product_id = %tx.product_id,
                                    revoked = tx.is_revoked(),
                                    renewal = tx.is_renewal(),
                                    "Transaction update received"
                                );
                                if let Err(err) = self.finisher.finish(tx.id).await {
                                    error!(transaction_id = tx.id, error = %err, "Failed to finish updated transaction");
                                }
                            }
                            VerificationOutcome::Unverified { reason, .. } => {
                                warn!(%reason, "Skipping unverified transaction update");
                            }
                        }
                        self.handled.send_modify(|count| *count += 1);
                    }
                    None => {
                        info!("Transaction update stream closed");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Storefront;
    use crate::domain::product::{Product, ProductKind};
    use crate::infrastructure::in_memory::InMemoryFinishLedger;
    use crate::infrastructure::simulated::SimulatedStorefront;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Harness {
        store: SimulatedStorefront,
        handled: watch::Receiver<u64>,
        shutdown: watch::Sender<bool>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start() -> Harness {
        let store = SimulatedStorefront::new();
        store.stock(Product::new("B", ProductKind::NonConsumable, dec!(2.99), "USD"));
        let finisher = Finisher::new(Arc::new(store.clone()), Arc::new(InMemoryFinishLedger::new()));
        let (handled_tx, handled) = watch::channel(0);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let listener = TransactionUpdateListener::new(finisher, handled_tx);
        let task = tokio::spawn(listener.run(store.transaction_updates(), shutdown_rx));
        Harness {
            store,
            handled,
            shutdown,
            task,
        }
    }

    #[tokio::test]
    async fn test_verified_updates_are_finished() {
        let mut h = start();
        let tx = h.store.deliver("B", Some(2)).unwrap();

        h.handled.wait_for(|n| *n >= 1).await.unwrap();
        assert!(!h.store.is_unfinished(tx.id));
        assert_eq!(h.store.finish_calls(tx.id), 1);

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unverified_updates_are_skipped_and_loop_continues() {
        let mut h = start();
        let bad = h.store.deliver_unverified("B", "tampered").unwrap();
        let good = h.store.deliver("B", None).unwrap();

        h.handled.wait_for(|n| *n >= 2).await.unwrap();
        assert!(h.store.is_unfinished(bad.id));
        assert_eq!(h.store.finish_calls(bad.id), 0);
        assert!(!h.store.is_unfinished(good.id));

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_refund_update_is_acknowledged_once() {
        let mut h = start();
        let tx = h.store.deliver("B", None).unwrap();
        h.store.revoke(tx.id).unwrap();

        h.handled.wait_for(|n| *n >= 2).await.unwrap();
        assert_eq!(h.store.finish_calls(tx.id), 1);

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_storefront_failure_does_not_stop_the_loop() {
        let mut h = start();
        h.store.set_offline(true);
        let first = h.store.deliver("B", None).unwrap();
        h.handled.wait_for(|n| *n >= 1).await.unwrap();
        assert!(h.store.is_unfinished(first.id));

        h.store.set_offline(false);
        let second = h.store.deliver("B", None).unwrap();
        h.handled.wait_for(|n| *n >= 2).await.unwrap();
        assert!(!h.store.is_unfinished(second.id));

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap();
    }
}
