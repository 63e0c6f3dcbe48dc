use super::emitter::EventEmitter;
use super::finisher::Finisher;
use super::reconciler::EntitlementReconciler;
use crate::config::UnmatchedPolicy;
use crate::domain::events::OutboundEvent;
use crate::domain::ports::StorefrontHandle;
use crate::domain::product::{Product, ProductKind};
use crate::domain::purchase::{PurchaseOutcome, PurchaseRequest, StorefrontPurchaseResult};
use crate::domain::transaction::Transaction;
use crate::domain::verification::{VerificationOutcome, verify};
use crate::error::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Handle on a purchase running in the background.
///
/// Dropping it leaves the purchase running; the outcome still reaches the host
/// through the event channel.
pub struct PurchaseTicket {
    handle: JoinHandle<PurchaseOutcome>,
}

impl PurchaseTicket {
    pub(crate) fn new(handle: JoinHandle<PurchaseOutcome>) -> Self {
        Self { handle }
    }

    /// Waits for the purchase's single outcome.
    pub async fn outcome(self) -> Result<PurchaseOutcome> {
        Ok(self.handle.await?)
    }
}

/// Drives one purchase attempt through the storefront and emits exactly one
/// outbound event for it.
pub struct PurchaseOrchestrator {
    storefront: StorefrontHandle,
    reconciler: EntitlementReconciler,
    finisher: Finisher,
    emitter: EventEmitter,
    unmatched: UnmatchedPolicy,
}

impl PurchaseOrchestrator {
    pub fn new(
        storefront: StorefrontHandle,
        reconciler: EntitlementReconciler,
        finisher: Finisher,
        emitter: EventEmitter,
        unmatched: UnmatchedPolicy,
    ) -> Self {
        Self {
            storefront,
            reconciler,
            finisher,
            emitter,
            unmatched,
        }
    }

    /// `request` must already be validated against `product`.
    #[instrument(skip_all, fields(product_id = %product.id, quantity = request.quantity))]
    pub async fn execute(&self, product: Product, request: PurchaseRequest) -> PurchaseOutcome {
        let outcome = self.attempt(&product, &request).await;
        info!(outcome = outcome_label(&outcome), "Purchase attempt completed");
        self.emitter.emit(OutboundEvent::from(&outcome));
        outcome
    }

    async fn attempt(&self, product: &Product, request: &PurchaseRequest) -> PurchaseOutcome {
        let result = match self
            .storefront
            .purchase(product, request.quantity, request.offer.as_ref())
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "Storefront purchase call failed");
                return PurchaseOutcome::Unknown {
                    message: Some(err.to_string()),
                };
            }
        };

        match result {
            StorefrontPurchaseResult::Success(record) => match verify(record) {
                VerificationOutcome::Verified(tx) => self.confirm(product, tx).await,
                VerificationOutcome::Unverified { reason, .. } => {
                    PurchaseOutcome::Unverified { reason }
                }
            },
            StorefrontPurchaseResult::Pending => PurchaseOutcome::Pending,
            StorefrontPurchaseResult::UserCancelled => PurchaseOutcome::UserCancelled,
            StorefrontPurchaseResult::Unknown => PurchaseOutcome::Unknown { message: None },
        }
    }

    /// Cross-checks a verified transaction before reporting success.
    async fn confirm(&self, product: &Product, tx: Transaction) -> PurchaseOutcome {
        // The entitlement feed never lists consumables, so they are checked
        // against the delivered transaction alone. The delivered transaction is
        // real either way and is finished so it does not linger as unfinished.
        if product.kind == ProductKind::Consumable || tx.product_kind == ProductKind::Consumable {
            let finished = self.finish(&tx).await;
            return if tx.product_id == product.id {
                PurchaseOutcome::Success(tx)
            } else {
                warn!(delivered = %tx.product_id, "Purchase delivered another product");
                PurchaseOutcome::ProductMismatch {
                    transaction: tx,
                    finished,
                }
            };
        }

        let entitlements = match self.reconciler.current_entitlements().await {
            Ok(set) => Some(set),
            Err(err) => {
                warn!(error = %err, "Entitlement query failed after purchase");
                None
            }
        };

        match entitlements {
            Some(set) if set.contains(&product.id) => {
                self.finish(&tx).await;
                PurchaseOutcome::Success(tx)
            }
            Some(set) if !set.is_empty() => {
                warn!(transaction_id = tx.id, "Purchased product missing from entitlements");
                let finished = self.finish_unmatched(&tx).await;
                PurchaseOutcome::ProductMismatch {
                    transaction: tx,
                    finished,
                }
            }
            _ => {
                warn!(transaction_id = tx.id, "No entitlement found for purchase");
                let finished = self.finish_unmatched(&tx).await;
                PurchaseOutcome::TransactionNotFound {
                    transaction: tx,
                    finished,
                }
            }
        }
    }

    async fn finish_unmatched(&self, tx: &Transaction) -> bool {
        match self.unmatched {
            UnmatchedPolicy::LeaveUnfinished => {
                debug!(transaction_id = tx.id, "Leaving unmatched transaction unfinished");
                false
            }
            UnmatchedPolicy::FinishAndReport => self.finish(tx).await,
        }
    }

    /// A failed finish leaves the transaction for the listener or a
    /// clear-unfinished pass; the purchase outcome itself stands.
    async fn finish(&self, tx: &Transaction) -> bool {
        match self.finisher.finish(tx.id).await {
            Ok(_) => true,
            Err(err) => {
                warn!(transaction_id = tx.id, error = %err, "Could not finish purchased transaction");
                false
            }
        }
    }
}

fn outcome_label(outcome: &PurchaseOutcome) -> &'static str {
    match outcome {
        PurchaseOutcome::Success(_) => "success",
        PurchaseOutcome::Pending => "pending",
        PurchaseOutcome::UserCancelled => "user-cancelled",
        PurchaseOutcome::Unverified { .. } => "unverified",
        PurchaseOutcome::ProductMismatch { .. } => "product-mismatch",
        PurchaseOutcome::TransactionNotFound { .. } => "transaction-not-found",
        PurchaseOutcome::Unknown { .. } => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::emitter::{self, EventReceiver};
    use crate::domain::events::ErrorCode;
    use crate::infrastructure::in_memory::InMemoryFinishLedger;
    use crate::infrastructure::simulated::{ScriptedResponse, SimulatedStorefront};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn setup(unmatched: UnmatchedPolicy) -> (SimulatedStorefront, PurchaseOrchestrator, EventReceiver) {
        let store = SimulatedStorefront::new();
        store.stock(Product::new("A", ProductKind::NonConsumable, dec!(4.99), "USD"));
        store.stock(Product::new("B", ProductKind::NonConsumable, dec!(2.99), "USD"));
        store.stock(Product::new("coins", ProductKind::Consumable, dec!(0.99), "USD"));
        store.stock(Product::new("gems", ProductKind::Consumable, dec!(0.99), "USD"));

        let handle: StorefrontHandle = Arc::new(store.clone());
        let (emitter, events) = emitter::channel();
        let orchestrator = PurchaseOrchestrator::new(
            handle.clone(),
            EntitlementReconciler::new(handle.clone()),
            Finisher::new(handle, Arc::new(InMemoryFinishLedger::new())),
            emitter,
            unmatched,
        );
        (store, orchestrator, events)
    }

    fn product(id: &str, kind: ProductKind) -> Product {
        Product::new(id, kind, dec!(0.99), "USD")
    }

    fn single_error_code(events: &mut EventReceiver) -> ErrorCode {
        let drained = events.drain();
        assert_eq!(drained.len(), 1, "expected exactly one event: {drained:?}");
        match &drained[0] {
            OutboundEvent::PurchaseError(err) => err.code,
            other => panic!("expected purchase-error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_consumable_success_is_finished_and_reported() {
        let (store, orchestrator, mut events) = setup(UnmatchedPolicy::LeaveUnfinished);

        let outcome = orchestrator
            .execute(product("A", ProductKind::NonConsumable), PurchaseRequest::new("A"))
            .await;

        let tx = match outcome {
            PurchaseOutcome::Success(tx) => tx,
            other => panic!("expected success, got {other:?}"),
        };
        assert_eq!(store.finish_calls(tx.id), 1);
        let drained = events.drain();
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            OutboundEvent::PurchaseUpdated(update) => {
                assert_eq!(update.product_id, "A");
                assert_eq!(update.transaction_id, tx.id.to_string());
                assert_eq!(update.state, "purchased");
            }
            other => panic!("expected purchase-updated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_consumable_success() {
        let (store, orchestrator, mut events) = setup(UnmatchedPolicy::LeaveUnfinished);
        let outcome = orchestrator
            .execute(product("coins", ProductKind::Consumable), PurchaseRequest::new("coins").with_quantity(3))
            .await;

        match outcome {
            PurchaseOutcome::Success(tx) => {
                assert_eq!(tx.quantity, 3);
                assert_eq!(store.finish_calls(tx.id), 1);
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert!(matches!(events.drain()[..], [OutboundEvent::PurchaseUpdated(_)]));
    }

    #[tokio::test]
    async fn test_consumable_mismatch_is_finished_but_reported() {
        let (store, orchestrator, mut events) = setup(UnmatchedPolicy::LeaveUnfinished);
        store.respond("coins", ScriptedResponse::Mismatch("gems".into()));

        let outcome = orchestrator
            .execute(product("coins", ProductKind::Consumable), PurchaseRequest::new("coins"))
            .await;

        match outcome {
            PurchaseOutcome::ProductMismatch { transaction, finished } => {
                assert!(finished);
                assert_eq!(transaction.product_id, "gems");
                assert!(!store.is_unfinished(transaction.id));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        assert_eq!(single_error_code(&mut events), ErrorCode::ProductIdMismatch);
    }

    #[tokio::test]
    async fn test_non_consumable_missing_from_entitlements_is_left_unfinished() {
        let (store, orchestrator, mut events) = setup(UnmatchedPolicy::LeaveUnfinished);
        store.respond("A", ScriptedResponse::Mismatch("B".into()));

        let outcome = orchestrator
            .execute(product("A", ProductKind::NonConsumable), PurchaseRequest::new("A"))
            .await;

        match outcome {
            PurchaseOutcome::ProductMismatch { transaction, finished } => {
                assert!(!finished);
                assert_eq!(transaction.product_id, "B");
                assert!(store.is_unfinished(transaction.id));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        assert_eq!(single_error_code(&mut events), ErrorCode::ProductIdMismatch);
    }

    #[tokio::test]
    async fn test_consumable_delivered_for_non_consumable_is_finished() {
        let (store, orchestrator, mut events) = setup(UnmatchedPolicy::LeaveUnfinished);
        store.respond("A", ScriptedResponse::Mismatch("coins".into()));

        let outcome = orchestrator
            .execute(product("A", ProductKind::NonConsumable), PurchaseRequest::new("A"))
            .await;

        match outcome {
            PurchaseOutcome::ProductMismatch { transaction, finished } => {
                assert!(finished);
                assert_eq!(transaction.product_kind, ProductKind::Consumable);
                assert_eq!(store.finish_calls(transaction.id), 1);
                assert!(!store.is_unfinished(transaction.id));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        assert_eq!(single_error_code(&mut events), ErrorCode::ProductIdMismatch);
    }

    #[tokio::test]
    async fn test_empty_entitlements_report_transaction_not_found() {
        let (store, orchestrator, mut events) = setup(UnmatchedPolicy::FinishAndReport);
        store.respond("A", ScriptedResponse::Unlisted);

        let outcome = orchestrator
            .execute(product("A", ProductKind::NonConsumable), PurchaseRequest::new("A"))
            .await;

        match outcome {
            PurchaseOutcome::TransactionNotFound { transaction, finished } => {
                assert!(finished);
                assert_eq!(store.finish_calls(transaction.id), 1);
            }
            other => panic!("expected not found, got {other:?}"),
        }
        assert_eq!(single_error_code(&mut events), ErrorCode::TransactionNotFound);
    }

    #[tokio::test]
    async fn test_unverified_purchase_is_not_finished() {
        let (store, orchestrator, mut events) = setup(UnmatchedPolicy::FinishAndReport);
        store.respond("A", ScriptedResponse::Unverified("jailbroken".into()));

        let outcome = orchestrator
            .execute(product("A", ProductKind::NonConsumable), PurchaseRequest::new("A"))
            .await;

        assert_eq!(
            outcome,
            PurchaseOutcome::Unverified {
                reason: "jailbroken".into()
            }
        );
        assert_eq!(store.finish_calls(1), 0);
        assert!(store.is_unfinished(1));
        assert_eq!(single_error_code(&mut events), ErrorCode::UnverifiedPurchase);
    }

    #[tokio::test]
    async fn test_business_states_map_to_error_codes() {
        let (store, orchestrator, mut events) = setup(UnmatchedPolicy::LeaveUnfinished);
        let cases = [
            (ScriptedResponse::Pending, PurchaseOutcome::Pending, ErrorCode::PurchasePending),
            (
                ScriptedResponse::UserCancelled,
                PurchaseOutcome::UserCancelled,
                ErrorCode::UserCancelled,
            ),
            (
                ScriptedResponse::Unknown,
                PurchaseOutcome::Unknown { message: None },
                ErrorCode::Unknown,
            ),
        ];

        for (response, expected, code) in cases {
            store.respond("B", response);
            let outcome = orchestrator
                .execute(product("B", ProductKind::NonConsumable), PurchaseRequest::new("B"))
                .await;
            assert_eq!(outcome, expected);
            assert_eq!(single_error_code(&mut events), code);
        }
    }

    #[tokio::test]
    async fn test_storefront_exception_keeps_message() {
        let (store, orchestrator, mut events) = setup(UnmatchedPolicy::LeaveUnfinished);
        store.respond("A", ScriptedResponse::Fail("payment sheet crashed".into()));

        let outcome = orchestrator
            .execute(product("A", ProductKind::NonConsumable), PurchaseRequest::new("A"))
            .await;

        match outcome {
            PurchaseOutcome::Unknown { message: Some(message) } => {
                assert!(message.contains("payment sheet crashed"))
            }
            other => panic!("expected unknown with message, got {other:?}"),
        }
        let drained = events.drain();
        match &drained[..] {
            [OutboundEvent::PurchaseError(err)] => {
                assert_eq!(err.code, ErrorCode::Unknown);
                assert_eq!(err.response_code, 500);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }
}
