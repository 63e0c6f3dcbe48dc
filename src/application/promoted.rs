use super::emitter::EventEmitter;
use crate::domain::events::OutboundEvent;
use crate::domain::intent::PurchaseIntent;
use crate::domain::ports::PurchaseIntents;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

/// Single-slot mailbox for the storefront-initiated purchase waiting on the
/// host. Last write wins; each staged intent is taken at most once.
#[derive(Default)]
pub struct PromotedSlot {
    staged: Mutex<Option<PurchaseIntent>>,
}

impl PromotedSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `intent`, returning the unconsumed intent it replaced.
    pub async fn stage(&self, intent: PurchaseIntent) -> Option<PurchaseIntent> {
        self.staged.lock().await.replace(intent)
    }

    /// Takes the staged intent only if it is still `intent_id`; a newer intent
    /// staged in the meantime is left in place.
    pub async fn take_staged(&self, intent_id: &str) -> Option<PurchaseIntent> {
        let mut staged = self.staged.lock().await;
        if staged.as_ref().is_some_and(|intent| intent.id == intent_id) {
            staged.take()
        } else {
            None
        }
    }

    pub async fn peek(&self) -> Option<PurchaseIntent> {
        self.staged.lock().await.clone()
    }
}

/// Stages storefront-initiated purchase intents and tells the host about them.
pub struct PromotedIntentHandler {
    slot: Arc<PromotedSlot>,
    emitter: EventEmitter,
    handled: watch::Sender<u64>,
}

impl PromotedIntentHandler {
    pub fn new(
        slot: Arc<PromotedSlot>,
        emitter: EventEmitter,
        handled: watch::Sender<u64>,
    ) -> Self {
        Self {
            slot,
            emitter,
            handled,
        }
    }

    pub async fn run(self, mut intents: PurchaseIntents, mut shutdown: watch::Receiver<bool>) {
        info!("Promoted intent handler started");
        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Promoted intent handler shutting down");
                    break;
                }
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        let event = OutboundEvent::PromotedProduct {
                            intent_id: intent.id.clone(),
                            product_id: intent.product.id.clone(),
                        };
                        if let Some(replaced) = self.slot.stage(intent).await {
                            debug!(intent_id = %replaced.id, "Unconsumed promoted intent replaced");
                        }
                        self.emitter.emit(event);
                        self.handled.send_modify(|count| *count += 1);
                    }
                    None => {
                        info!("Promoted intent stream closed");
                        break;
                    }
                }
            }
        }
    }
}
