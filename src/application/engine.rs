use super::emitter::{self, EventReceiver};
use super::finisher::{FinishStatus, Finisher};
use super::listener::TransactionUpdateListener;
use super::promoted::{PromotedIntentHandler, PromotedSlot};
use super::purchase::{PurchaseOrchestrator, PurchaseTicket};
use super::reconciler::EntitlementReconciler;
use super::restore::{RestoreCoordinator, RestoreOutcome};
use crate::config::EngineConfig;
use crate::domain::ports::{CatalogStoreBox, FinishLedgerHandle, StorefrontHandle};
use crate::domain::product::{IntroductoryOffer, Product};
use crate::domain::purchase::PurchaseRequest;
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{Result, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Answer to a host `finish` call.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum FinishAck {
    Acknowledged,
    NotFound,
}

/// A purchase started from the staged promoted intent.
pub struct PromotedPurchase {
    pub product_id: String,
    pub ticket: PurchaseTicket,
}

/// How many items each background loop has handled since start.
#[derive(Clone)]
pub struct EngineProgress {
    updates: watch::Receiver<u64>,
    intents: watch::Receiver<u64>,
}

impl EngineProgress {
    pub fn updates_handled(&self) -> u64 {
        *self.updates.borrow()
    }

    pub fn intents_handled(&self) -> u64 {
        *self.intents.borrow()
    }

    /// Resolves once the update listener has handled at least `count` items.
    pub async fn wait_for_updates(&mut self, count: u64) -> Result<()> {
        self.updates.wait_for(|handled| *handled >= count).await?;
        Ok(())
    }

    pub async fn wait_for_intents(&mut self, count: u64) -> Result<()> {
        self.intents.wait_for(|handled| *handled >= count).await?;
        Ok(())
    }
}

/// The purchase lifecycle service.
///
/// `StoreEngine` owns the catalog snapshot and the staged promoted intent, and
/// runs the two storefront subscriptions for as long as it lives. Every host
/// operation is a method on it; terminal purchase outcomes arrive on the
/// [`EventReceiver`] returned by [`StoreEngine::start`].
pub struct StoreEngine {
    storefront: StorefrontHandle,
    catalog: CatalogStoreBox,
    reconciler: EntitlementReconciler,
    finisher: Finisher,
    orchestrator: Arc<PurchaseOrchestrator>,
    restorer: RestoreCoordinator,
    promoted: Arc<PromotedSlot>,
    config: EngineConfig,
    progress: EngineProgress,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl StoreEngine {
    /// Builds the engine and subscribes to the storefront's update and intent
    /// streams. Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `storefront` - The storefront oracle.
    /// * `catalog` - Holds the last loaded catalog snapshot.
    /// * `ledger` - Records finished transactions.
    /// * `config` - Engine policies.
    pub fn start(
        storefront: StorefrontHandle,
        catalog: CatalogStoreBox,
        ledger: FinishLedgerHandle,
        config: EngineConfig,
    ) -> (Self, EventReceiver) {
        let (emitter, events) = emitter::channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (updates_tx, updates) = watch::channel(0);
        let (intents_tx, intents) = watch::channel(0);

        let reconciler = EntitlementReconciler::new(storefront.clone());
        let finisher = Finisher::new(storefront.clone(), ledger);
        let promoted = Arc::new(PromotedSlot::new());

        let listener = TransactionUpdateListener::new(finisher.clone(), updates_tx);
        let handler = PromotedIntentHandler::new(promoted.clone(), emitter.clone(), intents_tx);
        let tasks = vec![
            tokio::spawn(listener.run(storefront.transaction_updates(), shutdown_rx.clone())),
            tokio::spawn(handler.run(storefront.purchase_intents(), shutdown_rx)),
        ];

        let orchestrator = Arc::new(PurchaseOrchestrator::new(
            storefront.clone(),
            reconciler.clone(),
            finisher.clone(),
            emitter,
            config.unmatched_purchases,
        ));

        info!(?config, "Store engine started");
        let engine = Self {
            storefront,
            catalog,
            restorer: RestoreCoordinator::new(reconciler.clone()),
            reconciler,
            finisher,
            orchestrator,
            promoted,
            config,
            progress: EngineProgress { updates, intents },
            shutdown,
            tasks,
        };
        (engine, events)
    }

    pub fn progress(&self) -> EngineProgress {
        self.progress.clone()
    }

    /// Fetches `product_ids` from the storefront and replaces the catalog
    /// snapshot with whatever came back.
    ///
    /// Fails with [`StoreError::InvalidProductIds`] when nothing resolved and
    /// with [`StoreError::ProductsNotLoaded`] when only some ids did; the
    /// resolved products are cached in both cases.
    pub async fn load_catalog(&self, product_ids: &[String]) -> Result<Vec<Product>> {
        let products = self.storefront.products(product_ids).await?;
        self.catalog.replace(products.clone()).await?;

        if products.is_empty() {
            return Err(StoreError::InvalidProductIds);
        }
        let missing: Vec<String> = product_ids
            .iter()
            .filter(|id| !products.iter().any(|p| &p.id == *id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::ProductsNotLoaded(missing));
        }

        debug!(products = products.len(), "Catalog loaded");
        Ok(products)
    }

    pub async fn products(&self) -> Result<Vec<Product>> {
        self.catalog.all().await
    }

    /// Starts a purchase and returns as soon as it is handed to a background
    /// task. The outcome is emitted on the event channel.
    ///
    /// Unknown products, malformed requests and disabled payments are rejected
    /// here, before the storefront is involved.
    pub async fn purchase(&self, request: PurchaseRequest) -> Result<PurchaseTicket> {
        let product = self
            .catalog
            .get(&request.product_id)
            .await?
            .ok_or_else(|| {
                StoreError::DeveloperError(format!(
                    "product '{}' is not in the loaded catalog",
                    request.product_id
                ))
            })?;
        self.check_purchase(&product, &request).await?;
        Ok(self.spawn_purchase(product, request))
    }

    async fn check_purchase(&self, product: &Product, request: &PurchaseRequest) -> Result<()> {
        request.validate_for(product)?;
        if self.config.require_payments_enabled && !self.storefront.can_make_payments().await {
            return Err(StoreError::DeveloperError(
                "payments are disabled on this device".to_string(),
            ));
        }
        Ok(())
    }

    fn spawn_purchase(&self, product: Product, request: PurchaseRequest) -> PurchaseTicket {
        let orchestrator = self.orchestrator.clone();
        let handle = tokio::spawn(async move { orchestrator.execute(product, request).await });
        PurchaseTicket::new(handle)
    }

    pub async fn restore(&self) -> RestoreOutcome {
        self.restorer.restore().await
    }

    pub async fn list_unfinished_transactions(&self) -> Result<Vec<Transaction>> {
        self.reconciler.unfinished_transactions().await
    }

    pub async fn list_active_entitlements(&self) -> Result<Vec<Transaction>> {
        Ok(self
            .reconciler
            .current_entitlements()
            .await?
            .into_transactions())
    }

    /// Finishes a transaction on the host's behalf.
    ///
    /// Only verified transactions still unfinished at the storefront are
    /// finished. Repeating the call for one already finished here is
    /// acknowledged without reaching the storefront again.
    pub async fn finish(&self, transaction_id: TransactionId) -> Result<FinishAck> {
        if self.finisher.is_finished(transaction_id).await? {
            return Ok(FinishAck::Acknowledged);
        }

        let unfinished = self.reconciler.unfinished_transactions().await?;
        if !unfinished.iter().any(|tx| tx.id == transaction_id) {
            return Ok(FinishAck::NotFound);
        }
        self.finisher.finish(transaction_id).await?;
        Ok(FinishAck::Acknowledged)
    }

    pub async fn sync_now(&self) -> bool {
        match self.reconciler.sync().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Sync failed");
                false
            }
        }
    }

    /// Takes the staged promoted intent and purchases its product.
    ///
    /// The intent stays staged when the purchase is rejected up front, so the
    /// host can retry once the cause is fixed.
    pub async fn consume_promoted_product(&self) -> Result<PromotedPurchase> {
        let no_intent = || StoreError::DeveloperError("no promoted product is waiting".to_string());
        let staged = self.promoted.peek().await.ok_or_else(no_intent)?;
        let request = PurchaseRequest::new(staged.product.id.clone());
        self.check_purchase(&staged.product, &request).await?;

        let intent = self.promoted.take_staged(&staged.id).await.ok_or_else(no_intent)?;
        info!(intent_id = %intent.id, product_id = %intent.product.id, "Consuming promoted product");
        let product_id = intent.product.id.clone();
        let ticket = self.spawn_purchase(intent.product, request);
        Ok(PromotedPurchase { product_id, ticket })
    }

    /// Finishes every verified transaction the storefront still lists as
    /// unfinished. Returns how many were finished by this call.
    pub async fn clear_all_unfinished(&self) -> Result<usize> {
        let mut cleared = 0;
        for tx in self.reconciler.unfinished_transactions().await? {
            if self.finisher.finish(tx.id).await? == FinishStatus::Finished {
                cleared += 1;
            }
        }
        info!(cleared, "Unfinished transactions cleared");
        Ok(cleared)
    }

    pub async fn can_make_payments(&self) -> bool {
        self.storefront.can_make_payments().await
    }

    /// The product's introductory offer, if the user may still redeem it.
    pub async fn introductory_offer(&self, product_id: &str) -> Result<Option<IntroductoryOffer>> {
        let product = self.catalog.get(product_id).await?.ok_or_else(|| {
            StoreError::DeveloperError(format!("product '{product_id}' is not in the loaded catalog"))
        })?;
        let Some(offer) = product.introductory_offer.clone() else {
            return Ok(None);
        };
        if self.storefront.is_eligible_for_intro_offer(&product).await? {
            Ok(Some(offer))
        } else {
            Ok(None)
        }
    }

    /// Stops both subscriptions and waits for them. An item already being
    /// handled finishes first.
    pub async fn shutdown(self) -> Result<()> {
        // Receivers may already be gone if a loop ended on a closed stream.
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            task.await?;
        }
        info!("Store engine stopped");
        Ok(())
    }
}
