//! An in-process storefront whose behaviour is scripted by the caller.
//!
//! Backs the scenario binary and the test suites. Purchases succeed by default;
//! `respond` queues a different answer for the next purchase of a product.

use crate::domain::intent::PurchaseIntent;
use crate::domain::ports::{PurchaseIntents, Storefront, TransactionUpdates};
use crate::domain::product::{Product, ProductKind};
use crate::domain::purchase::{OfferSignature, StorefrontPurchaseResult};
use crate::domain::transaction::{OfferType, Transaction, TransactionId, TransactionOffer};
use crate::domain::verification::{SignatureStatus, SignedTransaction};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

const SUBSCRIPTION_LENGTH_DAYS: i64 = 30;

/// Answer the storefront gives to the next purchase of a product.
#[derive(Debug, PartialEq, Clone)]
pub enum ScriptedResponse {
    Success,
    Pending,
    UserCancelled,
    Unknown,
    /// Payment succeeds but the signature check fails.
    Unverified(String),
    /// The purchase call itself throws.
    Fail(String),
    /// Payment succeeds but the delivered transaction is for another product.
    Mismatch(String),
    /// Payment succeeds but the entitlement feed does not list the
    /// transaction yet.
    Unlisted,
}

impl FromStr for ScriptedResponse {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (head, arg) = match s.split_once(':') {
            Some((head, arg)) => (head, Some(arg.to_string())),
            None => (s, None),
        };
        match (head, arg) {
            ("success", None) => Ok(ScriptedResponse::Success),
            ("pending", None) => Ok(ScriptedResponse::Pending),
            ("cancelled", None) => Ok(ScriptedResponse::UserCancelled),
            ("unknown", None) => Ok(ScriptedResponse::Unknown),
            ("unlisted", None) => Ok(ScriptedResponse::Unlisted),
            ("unverified", reason) => Ok(ScriptedResponse::Unverified(
                reason.unwrap_or_else(|| "signature check failed".to_string()),
            )),
            ("fail", reason) => Ok(ScriptedResponse::Fail(
                reason.unwrap_or_else(|| "storefront unavailable".to_string()),
            )),
            ("mismatch", Some(product_id)) => Ok(ScriptedResponse::Mismatch(product_id)),
            _ => Err(StoreError::DeveloperError(format!(
                "unknown scripted response '{s}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    transaction: Transaction,
    signature: SignatureStatus,
}

impl Record {
    fn signed(&self) -> SignedTransaction {
        match &self.signature {
            SignatureStatus::Valid => SignedTransaction::valid(self.transaction.clone()),
            SignatureStatus::Invalid(reason) => {
                SignedTransaction::invalid(self.transaction.clone(), reason.clone())
            }
        }
    }
}

#[derive(Default)]
struct State {
    catalog: HashMap<String, Product>,
    history: Vec<Record>,
    unfinished: BTreeSet<TransactionId>,
    finish_calls: HashMap<TransactionId, u32>,
    purchase_calls: HashMap<String, u32>,
    unlisted: HashSet<TransactionId>,
    responses: HashMap<String, VecDeque<ScriptedResponse>>,
    last_id: TransactionId,
    last_intent: u64,
    offline: bool,
    payments_disabled: bool,
    intro_ineligible: HashSet<String>,
    update_subscribers: Vec<mpsc::UnboundedSender<SignedTransaction>>,
    intent_subscribers: Vec<mpsc::UnboundedSender<PurchaseIntent>>,
}

impl State {
    fn allocate_id(&mut self, requested: Option<TransactionId>) -> Result<TransactionId> {
        let id = match requested {
            Some(id) => {
                if self.history.iter().any(|r| r.transaction.id == id) {
                    return Err(StoreError::DeveloperError(format!(
                        "transaction {id} already exists"
                    )));
                }
                id
            }
            None => self.last_id + 1,
        };
        self.last_id = self.last_id.max(id);
        Ok(id)
    }

    fn product_kind(&self, product_id: &str) -> Result<ProductKind> {
        self.catalog
            .get(product_id)
            .map(|p| p.kind)
            .ok_or_else(|| StoreError::DeveloperError(format!("product '{product_id}' is not stocked")))
    }

    fn new_transaction(id: TransactionId, product_id: &str, kind: ProductKind) -> Transaction {
        let now = Utc::now();
        let mut transaction = Transaction::new(id, product_id, kind, now);
        if kind == ProductKind::Subscription {
            transaction.expiration_date = Some(now + Duration::days(SUBSCRIPTION_LENGTH_DAYS));
        }
        transaction
    }

    fn record(&mut self, transaction: Transaction, signature: SignatureStatus) -> Record {
        let record = Record {
            transaction,
            signature,
        };
        self.unfinished.insert(record.transaction.id);
        self.history.push(record.clone());
        record
    }

    fn find_mut(&mut self, id: TransactionId) -> Result<&mut Record> {
        self.history
            .iter_mut()
            .find(|r| r.transaction.id == id)
            .ok_or_else(|| StoreError::DeveloperError(format!("unknown transaction {id}")))
    }

    fn broadcast_update(&mut self, signed: SignedTransaction) {
        self.update_subscribers
            .retain(|subscriber| subscriber.send(signed.clone()).is_ok());
    }
}

/// A scriptable in-process storefront.
///
/// `Clone` shares the underlying state, so a test can keep a handle while the
/// engine owns another.
#[derive(Default, Clone)]
pub struct SimulatedStorefront {
    state: Arc<Mutex<State>>,
}

impl SimulatedStorefront {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes a product available for catalog loads and purchases.
    pub fn stock(&self, product: Product) {
        self.state().catalog.insert(product.id.clone(), product);
    }

    /// Queues the answer for the next purchase of `product_id`.
    pub fn respond(&self, product_id: &str, response: ScriptedResponse) {
        self.state()
            .responses
            .entry(product_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// Creates a transaction outside any local purchase call (a resolved
    /// pending purchase, a family-sharing grant, a renewal) and pushes it on
    /// the update stream.
    pub fn deliver(&self, product_id: &str, id: Option<TransactionId>) -> Result<Transaction> {
        self.deliver_with(product_id, id, SignatureStatus::Valid)
    }

    pub fn deliver_unverified(&self, product_id: &str, reason: &str) -> Result<Transaction> {
        self.deliver_with(product_id, None, SignatureStatus::Invalid(reason.to_string()))
    }

    fn deliver_with(
        &self,
        product_id: &str,
        id: Option<TransactionId>,
        signature: SignatureStatus,
    ) -> Result<Transaction> {
        let mut state = self.state();
        let kind = state.product_kind(product_id)?;
        let id = state.allocate_id(id)?;
        let record = state.record(State::new_transaction(id, product_id, kind), signature);
        debug!(transaction_id = id, product_id, "Simulated storefront delivered transaction");
        state.broadcast_update(record.signed());
        Ok(record.transaction)
    }

    /// Refunds a transaction and pushes the revoked record on the update stream.
    pub fn revoke(&self, id: TransactionId) -> Result<Transaction> {
        let mut state = self.state();
        let record = state.find_mut(id)?;
        record.transaction.revocation_date = Some(Utc::now());
        let record = record.clone();
        state.broadcast_update(record.signed());
        Ok(record.transaction)
    }

    /// Moves a transaction's expiration date into the past.
    pub fn expire(&self, id: TransactionId) -> Result<()> {
        let mut state = self.state();
        let record = state.find_mut(id)?;
        record.transaction.expiration_date = Some(Utc::now() - Duration::seconds(1));
        Ok(())
    }

    /// Pushes a storefront-initiated purchase intent; returns its id.
    pub fn promote(&self, product_id: &str) -> Result<String> {
        let mut state = self.state();
        let product = state
            .catalog
            .get(product_id)
            .cloned()
            .ok_or_else(|| StoreError::DeveloperError(format!("product '{product_id}' is not stocked")))?;
        state.last_intent += 1;
        let intent = PurchaseIntent {
            id: format!("intent-{}", state.last_intent),
            product,
        };
        let id = intent.id.clone();
        state
            .intent_subscribers
            .retain(|subscriber| subscriber.send(intent.clone()).is_ok());
        Ok(id)
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn set_payments_enabled(&self, enabled: bool) {
        self.state().payments_disabled = !enabled;
    }

    pub fn set_intro_eligible(&self, product_id: &str, eligible: bool) {
        let mut state = self.state();
        if eligible {
            state.intro_ineligible.remove(product_id);
        } else {
            state.intro_ineligible.insert(product_id.to_string());
        }
    }

    /// Number of finish calls received for `id`, no-ops included.
    pub fn finish_calls(&self, id: TransactionId) -> u32 {
        self.state().finish_calls.get(&id).copied().unwrap_or(0)
    }

    /// Number of purchase calls received for `product_id`, failed ones included.
    pub fn purchase_calls(&self, product_id: &str) -> u32 {
        self.state().purchase_calls.get(product_id).copied().unwrap_or(0)
    }

    pub fn is_unfinished(&self, id: TransactionId) -> bool {
        self.state().unfinished.contains(&id)
    }

    fn ensure_online(state: &State) -> Result<()> {
        if state.offline {
            Err(StoreError::Storefront("network unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Storefront for SimulatedStorefront {
    async fn products(&self, product_ids: &[String]) -> Result<Vec<Product>> {
        let state = self.state();
        Self::ensure_online(&state)?;
        Ok(product_ids
            .iter()
            .filter_map(|id| state.catalog.get(id).cloned())
            .collect())
    }

    async fn purchase(
        &self,
        product: &Product,
        quantity: u32,
        offer: Option<&OfferSignature>,
    ) -> Result<StorefrontPurchaseResult> {
        let mut state = self.state();
        *state.purchase_calls.entry(product.id.clone()).or_default() += 1;
        Self::ensure_online(&state)?;
        if !state.catalog.contains_key(&product.id) {
            return Err(StoreError::Storefront(format!(
                "product '{}' is not available in this storefront",
                product.id
            )));
        }

        let response = state
            .responses
            .get_mut(&product.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedResponse::Success);

        let listed = response != ScriptedResponse::Unlisted;
        let (delivered_id, signature) = match response {
            ScriptedResponse::Success | ScriptedResponse::Unlisted => {
                (product.id.clone(), SignatureStatus::Valid)
            }
            ScriptedResponse::Mismatch(other) => (other, SignatureStatus::Valid),
            ScriptedResponse::Unverified(reason) => {
                (product.id.clone(), SignatureStatus::Invalid(reason))
            }
            ScriptedResponse::Pending => return Ok(StorefrontPurchaseResult::Pending),
            ScriptedResponse::UserCancelled => return Ok(StorefrontPurchaseResult::UserCancelled),
            ScriptedResponse::Unknown => return Ok(StorefrontPurchaseResult::Unknown),
            ScriptedResponse::Fail(message) => return Err(StoreError::Storefront(message)),
        };

        let kind = state.product_kind(&delivered_id).unwrap_or(product.kind);
        let id = state.allocate_id(None)?;
        let mut transaction = State::new_transaction(id, &delivered_id, kind);
        transaction.quantity = quantity;
        if let Some(offer) = offer {
            transaction.offer = Some(TransactionOffer {
                offer_type: OfferType::Promotional,
                payment_mode: product
                    .promotional_offer(&offer.offer_id)
                    .map(|promo| promo.payment_mode),
            });
        }
        if !listed {
            state.unlisted.insert(id);
        }
        let record = state.record(transaction, signature);
        Ok(StorefrontPurchaseResult::Success(record.signed()))
    }

    async fn current_entitlements(&self) -> Result<Vec<SignedTransaction>> {
        let state = self.state();
        Self::ensure_online(&state)?;
        let now = Utc::now();
        Ok(state
            .history
            .iter()
            .filter(|r| r.transaction.product_kind.is_entitlement_tracked())
            .filter(|r| !state.unlisted.contains(&r.transaction.id))
            .filter(|r| r.transaction.expiration_date.is_none_or(|expires| expires > now))
            .map(Record::signed)
            .collect())
    }

    async fn all_transactions(&self) -> Result<Vec<SignedTransaction>> {
        let state = self.state();
        Self::ensure_online(&state)?;
        Ok(state.history.iter().map(Record::signed).collect())
    }

    async fn unfinished_transactions(&self) -> Result<Vec<SignedTransaction>> {
        let state = self.state();
        Self::ensure_online(&state)?;
        Ok(state
            .history
            .iter()
            .filter(|r| state.unfinished.contains(&r.transaction.id))
            .map(Record::signed)
            .collect())
    }

    async fn finish(&self, transaction_id: TransactionId) -> Result<()> {
        let mut state = self.state();
        Self::ensure_online(&state)?;
        if !state.history.iter().any(|r| r.transaction.id == transaction_id) {
            return Err(StoreError::Storefront(format!(
                "unknown transaction {transaction_id}"
            )));
        }
        *state.finish_calls.entry(transaction_id).or_default() += 1;
        state.unfinished.remove(&transaction_id);
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        let state = self.state();
        Self::ensure_online(&state)
    }

    async fn can_make_payments(&self) -> bool {
        !self.state().payments_disabled
    }

    async fn is_eligible_for_intro_offer(&self, product: &Product) -> Result<bool> {
        let state = self.state();
        Self::ensure_online(&state)?;
        let purchased_before = state
            .history
            .iter()
            .any(|r| r.transaction.product_id == product.id);
        Ok(product.introductory_offer.is_some()
            && !purchased_before
            && !state.intro_ineligible.contains(&product.id))
    }

    fn transaction_updates(&self) -> TransactionUpdates {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state().update_subscribers.push(sender);
        receiver
    }

    fn purchase_intents(&self) -> PurchaseIntents {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state().intent_subscribers.push(sender);
        receiver
    }
}
