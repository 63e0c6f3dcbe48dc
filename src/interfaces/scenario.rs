//! Drives a [`StoreEngine`] over a [`SimulatedStorefront`] from script steps.
//!
//! Each step waits for the work it triggered to settle (purchase outcomes,
//! listener and intent handling) before the emitted events are written, so a
//! script always produces the same lines in the same order.

use super::csv::script_reader::{ScriptOp, ScriptStep};
use super::jsonl::event_writer::{EventWriter, Report};
use crate::application::emitter::EventReceiver;
use crate::application::engine::{EngineProgress, StoreEngine};
use crate::config::EngineConfig;
use crate::domain::product::{Product, ProductKind};
use crate::domain::purchase::PurchaseRequest;
use crate::error::{Result, StoreError};
use crate::infrastructure::in_memory::{InMemoryCatalogStore, InMemoryFinishLedger};
use crate::infrastructure::simulated::{ScriptedResponse, SimulatedStorefront};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_PRICE: Decimal = dec!(0.99);
const CURRENCY: &str = "USD";

pub struct ScenarioRunner<W: Write> {
    store: SimulatedStorefront,
    engine: StoreEngine,
    events: EventReceiver,
    progress: EngineProgress,
    writer: EventWriter<W>,
}

impl<W: Write> ScenarioRunner<W> {
    /// Must be called from within a Tokio runtime.
    pub fn new(config: EngineConfig, writer: W) -> Self {
        let store = SimulatedStorefront::new();
        let (engine, events) = StoreEngine::start(
            Arc::new(store.clone()),
            Box::new(InMemoryCatalogStore::new()),
            Arc::new(InMemoryFinishLedger::new()),
            config,
        );
        let progress = engine.progress();
        Self {
            store,
            engine,
            events,
            progress,
            writer: EventWriter::new(writer),
        }
    }

    /// Runs one step. An `Err` means the step itself was malformed and nothing
    /// was done; operations the engine rejects are written as reports instead.
    pub async fn step(&mut self, step: &ScriptStep) -> Result<()> {
        debug!(op = ?step.op, "Running script step");
        match step.op {
            ScriptOp::Stock => {
                let product = parse_stock(step.require_product()?, step.value.as_deref())?;
                self.store.stock(product);
            }
            ScriptOp::Load => {
                let ids = parse_ids(step)?;
                match self.engine.load_catalog(&ids).await {
                    Ok(products) => self.write_report(&Report::Catalog {
                        product_ids: products.into_iter().map(|p| p.id).collect(),
                    })?,
                    Err(err) => self.reject("load", &err)?,
                }
            }
            ScriptOp::Respond => {
                let product_id = step.require_product()?;
                let response = ScriptedResponse::from_str(step.value.as_deref().unwrap_or("success"))?;
                self.store.respond(product_id, response);
            }
            ScriptOp::Purchase => {
                let mut request = PurchaseRequest::new(step.require_product()?);
                if let Some(quantity) = step.value.as_deref() {
                    request = request.with_quantity(parse_quantity(quantity)?);
                }
                match self.engine.purchase(request).await {
                    Ok(ticket) => {
                        ticket.outcome().await?;
                    }
                    Err(err) => self.reject("purchase", &err)?,
                }
            }
            ScriptOp::Deliver => {
                let product_id = step.require_product()?;
                let before = self.progress.updates_handled();
                self.store.deliver(product_id, step.transaction)?;
                self.progress.wait_for_updates(before + 1).await?;
            }
            ScriptOp::Revoke => {
                let before = self.progress.updates_handled();
                self.store.revoke(step.require_transaction()?)?;
                self.progress.wait_for_updates(before + 1).await?;
            }
            ScriptOp::Expire => self.store.expire(step.require_transaction()?)?,
            ScriptOp::Promote => {
                let before = self.progress.intents_handled();
                self.store.promote(step.require_product()?)?;
                self.progress.wait_for_intents(before + 1).await?;
            }
            ScriptOp::BuyPromoted => match self.engine.consume_promoted_product().await {
                Ok(promoted) => {
                    promoted.ticket.outcome().await?;
                }
                Err(err) => self.reject("buy-promoted", &err)?,
            },
            ScriptOp::Restore => {
                let outcome = self.engine.restore().await;
                self.write_report(&Report::Restore { outcome })?;
            }
            ScriptOp::Sync => {
                let ok = self.engine.sync_now().await;
                self.write_report(&Report::Sync { ok })?;
            }
            ScriptOp::Outage => self.store.set_offline(parse_switch(step.value.as_deref())?),
            ScriptOp::Finish => {
                let transaction_id = step.require_transaction()?;
                match self.engine.finish(transaction_id).await {
                    Ok(ack) => self.write_report(&Report::Finish { transaction_id, ack })?,
                    Err(err) => self.reject("finish", &err)?,
                }
            }
            ScriptOp::Unfinished => match self.engine.list_unfinished_transactions().await {
                Ok(transactions) => self.write_report(&Report::Unfinished {
                    transaction_ids: transactions.into_iter().map(|tx| tx.id).collect(),
                })?,
                Err(err) => self.reject("unfinished", &err)?,
            },
            ScriptOp::Entitlements => match self.engine.list_active_entitlements().await {
                Ok(transactions) => self.write_report(&Report::Entitlements {
                    product_ids: transactions.into_iter().map(|tx| tx.product_id).collect(),
                })?,
                Err(err) => self.reject("entitlements", &err)?,
            },
            ScriptOp::ClearUnfinished => match self.engine.clear_all_unfinished().await {
                Ok(count) => self.write_report(&Report::Cleared { count })?,
                Err(err) => self.reject("clear-unfinished", &err)?,
            },
            ScriptOp::CanPay => {
                if let Some(value) = step.value.as_deref() {
                    self.store.set_payments_enabled(parse_switch(Some(value))?);
                }
                let enabled = self.engine.can_make_payments().await;
                self.write_report(&Report::CanPay { enabled })?;
            }
        }

        let events = self.events.drain();
        self.writer.write_events(events)
    }

    /// Stops the engine and writes any event still queued.
    pub async fn finish(mut self) -> Result<W> {
        self.engine.shutdown().await?;
        let events = self.events.drain();
        self.writer.write_events(events)?;
        self.writer.into_inner()
    }

    fn write_report(&mut self, report: &Report) -> Result<()> {
        self.writer.write_report(report)
    }

    fn reject(&mut self, op: &str, err: &StoreError) -> Result<()> {
        self.writer.write_report(&Report::Rejected {
            op: op.to_string(),
            error: err.to_error_event(),
        })
    }
}

/// `kind[:price]`, e.g. `subscription:9.99`.
fn parse_stock(product_id: &str, value: Option<&str>) -> Result<Product> {
    let value = value.ok_or_else(|| {
        StoreError::DeveloperError(format!("stock step for '{product_id}' needs a product kind"))
    })?;
    let (kind, price) = match value.split_once(':') {
        Some((kind, price)) => {
            let price = Decimal::from_str(price).map_err(|err| {
                StoreError::DeveloperError(format!("invalid price '{price}': {err}"))
            })?;
            (kind, price)
        }
        None => (value, DEFAULT_PRICE),
    };
    Ok(Product::new(product_id, ProductKind::from_str(kind)?, price, CURRENCY))
}

/// Product ids come from `value` separated by `|`, or from the product column.
fn parse_ids(step: &ScriptStep) -> Result<Vec<String>> {
    match step.value.as_deref() {
        Some(value) => Ok(value
            .split('|')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect()),
        None => Ok(vec![step.require_product()?.to_string()]),
    }
}

fn parse_quantity(value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| StoreError::DeveloperError(format!("invalid quantity '{value}'")))
}

fn parse_switch(value: Option<&str>) -> Result<bool> {
    match value {
        None | Some("on") | Some("true") => Ok(true),
        Some("off") | Some("false") => Ok(false),
        Some(other) => Err(StoreError::DeveloperError(format!("expected on or off, got '{other}'"))),
    }
}
