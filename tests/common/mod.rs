#![allow(dead_code)]

use iap_reconciler::application::emitter::EventReceiver;
use iap_reconciler::application::engine::StoreEngine;
use iap_reconciler::config::EngineConfig;
use iap_reconciler::domain::events::{ErrorCode, OutboundEvent};
use iap_reconciler::domain::product::{Product, ProductKind};
use iap_reconciler::infrastructure::in_memory::{InMemoryCatalogStore, InMemoryFinishLedger};
use iap_reconciler::infrastructure::simulated::SimulatedStorefront;
use rust_decimal_macros::dec;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// A storefront stocked with two non-consumables (`A`, `B`), two consumables
/// (`coins`, `gems`) and a subscription (`pro`).
pub fn stocked_store() -> SimulatedStorefront {
    let store = SimulatedStorefront::new();
    store.stock(Product::new("A", ProductKind::NonConsumable, dec!(4.99), "USD"));
    store.stock(Product::new("B", ProductKind::NonConsumable, dec!(2.99), "USD"));
    store.stock(Product::new("coins", ProductKind::Consumable, dec!(0.99), "USD"));
    store.stock(Product::new("gems", ProductKind::Consumable, dec!(1.99), "USD"));
    store.stock(Product::new("pro", ProductKind::Subscription, dec!(9.99), "USD"));
    store
}

pub fn start_engine(store: &SimulatedStorefront, config: EngineConfig) -> (StoreEngine, EventReceiver) {
    StoreEngine::start(
        Arc::new(store.clone()),
        Box::new(InMemoryCatalogStore::new()),
        Arc::new(InMemoryFinishLedger::new()),
        config,
    )
}

pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

pub fn error_codes(events: &[OutboundEvent]) -> Vec<ErrorCode> {
    events
        .iter()
        .filter_map(|event| match event {
            OutboundEvent::PurchaseError(err) => Some(err.code),
            _ => None,
        })
        .collect()
}

pub fn updated_products(events: &[OutboundEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            OutboundEvent::PurchaseUpdated(update) => Some(update.product_id.clone()),
            _ => None,
        })
        .collect()
}

/// Writes a scenario script with the standard header followed by `rows`.
pub fn write_script(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op, product, transaction, value").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}
