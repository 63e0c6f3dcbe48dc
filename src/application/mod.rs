//! Orchestration of the purchase lifecycle.
//!
//! [`engine::StoreEngine`] is the entry point. It owns two long-lived tokio
//! tasks (the transaction update listener and the promoted intent handler) and
//! spawns one task per purchase; every outcome leaves through the event
//! emitter.

pub mod emitter;
pub mod engine;
pub mod finisher;
pub mod listener;
pub mod promoted;
pub mod purchase;
pub mod reconciler;
pub mod restore;
