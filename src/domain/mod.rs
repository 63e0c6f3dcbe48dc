//! Domain types and the ports the application layer talks through.

pub mod entitlement;
pub mod events;
pub mod intent;
pub mod ports;
pub mod product;
pub mod purchase;
pub mod transaction;
pub mod verification;
