//! Ledger Consistency Engine
//!
//! Applies a business event (sales return, purchase receipt, payment) as
//! one atomic set of coordinated updates across independent entity
//! collections, preserving cross-entity numeric invariants.
//!
//! # Architecture
//!
//! - **Entity Store**: versioned records in RocksDB, one column family
//!   per collection, batch commits are all-or-nothing
//! - **Invariant Rules**: pure functions turning snapshots + event
//!   parameters into new entity states
//! - **Transaction Coordinator**: one event in, one atomic batch out
//! - **Event API**: input validation and one operation per business event
//!
//! # Invariants
//!
//! - Money conservation: `due = total - paid`, both non-negative
//! - Stock conservation: quantities change by exactly the event's deltas
//!   and never go negative
//! - Atomicity: an event applies to all its target entities or none;
//!   read-to-commit races surface as `CommitConflict`, never as partial
//!   or lost updates

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod rules;
pub mod store;
pub mod types;

// Re-exports
pub use api::{LedgerApi, PaymentInput, PurchaseReceiptInput, SalesReturnInput};
pub use config::{Config, RocksDbConfig};
pub use coordinator::{AppliedEvent, Coordinator};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use store::{Batch, EntityStore, StoreStats, Versioned};
pub use types::{
    Invoice, InvoiceLine, InvoiceStatus, LedgerEvent, PaymentTarget, PurchaseOrder,
    PurchaseOrderLine, PurchaseOrderStatus, ReceivedLine, ReturnLine, SalesReturn, StockItem,
};
