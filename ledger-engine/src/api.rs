//! Event API
//!
//! Thin validating wrapper around the transaction coordinator, one
//! operation per supported business event. Shape validation happens here
//! and returns [`Error::Validation`] before any read; semantic checks
//! live in the invariant rules. No internal retry: a failed event is
//! reported to the caller, who decides whether to resubmit.

use crate::{
    coordinator::{AppliedEvent, Coordinator},
    error::{Error, Result},
    metrics::Metrics,
    store::EntityStore,
    types::{LedgerEvent, PaymentTarget, ReceivedLine, ReturnLine},
    Config,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Input for [`LedgerApi::record_sales_return`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesReturnInput {
    /// Source invoice
    pub invoice_id: Uuid,
    /// Returned lines
    pub items: Vec<ReturnLine>,
    /// Reason given by the customer
    pub reason: String,
    /// Date of the return
    pub return_date: NaiveDate,
}

/// Input for [`LedgerApi::receive_purchase_order`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceiptInput {
    /// The order being received
    pub purchase_order_id: Uuid,
    /// Lines actually received
    pub received_items: Vec<ReceivedLine>,
}

/// Input for [`LedgerApi::record_payment`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInput {
    /// What the payment settles
    #[serde(flatten)]
    pub target: PaymentTarget,
    /// Payment amount
    pub amount: Decimal,
    /// Date of the payment
    pub date: NaiveDate,
}

/// External-facing ledger operations
///
/// Constructed with an explicit [`Config`]; currency and tolerance are
/// not ambient global state.
#[derive(Debug)]
pub struct LedgerApi {
    coordinator: Coordinator,
}

impl LedgerApi {
    /// Open the entity store at the configured data directory and build
    /// the API on top of it
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(EntityStore::open(&config)?);
        Self::with_store(store, config)
    }

    /// Build the API over an already-open store (shared with seeding
    /// flows or tests)
    pub fn with_store(store: Arc<EntityStore>, config: Config) -> Result<Self> {
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("metric registration failed: {}", e)))?;
        Ok(Self {
            coordinator: Coordinator::new(store, config, metrics),
        })
    }

    /// The underlying store, for out-of-scope creation flows and tests
    pub fn store(&self) -> &Arc<EntityStore> {
        self.coordinator.store()
    }

    /// Record a customer return against an invoice.
    ///
    /// Atomically creates the return record, adjusts the invoice amounts
    /// and status, and restocks the returned goods.
    pub async fn record_sales_return(&self, input: SalesReturnInput) -> Result<AppliedEvent> {
        validate_sales_return(&input)?;

        self.coordinator
            .apply(LedgerEvent::SalesReturn {
                return_id: Uuid::new_v4(),
                invoice_id: input.invoice_id,
                items: input.items,
                reason: input.reason,
                return_date: input.return_date,
            })
            .await
    }

    /// Receive goods against a purchase order.
    ///
    /// Atomically moves the order to `Received`, adds the received
    /// quantities to stock, and re-averages unit costs.
    pub async fn receive_purchase_order(
        &self,
        input: PurchaseReceiptInput,
    ) -> Result<AppliedEvent> {
        validate_purchase_receipt(&input)?;

        self.coordinator
            .apply(LedgerEvent::PurchaseReceipt {
                purchase_order_id: input.purchase_order_id,
                received_items: input.received_items,
            })
            .await
    }

    /// Record a payment against an invoice or purchase order.
    pub async fn record_payment(&self, input: PaymentInput) -> Result<AppliedEvent> {
        validate_payment(&input)?;

        self.coordinator
            .apply(LedgerEvent::Payment {
                target: input.target,
                amount: input.amount,
                date: input.date,
            })
            .await
    }
}

fn validate_sales_return(input: &SalesReturnInput) -> Result<()> {
    if input.items.is_empty() {
        return Err(Error::Validation(
            "a sales return needs at least one line item".to_string(),
        ));
    }
    for (i, line) in input.items.iter().enumerate() {
        if line.quantity == 0 {
            return Err(Error::Validation(format!(
                "line {}: quantity must be positive",
                i
            )));
        }
        if line.unit_value <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "line {}: unit value must be positive",
                i
            )));
        }
    }
    if input.reason.trim().is_empty() {
        return Err(Error::Validation("a return reason is required".to_string()));
    }
    Ok(())
}

fn validate_purchase_receipt(input: &PurchaseReceiptInput) -> Result<()> {
    if input.received_items.is_empty() {
        return Err(Error::Validation(
            "a receipt needs at least one received line".to_string(),
        ));
    }
    for (i, line) in input.received_items.iter().enumerate() {
        if line.quantity == 0 {
            return Err(Error::Validation(format!(
                "line {}: quantity must be positive",
                i
            )));
        }
        if line.unit_cost < Decimal::ZERO {
            return Err(Error::Validation(format!(
                "line {}: unit cost must not be negative",
                i
            )));
        }
    }
    Ok(())
}

fn validate_payment(input: &PaymentInput) -> Result<()> {
    if input.amount <= Decimal::ZERO {
        return Err(Error::Validation(
            "payment amount must be positive".to_string(),
        ));
    }
    Ok(())
}
