//! Transaction coordinator
//!
//! Turns one [`LedgerEvent`] into one entity-store batch and commits it.
//! Reads are not part of the atomic batch; staleness between read and
//! commit is caught by the store's version check, which fails the whole
//! event with `CommitConflict`. On success all affected entities reflect
//! their new state atomically; on any failure none do.

use crate::{
    metrics::Metrics,
    rules,
    store::{EntityStore, Versioned},
    types::{LedgerEvent, PaymentTarget, StockItem},
    Config, Result,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Result of a successfully applied ledger event
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AppliedEvent {
    /// ID of the sales return record, when the event created one
    pub return_id: Option<Uuid>,
    /// Number of entities written by the batch
    pub entities_written: usize,
    /// Human-readable summary for UI display
    pub message: String,
}

/// Transaction coordinator
///
/// The only legal mutation path for entities touched by ledger events.
pub struct Coordinator {
    store: Arc<EntityStore>,
    config: Config,
    metrics: Metrics,
}

impl Coordinator {
    /// Create a coordinator over an open store
    pub fn new(store: Arc<EntityStore>, config: Config, metrics: Metrics) -> Self {
        Self {
            store,
            config,
            metrics,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Apply one ledger event: load current state, run the invariant
    /// rule, commit all resulting writes as one atomic batch.
    ///
    /// No internal retry; a `CommitConflict` or `StoreUnavailable` means
    /// nothing was written and the caller may retry the whole event.
    pub async fn apply(&self, event: LedgerEvent) -> Result<AppliedEvent> {
        let started = Instant::now();
        let kind = event.kind();

        let result = self.apply_inner(&event);

        self.metrics
            .apply_duration
            .observe(started.elapsed().as_secs_f64());
        match &result {
            Ok(applied) => {
                self.metrics.events_applied.inc();
                tracing::info!(
                    event = kind,
                    entities = applied.entities_written,
                    "Ledger event applied"
                );
            }
            Err(err) => {
                self.metrics.events_rejected.inc();
                if matches!(err, crate::Error::CommitConflict(_)) {
                    self.metrics.commit_conflicts.inc();
                }
                tracing::warn!(event = kind, error = %err, "Ledger event rejected");
            }
        }

        result
    }

    fn apply_inner(&self, event: &LedgerEvent) -> Result<AppliedEvent> {
        match event {
            LedgerEvent::SalesReturn {
                return_id,
                invoice_id,
                items,
                reason,
                return_date,
            } => {
                let invoice = self.store.get_invoice(*invoice_id)?;
                let (stock, versions) =
                    self.load_stock(items.iter().map(|line| line.product_id))?;

                let outcome = rules::sales_return(
                    &invoice.record,
                    &stock,
                    *return_id,
                    items,
                    reason,
                    *return_date,
                    self.tolerance(),
                )?;

                let mut batch = self.store.batch();
                batch.update_invoice(invoice.version, outcome.invoice);
                for item in outcome.restocked {
                    batch.update_stock_item(versions[&item.id], item);
                }
                batch.create_sales_return(outcome.record.clone());
                let entities_written = batch.len();
                self.store.commit(batch)?;

                Ok(AppliedEvent {
                    return_id: Some(*return_id),
                    entities_written,
                    message: format!(
                        "Sales return of {}{} recorded against invoice {}; stock restored",
                        self.config.currency_symbol, outcome.record.total_return_value, invoice_id
                    ),
                })
            }

            LedgerEvent::PurchaseReceipt {
                purchase_order_id,
                received_items,
            } => {
                let order = self.store.get_purchase_order(*purchase_order_id)?;
                let (stock, versions) =
                    self.load_stock(received_items.iter().map(|line| line.material_id))?;

                let outcome = rules::purchase_receipt(&order.record, &stock, received_items)?;

                let mut batch = self.store.batch();
                batch.update_purchase_order(order.version, outcome.order);
                for item in outcome.restocked {
                    batch.update_stock_item(versions[&item.id], item);
                }
                let entities_written = batch.len();
                self.store.commit(batch)?;

                Ok(AppliedEvent {
                    return_id: None,
                    entities_written,
                    message: format!(
                        "Purchase order {} received; stock and unit costs updated",
                        purchase_order_id
                    ),
                })
            }

            LedgerEvent::Payment {
                target,
                amount,
                date: _,
            } => match target {
                PaymentTarget::Invoice(invoice_id) => {
                    let invoice = self.store.get_invoice(*invoice_id)?;
                    let paid =
                        rules::invoice_payment(&invoice.record, *amount, self.tolerance())?;
                    let status = paid.status;

                    let mut batch = self.store.batch();
                    batch.update_invoice(invoice.version, paid);
                    self.store.commit(batch)?;

                    Ok(AppliedEvent {
                        return_id: None,
                        entities_written: 1,
                        message: format!(
                            "Payment of {}{} recorded against invoice {} ({})",
                            self.config.currency_symbol, amount, invoice_id, status
                        ),
                    })
                }
                PaymentTarget::PurchaseOrder(order_id) => {
                    let order = self.store.get_purchase_order(*order_id)?;
                    let paid =
                        rules::purchase_order_payment(&order.record, *amount, self.tolerance())?;
                    let status = paid.status;

                    let mut batch = self.store.batch();
                    batch.update_purchase_order(order.version, paid);
                    self.store.commit(batch)?;

                    Ok(AppliedEvent {
                        return_id: None,
                        entities_written: 1,
                        message: format!(
                            "Payment of {}{} recorded against purchase order {} ({})",
                            self.config.currency_symbol, amount, order_id, status
                        ),
                    })
                }
            },
        }
    }

    /// Load each distinct stock item once, keeping the versions read so
    /// the batch can guard its updates.
    fn load_stock(
        &self,
        ids: impl Iterator<Item = Uuid>,
    ) -> Result<(Vec<StockItem>, HashMap<Uuid, u64>)> {
        let mut stock = Vec::new();
        let mut versions = HashMap::new();
        for id in ids {
            if versions.contains_key(&id) {
                continue;
            }
            let Versioned { version, record } = self.store.get_stock_item(id)?;
            versions.insert(id, version);
            stock.push(record);
        }
        Ok((stock, versions))
    }

    fn tolerance(&self) -> Decimal {
        self.config.settlement_tolerance
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}
