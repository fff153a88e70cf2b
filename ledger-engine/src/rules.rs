//! Invariant rules
//!
//! Pure functions, no I/O. Each rule takes current-state snapshots of the
//! affected entities plus the event parameters and returns the new state
//! of every entity the event must touch. A rule that fails rejects the
//! whole event before any store mutation.

use crate::{
    error::{Error, Result},
    types::{
        Invoice, InvoiceStatus, PurchaseOrder, PurchaseOrderStatus, ReceivedLine, ReturnLine,
        SalesReturn, StockItem,
    },
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

/// Derive an invoice status from its amounts.
///
/// `Overdue` and `Cancelled` are intentionally ignored here; they are
/// assigned by out-of-scope collaborators, and a cancelled invoice is
/// rejected before any rule recomputes its status.
pub fn derive_invoice_status(paid: Decimal, due: Decimal, tolerance: Decimal) -> InvoiceStatus {
    if due <= tolerance {
        InvoiceStatus::Paid
    } else if paid > Decimal::ZERO {
        InvoiceStatus::PartiallyPaid
    } else {
        InvoiceStatus::Unpaid
    }
}

/// Recompute a weighted-average unit cost after merging received stock.
///
/// Falls back to the received cost when both quantities are zero.
pub fn weighted_average_cost(
    old_qty: u32,
    old_cost: Decimal,
    recv_qty: u32,
    recv_cost: Decimal,
) -> Decimal {
    let total_qty = u64::from(old_qty) + u64::from(recv_qty);
    if total_qty == 0 {
        return recv_cost;
    }
    let total_value =
        Decimal::from(old_qty) * old_cost + Decimal::from(recv_qty) * recv_cost;
    total_value / Decimal::from(total_qty)
}

/// New entity states produced by the return rule
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnOutcome {
    /// Invoice with amounts and status adjusted
    pub invoice: Invoice,
    /// Stock items with returned quantities added back, one per distinct
    /// product in submitted order
    pub restocked: Vec<StockItem>,
    /// The immutable return record to create
    pub record: SalesReturn,
}

/// Return rule.
///
/// The return value offsets the outstanding due amount first; whatever
/// spills over refunds against the paid amount. The invoice total shrinks
/// by the applied value so `due = total - paid` keeps holding. Every
/// returned line must reference a line on the source invoice and may not
/// exceed the originally invoiced quantity for that product.
pub fn sales_return(
    invoice: &Invoice,
    stock: &[StockItem],
    return_id: Uuid,
    items: &[ReturnLine],
    reason: &str,
    return_date: NaiveDate,
    tolerance: Decimal,
) -> Result<ReturnOutcome> {
    if invoice.status == InvoiceStatus::Cancelled {
        return Err(Error::InvariantViolation(format!(
            "invoice {} is cancelled",
            invoice.id
        )));
    }
    if items.is_empty() {
        return Err(Error::InvariantViolation(
            "a sales return must contain at least one line".to_string(),
        ));
    }

    // Aggregate requested quantities per product and check them against
    // what was invoiced
    let mut requested: Vec<(Uuid, u64)> = Vec::new();
    for line in items {
        if line.quantity == 0 {
            return Err(Error::InvariantViolation(format!(
                "return quantity for product {} must be positive",
                line.product_id
            )));
        }
        if line.unit_value <= Decimal::ZERO {
            return Err(Error::InvariantViolation(format!(
                "unit value for product {} must be positive",
                line.product_id
            )));
        }
        match requested.iter_mut().find(|(id, _)| *id == line.product_id) {
            Some((_, qty)) => *qty += u64::from(line.quantity),
            None => requested.push((line.product_id, u64::from(line.quantity))),
        }
    }

    for (product_id, quantity) in &requested {
        let invoiced = invoice.invoiced_quantity(*product_id);
        if invoiced == 0 {
            return Err(Error::InvariantViolation(format!(
                "product {} is not on invoice {}",
                product_id, invoice.id
            )));
        }
        if *quantity > invoiced {
            return Err(Error::InvariantViolation(format!(
                "return of {} exceeds invoiced quantity {} for product {}",
                quantity, invoiced, product_id
            )));
        }
    }

    let total_value: Decimal = items.iter().map(ReturnLine::line_value).sum();

    // Due absorbs the return first, the remainder refunds against paid
    let applied_to_due = invoice.due_amount.min(total_value);
    let due = invoice.due_amount - applied_to_due;
    let spill = total_value - applied_to_due;
    let paid = (invoice.paid_amount - spill).max(Decimal::ZERO);

    let mut adjusted = invoice.clone();
    adjusted.due_amount = due;
    adjusted.paid_amount = paid;
    adjusted.total_amount = due + paid;
    adjusted.status = derive_invoice_status(paid, due, tolerance);

    // Put the returned quantities back into stock
    let mut by_id: HashMap<Uuid, StockItem> =
        stock.iter().map(|item| (item.id, item.clone())).collect();
    for line in items {
        let item = by_id.get_mut(&line.product_id).ok_or_else(|| {
            Error::StockItemNotFound(line.product_id.to_string())
        })?;
        item.quantity = item.quantity.checked_add(line.quantity).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "stock quantity overflow for product {}",
                line.product_id
            ))
        })?;
    }
    let restocked = requested
        .iter()
        .map(|(id, _)| by_id[id].clone())
        .collect();

    let record = SalesReturn {
        id: return_id,
        invoice_id: invoice.id,
        items: items.to_vec(),
        total_return_value: total_value,
        reason: reason.to_string(),
        return_date,
    };

    Ok(ReturnOutcome {
        invoice: adjusted,
        restocked,
        record,
    })
}

/// New entity states produced by the receipt rule
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptOutcome {
    /// Order moved to `Received`
    pub order: PurchaseOrder,
    /// Stock items with quantities added and unit costs re-averaged, one
    /// per distinct material in submitted order
    pub restocked: Vec<StockItem>,
}

/// Receipt rule.
///
/// Receiving merges each line into stock at a weighted-average unit cost
/// and moves the order to `Received`. Only pending or shipped orders can
/// be received, and every received line must reference a material on the
/// order.
pub fn purchase_receipt(
    order: &PurchaseOrder,
    stock: &[StockItem],
    received: &[ReceivedLine],
) -> Result<ReceiptOutcome> {
    if !order.status.is_receivable() {
        return Err(Error::InvariantViolation(format!(
            "purchase order {} is {} and cannot be received",
            order.id, order.status
        )));
    }
    if received.is_empty() {
        return Err(Error::InvariantViolation(
            "a receipt must contain at least one line".to_string(),
        ));
    }

    for line in received {
        if line.quantity == 0 {
            return Err(Error::InvariantViolation(format!(
                "received quantity for material {} must be positive",
                line.material_id
            )));
        }
        if line.unit_cost < Decimal::ZERO {
            return Err(Error::InvariantViolation(format!(
                "unit cost for material {} must not be negative",
                line.material_id
            )));
        }
        if !order.has_material(line.material_id) {
            return Err(Error::InvariantViolation(format!(
                "material {} is not on purchase order {}",
                line.material_id, order.id
            )));
        }
    }

    let mut by_id: HashMap<Uuid, StockItem> =
        stock.iter().map(|item| (item.id, item.clone())).collect();
    let mut order_of_arrival: Vec<Uuid> = Vec::new();
    for line in received {
        let item = by_id.get_mut(&line.material_id).ok_or_else(|| {
            Error::StockItemNotFound(line.material_id.to_string())
        })?;
        item.unit_cost =
            weighted_average_cost(item.quantity, item.unit_cost, line.quantity, line.unit_cost);
        item.quantity = item.quantity.checked_add(line.quantity).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "stock quantity overflow for material {}",
                line.material_id
            ))
        })?;
        if !order_of_arrival.contains(&line.material_id) {
            order_of_arrival.push(line.material_id);
        }
    }
    let restocked = order_of_arrival.iter().map(|id| by_id[id].clone()).collect();

    let mut received_order = order.clone();
    received_order.status = PurchaseOrderStatus::Received;

    Ok(ReceiptOutcome {
        order: received_order,
        restocked,
    })
}

/// Payment rule for invoices.
///
/// The payment settles up to the outstanding due amount; anything beyond
/// it is not applied. Status is recomputed from the resulting amounts.
pub fn invoice_payment(invoice: &Invoice, amount: Decimal, tolerance: Decimal) -> Result<Invoice> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvariantViolation(
            "payment amount must be positive".to_string(),
        ));
    }
    if invoice.status == InvoiceStatus::Cancelled {
        return Err(Error::InvariantViolation(format!(
            "invoice {} is cancelled",
            invoice.id
        )));
    }

    let applied = invoice.due_amount.min(amount);
    let mut paid_invoice = invoice.clone();
    paid_invoice.due_amount -= applied;
    paid_invoice.paid_amount += applied;
    paid_invoice.status =
        derive_invoice_status(paid_invoice.paid_amount, paid_invoice.due_amount, tolerance);

    Ok(paid_invoice)
}

/// Payment rule for purchase orders.
///
/// Same due/paid derivation as invoices; an order whose due amount drops
/// within tolerance becomes `Completed`, otherwise it keeps its current
/// lifecycle status.
pub fn purchase_order_payment(
    order: &PurchaseOrder,
    amount: Decimal,
    tolerance: Decimal,
) -> Result<PurchaseOrder> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvariantViolation(
            "payment amount must be positive".to_string(),
        ));
    }
    if order.status == PurchaseOrderStatus::Cancelled {
        return Err(Error::InvariantViolation(format!(
            "purchase order {} is cancelled",
            order.id
        )));
    }

    let applied = order.due_amount.min(amount);
    let mut paid_order = order.clone();
    paid_order.due_amount -= applied;
    paid_order.paid_amount += applied;
    if paid_order.due_amount <= tolerance {
        paid_order.status = PurchaseOrderStatus::Completed;
    }

    Ok(paid_order)
}
