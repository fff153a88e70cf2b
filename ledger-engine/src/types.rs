//! Core domain types for the ledger engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Status of an invoice.
///
/// `Unpaid`, `PartiallyPaid`, and `Paid` are always derived from the
/// invoice amounts by the invariant rules. `Overdue` and `Cancelled`
/// are assigned by collaborators outside this engine and only read here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// No payment recorded
    Unpaid,
    /// Some payment recorded, balance outstanding
    #[serde(rename = "Partially Paid")]
    PartiallyPaid,
    /// Balance settled within tolerance
    Paid,
    /// Past due date (set by out-of-scope collaborators)
    Overdue,
    /// Voided (set by out-of-scope collaborators)
    Cancelled,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::Unpaid => "Unpaid",
            InvoiceStatus::PartiallyPaid => "Partially Paid",
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::Overdue => "Overdue",
            InvoiceStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One line on an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// Product sold
    pub product_id: Uuid,
    /// Quantity invoiced
    pub quantity: u32,
    /// Price per unit
    pub unit_price: Decimal,
    /// quantity * unit_price
    pub line_total: Decimal,
}

/// A customer invoice
///
/// Invariant: `due_amount = total_amount - paid_amount`, both non-negative.
/// After creation the only legal mutation path is a ledger event applied
/// through the transaction coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice ID
    pub id: Uuid,
    /// Customer the invoice was issued to
    pub customer_id: Uuid,
    /// Line items, in invoiced order
    pub items: Vec<InvoiceLine>,
    /// Total invoiced amount
    pub total_amount: Decimal,
    /// Amount settled so far
    pub paid_amount: Decimal,
    /// Outstanding amount
    pub due_amount: Decimal,
    /// Derived status
    pub status: InvoiceStatus,
}

impl Invoice {
    /// Total invoiced quantity for one product across all lines
    pub fn invoiced_quantity(&self, product_id: Uuid) -> u64 {
        self.items
            .iter()
            .filter(|line| line.product_id == product_id)
            .map(|line| u64::from(line.quantity))
            .sum()
    }
}

/// A stocked item (finished good or raw material — both share this shape,
/// so they live in one collection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    /// Item ID
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Units on hand, never negative
    pub quantity: u32,
    /// Weighted-average cost per unit
    pub unit_cost: Decimal,
    /// Selling price, if the item is sold directly
    pub selling_price: Option<Decimal>,
}

/// One returned line on a sales return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnLine {
    /// Product being returned
    pub product_id: Uuid,
    /// Quantity returned
    pub quantity: u32,
    /// Value credited per unit
    pub unit_value: Decimal,
}

impl ReturnLine {
    /// quantity * unit_value
    pub fn line_value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_value
    }
}

/// A customer return against an invoice
///
/// Created exactly once per return event, immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesReturn {
    /// Return ID
    pub id: Uuid,
    /// Source invoice
    pub invoice_id: Uuid,
    /// Returned lines, in submitted order
    pub items: Vec<ReturnLine>,
    /// Sum of all line values
    pub total_return_value: Decimal,
    /// Reason given by the customer
    pub reason: String,
    /// Date of the return
    pub return_date: NaiveDate,
}

/// Status of a purchase order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseOrderStatus {
    /// Placed, not yet shipped
    Pending,
    /// In transit from the supplier
    Shipped,
    /// Goods received into stock
    Received,
    /// Voided before receipt
    Cancelled,
    /// Received and fully paid
    Completed,
}

impl PurchaseOrderStatus {
    /// Whether goods can still be received against this order
    pub fn is_receivable(&self) -> bool {
        matches!(self, PurchaseOrderStatus::Pending | PurchaseOrderStatus::Shipped)
    }
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PurchaseOrderStatus::Pending => "Pending",
            PurchaseOrderStatus::Shipped => "Shipped",
            PurchaseOrderStatus::Received => "Received",
            PurchaseOrderStatus::Cancelled => "Cancelled",
            PurchaseOrderStatus::Completed => "Completed",
        };
        write!(f, "{}", s)
    }
}

/// One ordered line on a purchase order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    /// Material ordered
    pub material_id: Uuid,
    /// Quantity ordered
    pub quantity: u32,
    /// Agreed cost per unit
    pub unit_cost: Decimal,
}

/// A purchase order placed with a supplier
///
/// Invariant: `due_amount = amount - paid_amount`, both non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    /// Order ID
    pub id: Uuid,
    /// Supplier the order was placed with
    pub supplier_id: Uuid,
    /// Ordered lines
    pub items: Vec<PurchaseOrderLine>,
    /// Total order amount (sum of lines)
    pub amount: Decimal,
    /// Amount paid so far
    pub paid_amount: Decimal,
    /// Outstanding amount
    pub due_amount: Decimal,
    /// Lifecycle status
    pub status: PurchaseOrderStatus,
}

impl PurchaseOrder {
    /// Whether the order carries a line for the given material
    pub fn has_material(&self, material_id: Uuid) -> bool {
        self.items.iter().any(|line| line.material_id == material_id)
    }
}

/// One line of goods received against a purchase order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedLine {
    /// Material received
    pub material_id: Uuid,
    /// Quantity received
    pub quantity: u32,
    /// Actual cost per unit on receipt
    pub unit_cost: Decimal,
}

/// Target of a payment event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "targetType", content = "targetId", rename_all = "camelCase")]
pub enum PaymentTarget {
    /// Payment received against a customer invoice
    Invoice(Uuid),
    /// Payment made against a supplier purchase order
    PurchaseOrder(Uuid),
}

impl PaymentTarget {
    /// The target entity ID
    pub fn id(&self) -> Uuid {
        match self {
            PaymentTarget::Invoice(id) | PaymentTarget::PurchaseOrder(id) => *id,
        }
    }
}

/// One business action requiring coordinated updates across entities.
///
/// Not persisted as its own record; it is the unit of atomicity. Every
/// event fully applies its deltas to all target entities or none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Customer returned goods against an invoice
    SalesReturn {
        /// ID assigned to the return record created by this event
        return_id: Uuid,
        /// Source invoice
        invoice_id: Uuid,
        /// Returned lines
        items: Vec<ReturnLine>,
        /// Reason given by the customer
        reason: String,
        /// Date of the return
        return_date: NaiveDate,
    },
    /// Goods on a purchase order arrived and were put into stock
    PurchaseReceipt {
        /// The order being received
        purchase_order_id: Uuid,
        /// Lines actually received (may differ in cost from the order)
        received_items: Vec<ReceivedLine>,
    },
    /// A payment was recorded against an invoice or purchase order
    Payment {
        /// What the payment settles
        target: PaymentTarget,
        /// Payment amount, must be positive
        amount: Decimal,
        /// Date of the payment
        date: NaiveDate,
    },
}

impl LedgerEvent {
    /// Short name of the event kind, for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::SalesReturn { .. } => "sales_return",
            LedgerEvent::PurchaseReceipt { .. } => "purchase_receipt",
            LedgerEvent::Payment { .. } => "payment",
        }
    }
}
