//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: return value and restocked quantity move together
//! - Status derivation: status is a pure function of the amounts
//! - Non-negativity: due amounts and stock quantities never go negative
//! - Atomicity: a failed event leaves every target entity untouched

use chrono::NaiveDate;
use ledger_engine::{
    rules, Config, EntityStore, Invoice, InvoiceLine, InvoiceStatus, LedgerApi, PaymentInput,
    PaymentTarget, PurchaseOrder, PurchaseOrderLine, PurchaseOrderStatus, ReceivedLine,
    ReturnLine, SalesReturnInput, StockItem,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

const TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

/// Strategy for money amounts in cents (positive)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_00).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for non-negative money amounts in cents
fn non_negative_amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..1_000_000_00).prop_map(|cents| Decimal::new(cents, 2))
}

fn test_api() -> (LedgerApi, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    (LedgerApi::new(config).unwrap(), temp_dir)
}

fn seed_invoice(
    store: &EntityStore,
    product_id: Uuid,
    quantity: u32,
    unit_price: Decimal,
    paid: Decimal,
) -> Invoice {
    let total = Decimal::from(quantity) * unit_price;
    let paid = paid.min(total);
    let due = total - paid;
    let invoice = Invoice {
        id: Uuid::new_v4(),
        customer_id: Uuid::new_v4(),
        items: vec![InvoiceLine {
            product_id,
            quantity,
            unit_price,
            line_total: total,
        }],
        total_amount: total,
        paid_amount: paid,
        due_amount: due,
        status: rules::derive_invoice_status(paid, due, TOLERANCE),
    };
    store.put_invoice(&invoice).unwrap();
    invoice
}

fn seed_stock(store: &EntityStore, id: Uuid, quantity: u32, unit_cost: Decimal) -> StockItem {
    let item = StockItem {
        id,
        name: "Widget".to_string(),
        quantity,
        unit_cost,
        selling_price: None,
    };
    store.put_stock_item(&item).unwrap();
    item
}

fn seed_order(
    store: &EntityStore,
    material_id: Uuid,
    quantity: u32,
    unit_cost: Decimal,
) -> PurchaseOrder {
    let amount = Decimal::from(quantity) * unit_cost;
    let order = PurchaseOrder {
        id: Uuid::new_v4(),
        supplier_id: Uuid::new_v4(),
        items: vec![PurchaseOrderLine {
            material_id,
            quantity,
            unit_cost,
        }],
        amount,
        paid_amount: Decimal::ZERO,
        due_amount: amount,
        status: PurchaseOrderStatus::Pending,
    };
    store.put_purchase_order(&order).unwrap();
    order
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: status is a pure function of the amounts
    #[test]
    fn prop_status_derivation(
        paid in non_negative_amount_strategy(),
        due in non_negative_amount_strategy(),
    ) {
        let status = rules::derive_invoice_status(paid, due, TOLERANCE);
        if due <= TOLERANCE {
            prop_assert_eq!(status, InvoiceStatus::Paid);
        } else if paid > Decimal::ZERO {
            prop_assert_eq!(status, InvoiceStatus::PartiallyPaid);
        } else {
            prop_assert_eq!(status, InvoiceStatus::Unpaid);
        }
    }

    /// Property: a weighted-average cost lies between the two input costs
    #[test]
    fn prop_weighted_average_bounds(
        old_qty in 0u32..10_000,
        recv_qty in 1u32..10_000,
        old_cost in non_negative_amount_strategy(),
        recv_cost in non_negative_amount_strategy(),
    ) {
        let avg = rules::weighted_average_cost(old_qty, old_cost, recv_qty, recv_cost);
        let lo = old_cost.min(recv_cost);
        let hi = old_cost.max(recv_cost);
        if old_qty == 0 {
            prop_assert_eq!(avg, recv_cost);
        } else {
            prop_assert!(avg >= lo && avg <= hi);
        }
    }

    /// Property: conservation — the invoice due amount and the restocked
    /// quantity move together (or, on rejection, not at all), and the
    /// due amount is clamped at zero
    #[test]
    fn prop_return_conservation(
        invoiced_qty in 1u32..100,
        return_qty in 1u32..150,
        unit_price_cents in 100i64..100_000,
        paid in non_negative_amount_strategy(),
        stock_qty in 0u32..1_000,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (api, _temp) = test_api();
            let product = Uuid::new_v4();
            let unit_price = Decimal::new(unit_price_cents, 2);
            let invoice = seed_invoice(api.store(), product, invoiced_qty, unit_price, paid);
            seed_stock(api.store(), product, stock_qty, Decimal::new(500, 2));

            let result = api
                .record_sales_return(SalesReturnInput {
                    invoice_id: invoice.id,
                    items: vec![ReturnLine {
                        product_id: product,
                        quantity: return_qty,
                        unit_value: unit_price,
                    }],
                    reason: "property".to_string(),
                    return_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                })
                .await;

            let stored_invoice = api.store().get_invoice(invoice.id).unwrap().record;
            let stored_stock = api.store().get_stock_item(product).unwrap().record;

            if return_qty <= invoiced_qty {
                let applied = result.unwrap();
                let value = Decimal::from(return_qty) * unit_price;
                let applied_to_due = invoice.due_amount.min(value);
                prop_assert_eq!(
                    stored_invoice.due_amount,
                    invoice.due_amount - applied_to_due
                );
                prop_assert_eq!(
                    stored_stock.quantity,
                    stock_qty + return_qty
                );
                prop_assert!(applied.return_id.is_some());
            } else {
                // Rejected: all target entities untouched, together
                prop_assert!(result.is_err());
                prop_assert_eq!(stored_invoice.clone(), invoice);
                prop_assert_eq!(stored_stock.quantity, stock_qty);
            }

            // Non-negativity, the amount invariant, and status derivation
            // hold either way
            prop_assert!(stored_invoice.due_amount >= Decimal::ZERO);
            prop_assert!(stored_invoice.paid_amount >= Decimal::ZERO);
            prop_assert_eq!(
                stored_invoice.due_amount,
                stored_invoice.total_amount - stored_invoice.paid_amount
            );
            prop_assert_eq!(
                stored_invoice.status,
                rules::derive_invoice_status(
                    stored_invoice.paid_amount,
                    stored_invoice.due_amount,
                    TOLERANCE
                )
            );
            Ok(())
        })?;
    }

    /// Property: any sequence of payments keeps amounts non-negative and
    /// the status consistent with the amounts
    #[test]
    fn prop_payment_sequence_non_negative(
        total_cents in 1_000i64..1_000_000,
        payments in prop::collection::vec(1i64..500_000, 1..8),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (api, _temp) = test_api();
            let product = Uuid::new_v4();
            let unit_price = Decimal::new(total_cents, 2);
            let invoice = seed_invoice(api.store(), product, 1, unit_price, Decimal::ZERO);

            for cents in payments {
                api.record_payment(PaymentInput {
                    target: PaymentTarget::Invoice(invoice.id),
                    amount: Decimal::new(cents, 2),
                    date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                })
                .await
                .unwrap();

                let stored = api.store().get_invoice(invoice.id).unwrap().record;
                prop_assert!(stored.due_amount >= Decimal::ZERO);
                prop_assert!(stored.paid_amount <= stored.total_amount);
                prop_assert_eq!(
                    stored.status,
                    rules::derive_invoice_status(
                        stored.paid_amount,
                        stored.due_amount,
                        TOLERANCE
                    )
                );
            }
            Ok(())
        })?;
    }
}

mod integration_tests {
    use super::*;

    /// Invoice total 1000, paid 1000, due 0, status Paid;
    /// a return of 200 refunds against the paid amount
    #[tokio::test]
    async fn test_return_against_settled_invoice() {
        let (api, _temp) = test_api();
        let product = Uuid::new_v4();
        let invoice = seed_invoice(
            api.store(),
            product,
            10,
            Decimal::from(100),
            Decimal::from(1000),
        );
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        seed_stock(api.store(), product, 3, Decimal::from(60));

        api.record_sales_return(SalesReturnInput {
            invoice_id: invoice.id,
            items: vec![ReturnLine {
                product_id: product,
                quantity: 2,
                unit_value: Decimal::from(100),
            }],
            reason: "changed mind".to_string(),
            return_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        })
        .await
        .unwrap();

        let stored = api.store().get_invoice(invoice.id).unwrap().record;
        assert_eq!(stored.due_amount, Decimal::ZERO);
        assert_eq!(stored.paid_amount, Decimal::from(800));
        assert_eq!(stored.total_amount, Decimal::from(800));
        // Nothing is outstanding against the reduced total, so Paid holds
        assert_eq!(stored.status, InvoiceStatus::Paid);
        assert_eq!(api.store().get_stock_item(product).unwrap().record.quantity, 5);
    }

    /// A return exceeding the invoiced quantity changes
    /// nothing at all
    #[tokio::test]
    async fn test_oversized_return_rejected_without_effect() {
        let (api, _temp) = test_api();
        let product = Uuid::new_v4();
        let invoice = seed_invoice(
            api.store(),
            product,
            3,
            Decimal::from(100),
            Decimal::ZERO,
        );
        seed_stock(api.store(), product, 8, Decimal::from(60));

        let err = api
            .record_sales_return(SalesReturnInput {
                invoice_id: invoice.id,
                items: vec![ReturnLine {
                    product_id: product,
                    quantity: 4,
                    unit_value: Decimal::from(100),
                }],
                reason: "oversized".to_string(),
                return_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ledger_engine::Error::InvariantViolation(_)));

        assert_eq!(api.store().get_invoice(invoice.id).unwrap().record, invoice);
        assert_eq!(api.store().get_stock_item(product).unwrap().record.quantity, 8);
    }

    /// A receipt whose commit is made to fail (a version
    /// race injected between read and commit) returns CommitConflict and
    /// leaves stock exactly at its pre-call snapshot
    #[tokio::test]
    async fn test_receipt_commit_conflict_leaves_no_partial_state() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        let store = EntityStore::open(&config).unwrap();

        let material = Uuid::new_v4();
        let order = seed_order(&store, material, 100, Decimal::from(10));
        let item = seed_stock(&store, material, 50, Decimal::from(8));

        // Read snapshots, run the rule, stage the batch
        let order_snapshot = store.get_purchase_order(order.id).unwrap();
        let item_snapshot = store.get_stock_item(material).unwrap();
        let outcome = rules::purchase_receipt(
            &order_snapshot.record,
            &[item_snapshot.record.clone()],
            &[ReceivedLine {
                material_id: material,
                quantity: 100,
                unit_cost: Decimal::from(10),
            }],
        )
        .unwrap();

        // A concurrent writer slips in between read and commit
        store.put_stock_item(&item).unwrap();

        let mut batch = store.batch();
        batch.update_purchase_order(order_snapshot.version, outcome.order);
        for restocked in outcome.restocked {
            batch.update_stock_item(item_snapshot.version, restocked);
        }
        let err = store.commit(batch).unwrap_err();
        assert!(matches!(err, ledger_engine::Error::CommitConflict(_)));

        // Pre-call snapshot intact: order not received, stock unchanged
        let stored_order = store.get_purchase_order(order.id).unwrap().record;
        assert_eq!(stored_order.status, PurchaseOrderStatus::Pending);
        let stored_item = store.get_stock_item(material).unwrap().record;
        assert_eq!(stored_item.quantity, 50);
        assert_eq!(stored_item.unit_cost, Decimal::from(8));
    }

    /// Weighted-average cost on receipt: 50 @ 8 receiving 100 @ 10
    #[tokio::test]
    async fn test_weighted_average_receipt_end_to_end() {
        let (api, _temp) = test_api();
        let material = Uuid::new_v4();
        let order = seed_order(api.store(), material, 100, Decimal::from(10));
        seed_stock(api.store(), material, 50, Decimal::from(8));

        api.receive_purchase_order(ledger_engine::PurchaseReceiptInput {
            purchase_order_id: order.id,
            received_items: vec![ReceivedLine {
                material_id: material,
                quantity: 100,
                unit_cost: Decimal::from(10),
            }],
        })
        .await
        .unwrap();

        let stored = api.store().get_stock_item(material).unwrap().record;
        assert_eq!(stored.quantity, 150);
        // (50*8 + 100*10) / 150 = 9.333...
        assert_eq!(stored.unit_cost, Decimal::from(1400) / Decimal::from(150));
    }

    /// A full lifecycle: receive a purchase order, pay it off, then take
    /// a customer return against an invoice for the same product
    #[tokio::test]
    async fn test_full_ledger_lifecycle() {
        let (api, _temp) = test_api();
        let product = Uuid::new_v4();
        seed_stock(api.store(), product, 0, Decimal::ZERO);

        // Receive 100 units at 6
        let order = seed_order(api.store(), product, 100, Decimal::from(6));
        api.receive_purchase_order(ledger_engine::PurchaseReceiptInput {
            purchase_order_id: order.id,
            received_items: vec![ReceivedLine {
                material_id: product,
                quantity: 100,
                unit_cost: Decimal::from(6),
            }],
        })
        .await
        .unwrap();

        // Pay the order off in two installments
        for amount in [Decimal::from(200), Decimal::from(400)] {
            api.record_payment(PaymentInput {
                target: PaymentTarget::PurchaseOrder(order.id),
                amount,
                date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            })
            .await
            .unwrap();
        }
        let stored_order = api.store().get_purchase_order(order.id).unwrap().record;
        assert_eq!(stored_order.status, PurchaseOrderStatus::Completed);
        assert_eq!(stored_order.paid_amount, Decimal::from(600));

        // Sell 10 (out-of-scope flow seeds the invoice), customer pays,
        // then returns 4
        let invoice = seed_invoice(api.store(), product, 10, Decimal::from(10), Decimal::ZERO);
        api.record_payment(PaymentInput {
            target: PaymentTarget::Invoice(invoice.id),
            amount: Decimal::from(100),
            date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
        })
        .await
        .unwrap();

        api.record_sales_return(SalesReturnInput {
            invoice_id: invoice.id,
            items: vec![ReturnLine {
                product_id: product,
                quantity: 4,
                unit_value: Decimal::from(10),
            }],
            reason: "wrong size".to_string(),
            return_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        })
        .await
        .unwrap();

        let stored_invoice = api.store().get_invoice(invoice.id).unwrap().record;
        assert_eq!(stored_invoice.paid_amount, Decimal::from(60));
        assert_eq!(stored_invoice.total_amount, Decimal::from(60));
        assert_eq!(stored_invoice.status, InvoiceStatus::Paid);
        assert_eq!(
            api.store().get_stock_item(product).unwrap().record.quantity,
            104
        );

        let stats = api.store().stats().unwrap();
        assert_eq!(stats.invoices, 1);
        assert_eq!(stats.purchase_orders, 1);
        assert_eq!(stats.sales_returns, 1);
        assert_eq!(stats.stock_items, 1);
    }
}
