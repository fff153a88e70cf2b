//! Entity store over RocksDB
//!
//! # Column Families
//!
//! - `invoices` - Customer invoices (key: invoice id)
//! - `stock_items` - Finished goods and raw materials (key: item id)
//! - `purchase_orders` - Supplier purchase orders (key: order id)
//! - `sales_returns` - Append-only return records (key: return id)
//!
//! Every stored record carries a version number. A [`Batch`] stages
//! writes with the version observed at read time; [`EntityStore::commit`]
//! re-checks those versions under a commit lock and applies the whole
//! batch as one RocksDB `WriteBatch`, or fails it entirely with
//! [`Error::CommitConflict`]. Readers never observe a partial batch.

use crate::{
    error::{Error, Result},
    types::{Invoice, PurchaseOrder, SalesReturn, StockItem},
    Config,
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_INVOICES: &str = "invoices";
const CF_STOCK_ITEMS: &str = "stock_items";
const CF_PURCHASE_ORDERS: &str = "purchase_orders";
const CF_SALES_RETURNS: &str = "sales_returns";

/// A stored record together with its version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Monotonic per-record version, starts at 1
    pub version: u64,
    /// The record itself
    pub record: T,
}

/// One staged write inside a [`Batch`]
#[derive(Debug, Clone)]
enum StagedOp {
    /// Create an append-only return record; fails the batch if the key exists
    CreateSalesReturn(SalesReturn),
    /// Replace an invoice, guarded by the version read before the rule ran
    UpdateInvoice { expected_version: u64, invoice: Invoice },
    /// Replace a stock item, guarded by its read version
    UpdateStockItem { expected_version: u64, item: StockItem },
    /// Replace a purchase order, guarded by its read version
    UpdatePurchaseOrder {
        expected_version: u64,
        order: PurchaseOrder,
    },
}

/// Staged multi-entity write, committed all-or-nothing
#[derive(Debug, Default)]
pub struct Batch {
    ops: Vec<StagedOp>,
}

impl Batch {
    /// Stage creation of a sales return record
    pub fn create_sales_return(&mut self, record: SalesReturn) {
        self.ops.push(StagedOp::CreateSalesReturn(record));
    }

    /// Stage an invoice update guarded by `expected_version`
    pub fn update_invoice(&mut self, expected_version: u64, invoice: Invoice) {
        self.ops.push(StagedOp::UpdateInvoice {
            expected_version,
            invoice,
        });
    }

    /// Stage a stock item update guarded by `expected_version`
    pub fn update_stock_item(&mut self, expected_version: u64, item: StockItem) {
        self.ops.push(StagedOp::UpdateStockItem {
            expected_version,
            item,
        });
    }

    /// Stage a purchase order update guarded by `expected_version`
    pub fn update_purchase_order(&mut self, expected_version: u64, order: PurchaseOrder) {
        self.ops.push(StagedOp::UpdatePurchaseOrder {
            expected_version,
            order,
        });
    }

    /// Number of staged operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Storage wrapper for RocksDB
pub struct EntityStore {
    db: Arc<DB>,

    /// Serializes version checks against batch commits. Point writes take
    /// it too, so a direct `put_*` cannot slip between a commit's check
    /// and its write.
    commit_lock: Mutex<()>,
}

impl EntityStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_INVOICES, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_STOCK_ITEMS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_PURCHASE_ORDERS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_SALES_RETURNS, Self::cf_options_append_only()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened entity store");

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Mutex::new(()),
        })
    }

    // Column family options

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Mutable state is frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_append_only() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::StoreUnavailable(format!("Column family {} not found", name)))
    }

    // Raw versioned access

    fn get_raw<T: DeserializeOwned>(&self, cf_name: &str, id: Uuid) -> Result<Option<Versioned<T>>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn current_version(&self, cf_name: &str, id: Uuid) -> Result<Option<u64>> {
        // Versioned<T> serializes the version first, so the record payload
        // can be skipped when only the version is needed
        #[derive(Deserialize)]
        struct VersionOnly {
            version: u64,
        }

        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => {
                let v: VersionOnly = bincode::deserialize(&bytes)?;
                Ok(Some(v.version))
            }
            None => Ok(None),
        }
    }

    fn put_versioned<T: Serialize + DeserializeOwned>(
        &self,
        cf_name: &str,
        id: Uuid,
        record: &T,
    ) -> Result<u64> {
        let _guard = self.commit_lock.lock();
        let version = self.current_version(cf_name, id)?.unwrap_or(0) + 1;
        let value = bincode::serialize(&Versioned {
            version,
            record,
        })?;
        let cf = self.cf_handle(cf_name)?;
        self.db.put_cf(cf, id.as_bytes(), &value)?;
        Ok(version)
    }

    // Typed point reads

    /// Get invoice by ID
    pub fn get_invoice(&self, id: Uuid) -> Result<Versioned<Invoice>> {
        self.get_raw(CF_INVOICES, id)?
            .ok_or_else(|| Error::InvoiceNotFound(id.to_string()))
    }

    /// Get stock item by ID
    pub fn get_stock_item(&self, id: Uuid) -> Result<Versioned<StockItem>> {
        self.get_raw(CF_STOCK_ITEMS, id)?
            .ok_or_else(|| Error::StockItemNotFound(id.to_string()))
    }

    /// Get purchase order by ID
    pub fn get_purchase_order(&self, id: Uuid) -> Result<Versioned<PurchaseOrder>> {
        self.get_raw(CF_PURCHASE_ORDERS, id)?
            .ok_or_else(|| Error::PurchaseOrderNotFound(id.to_string()))
    }

    /// Get sales return by ID
    pub fn get_sales_return(&self, id: Uuid) -> Result<Versioned<SalesReturn>> {
        self.get_raw(CF_SALES_RETURNS, id)?
            .ok_or_else(|| Error::SalesReturnNotFound(id.to_string()))
    }

    // Typed point writes (upserts)
    //
    // These serve the out-of-scope creation flows ("create sale",
    // "create PO") and tests. Mutations that belong to a ledger event
    // must go through a batch instead, or the cross-entity invariants
    // are lost.

    /// Upsert invoice, immediately visible to subsequent reads
    pub fn put_invoice(&self, invoice: &Invoice) -> Result<u64> {
        self.put_versioned(CF_INVOICES, invoice.id, invoice)
    }

    /// Upsert stock item
    pub fn put_stock_item(&self, item: &StockItem) -> Result<u64> {
        self.put_versioned(CF_STOCK_ITEMS, item.id, item)
    }

    /// Upsert purchase order
    pub fn put_purchase_order(&self, order: &PurchaseOrder) -> Result<u64> {
        self.put_versioned(CF_PURCHASE_ORDERS, order.id, order)
    }

    // Batch operations (atomic)

    /// Start staging a multi-entity write
    pub fn batch(&self) -> Batch {
        Batch::default()
    }

    /// Commit a staged batch as a single all-or-nothing unit.
    ///
    /// Re-reads every target under the commit lock and compares versions;
    /// any mismatch (or an existing key for a create) fails the whole
    /// batch with [`Error::CommitConflict`] before anything is written.
    pub fn commit(&self, batch: Batch) -> Result<()> {
        let _guard = self.commit_lock.lock();

        let mut wb = WriteBatch::default();

        for op in &batch.ops {
            match op {
                StagedOp::CreateSalesReturn(record) => {
                    if self.current_version(CF_SALES_RETURNS, record.id)?.is_some() {
                        return Err(Error::CommitConflict(format!(
                            "sales_returns/{} already exists",
                            record.id
                        )));
                    }
                    self.stage_put(&mut wb, CF_SALES_RETURNS, record.id, 1, record)?;
                }
                StagedOp::UpdateInvoice {
                    expected_version,
                    invoice,
                } => {
                    self.check_version(CF_INVOICES, invoice.id, *expected_version)?;
                    self.stage_put(&mut wb, CF_INVOICES, invoice.id, expected_version + 1, invoice)?;
                }
                StagedOp::UpdateStockItem {
                    expected_version,
                    item,
                } => {
                    self.check_version(CF_STOCK_ITEMS, item.id, *expected_version)?;
                    self.stage_put(&mut wb, CF_STOCK_ITEMS, item.id, expected_version + 1, item)?;
                }
                StagedOp::UpdatePurchaseOrder {
                    expected_version,
                    order,
                } => {
                    self.check_version(CF_PURCHASE_ORDERS, order.id, *expected_version)?;
                    self.stage_put(&mut wb, CF_PURCHASE_ORDERS, order.id, expected_version + 1, order)?;
                }
            }
        }

        self.db.write(wb)?;

        tracing::debug!(ops = batch.ops.len(), "Batch committed");

        Ok(())
    }

    fn check_version(&self, cf_name: &str, id: Uuid, expected: u64) -> Result<()> {
        let found = self.current_version(cf_name, id)?.unwrap_or(0);
        if found != expected {
            return Err(Error::CommitConflict(format!(
                "{}/{}: expected version {}, found {}",
                cf_name, id, expected, found
            )));
        }
        Ok(())
    }

    fn stage_put<T: Serialize>(
        &self,
        wb: &mut WriteBatch,
        cf_name: &str,
        id: Uuid,
        version: u64,
        record: &T,
    ) -> Result<()> {
        let value = bincode::serialize(&Versioned { version, record })?;
        wb.put_cf(self.cf_handle(cf_name)?, id.as_bytes(), &value);
        Ok(())
    }

    // Statistics

    /// Count of records per collection (exact, full scan)
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            invoices: self.count(CF_INVOICES)?,
            stock_items: self.count(CF_STOCK_ITEMS)?,
            purchase_orders: self.count(CF_PURCHASE_ORDERS)?,
            sales_returns: self.count(CF_SALES_RETURNS)?,
        })
    }

    fn count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let mut n = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            n += 1;
        }
        Ok(n)
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore").finish_non_exhaustive()
    }
}

/// Record counts per collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Invoices stored
    pub invoices: u64,
    /// Stock items stored
    pub stock_items: u64,
    /// Purchase orders stored
    pub purchase_orders: u64,
    /// Sales returns stored
    pub sales_returns: u64,
}
