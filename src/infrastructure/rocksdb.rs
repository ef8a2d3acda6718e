use crate::domain::payment::{
    CommitOutcome, LedgerKey, OrderId, PaymentRecord, PendingOrder, StudentId, TenantId,
};
use crate::domain::ports::{OrderBook, PaymentLedger};
use crate::error::{FeeError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for committed payments, keyed by `tenant\0student\0SEMESTER`.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping gateway order ids to payment keys.
pub const CF_PAYMENT_ORDERS: &str = "payment_orders";
/// Column Family for opened, unsettled orders.
pub const CF_PENDING_ORDERS: &str = "pending_orders";

/// A persistent ledger and order book using RocksDB.
///
/// Payments and their order index are written in one `WriteBatch`, so a record
/// is never visible without its index. Commits are serialized through
/// `commit_lock`; RocksDB's own file lock keeps other processes out, which makes
/// the check-then-write under the mutex an atomic insert-if-absent.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_PAYMENTS, CF_PAYMENT_ORDERS, CF_PENDING_ORDERS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| FeeError::LedgerUnavailable(format!("{} column family not found", name)))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| FeeError::Internal(format!("Serialization error: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| FeeError::LedgerUnavailable(format!("Deserialization error: {}", e)))
}

#[async_trait]
impl PaymentLedger for RocksDBStore {
    async fn try_commit(&self, record: PaymentRecord) -> Result<CommitOutcome> {
        let _guard = self.commit_lock.lock().await;
        let payments = self.cf(CF_PAYMENTS)?;
        let key = record.key().to_bytes();

        if let Some(bytes) = self.db.get_cf(payments, &key)? {
            return Ok(CommitOutcome::AlreadyPaid(decode(&bytes)?));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(payments, &key, encode(&record)?);
        batch.put_cf(
            self.cf(CF_PAYMENT_ORDERS)?,
            record.order_id.as_str().as_bytes(),
            &key,
        );
        self.db.write(batch)?;

        Ok(CommitOutcome::Committed(record))
    }

    async fn list_for(&self, student: &StudentId, tenant: &TenantId) -> Result<Vec<PaymentRecord>> {
        let payments = self.cf(CF_PAYMENTS)?;
        let prefix = LedgerKey::student_prefix(tenant, student);

        let mut records = Vec::new();
        let iter = self
            .db
            .iterator_cf(payments, IteratorMode::From(prefix.as_slice(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            records.push(decode::<PaymentRecord>(&value)?);
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<PaymentRecord>> {
        let index = self.cf(CF_PAYMENT_ORDERS)?;
        let Some(key) = self.db.get_cf(index, order_id.as_str().as_bytes())? else {
            return Ok(None);
        };
        match self.db.get_cf(self.cf(CF_PAYMENTS)?, &key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Err(FeeError::LedgerUnavailable(format!(
                "Order index for {} points at a missing payment",
                order_id
            ))),
        }
    }
}

#[async_trait]
impl OrderBook for RocksDBStore {
    async fn open(&self, order: PendingOrder) -> Result<()> {
        let cf = self.cf(CF_PENDING_ORDERS)?;
        self.db
            .put_cf(cf, order.order_id.as_str().as_bytes(), encode(&order)?)?;
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<PendingOrder>> {
        let cf = self.cf(CF_PENDING_ORDERS)?;
        match self.db.get_cf(cf, order_id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn discard(&self, order_id: &OrderId) -> Result<()> {
        let cf = self.cf(CF_PENDING_ORDERS)?;
        self.db.delete_cf(cf, order_id.as_str().as_bytes())?;
        Ok(())
    }
}
