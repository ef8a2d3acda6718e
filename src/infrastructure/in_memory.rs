use crate::domain::payment::{
    CommitOutcome, LedgerKey, OrderId, PaymentRecord, PendingOrder, StudentId, TenantId,
};
use crate::domain::ports::{OrderBook, PaymentLedger};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    payments: HashMap<LedgerKey, PaymentRecord>,
    by_order: HashMap<OrderId, LedgerKey>,
}

/// A thread-safe in-memory payment ledger.
///
/// Uses `Arc<RwLock<..>>` to allow shared concurrent access. The conflict check
/// and the insert happen under the same write guard, so concurrent commits for
/// one key cannot both succeed.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryLedger {
    async fn try_commit(&self, record: PaymentRecord) -> Result<CommitOutcome> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        match state.payments.entry(record.key()) {
            Entry::Occupied(existing) => Ok(CommitOutcome::AlreadyPaid(existing.get().clone())),
            Entry::Vacant(slot) => {
                let key = slot.key().clone();
                slot.insert(record.clone());
                state.by_order.insert(record.order_id.clone(), key);
                Ok(CommitOutcome::Committed(record))
            }
        }
    }

    async fn list_for(&self, student: &StudentId, tenant: &TenantId) -> Result<Vec<PaymentRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<PaymentRecord> = state
            .payments
            .values()
            .filter(|r| &r.student == student && &r.tenant == tenant)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<PaymentRecord>> {
        let state = self.state.read().await;
        Ok(state
            .by_order
            .get(order_id)
            .and_then(|key| state.payments.get(key))
            .cloned())
    }
}

/// A thread-safe in-memory book of opened, unsettled orders.
#[derive(Default, Clone)]
pub struct InMemoryOrderBook {
    orders: Arc<RwLock<HashMap<OrderId, PendingOrder>>>,
}

impl InMemoryOrderBook {
    /// Creates a new, empty in-memory order book.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderBook for InMemoryOrderBook {
    async fn open(&self, order: PendingOrder) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<PendingOrder>> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).cloned())
    }

    async fn discard(&self, order_id: &OrderId) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.remove(order_id);
        Ok(())
    }
}
