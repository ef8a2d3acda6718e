use super::money::{Amount, Currency};
use super::payment::{CommitOutcome, OrderId, PaymentRecord, PendingOrder, StudentId, TenantId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Order as acknowledged by the external gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOrder {
    pub order_id: OrderId,
    pub amount: Amount,
    pub currency: Currency,
}

/// External payment gateway reserving orders.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `GatewayUnavailable` on transport or 5xx failures, `GatewayRejected` otherwise.
    async fn create_order(&self, amount: Amount, currency: Currency) -> Result<GatewayOrder>;
}

/// System of record for completed payments.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Atomically inserts the record unless one already exists for its
    /// (tenant, student, semester) key, in which case the existing record is returned.
    async fn try_commit(&self, record: PaymentRecord) -> Result<CommitOutcome>;
    /// A student's payments, newest first.
    async fn list_for(&self, student: &StudentId, tenant: &TenantId) -> Result<Vec<PaymentRecord>>;
    async fn get(&self, order_id: &OrderId) -> Result<Option<PaymentRecord>>;
}

/// Orders opened by this system and not yet settled.
#[async_trait]
pub trait OrderBook: Send + Sync {
    async fn open(&self, order: PendingOrder) -> Result<()>;
    async fn get(&self, order_id: &OrderId) -> Result<Option<PendingOrder>>;
    async fn discard(&self, order_id: &OrderId) -> Result<()>;
}

/// Fire-and-forget notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
pub type PaymentLedgerBox = Box<dyn PaymentLedger>;
pub type OrderBookBox = Box<dyn OrderBook>;
pub type NotifierRef = Arc<dyn Notifier>;
