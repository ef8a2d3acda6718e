#![allow(dead_code)]

use async_trait::async_trait;
use feeledger::application::order_initiator::OrderInitiator;
use feeledger::application::orchestrator::PaymentOrchestrator;
use feeledger::domain::fee_schedule::{FeeSchedule, FeeSchedules};
use feeledger::domain::money::{Amount, Currency};
use feeledger::domain::payment::{
    Caller, CommitOutcome, OrderId, PaymentId, PaymentRecord, StudentId, TenantId,
};
use feeledger::domain::ports::{
    GatewayOrder, Notifier, PaymentGateway, PaymentGatewayBox, PaymentLedger, PaymentLedgerBox,
};
use feeledger::domain::signature::SignatureVerifier;
use feeledger::error::{FeeError, Result};
use feeledger::infrastructure::in_memory::{InMemoryLedger, InMemoryOrderBook};
use feeledger::infrastructure::sandbox::SandboxGateway;
use secrecy::SecretString;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

pub const SECRET: &str = "integration_signing_secret";

pub fn verifier() -> SignatureVerifier {
    SignatureVerifier::new(SecretString::new(SECRET.to_string())).unwrap()
}

pub fn caller(student: &str) -> Caller {
    Caller::new(
        StudentId::new(student).unwrap(),
        TenantId::new("college-1").unwrap(),
    )
}

pub fn sign(order_id: &OrderId, payment_id: &str) -> String {
    verifier().sign(order_id, &PaymentId::new(payment_id).unwrap())
}

pub fn orchestrator_with(
    gateway: PaymentGatewayBox,
    ledger: PaymentLedgerBox,
) -> PaymentOrchestrator {
    orchestrator_over(gateway, ledger, InMemoryOrderBook::new())
}

/// Orchestrator whose order book the test keeps a handle to.
pub fn orchestrator_over(
    gateway: PaymentGatewayBox,
    ledger: PaymentLedgerBox,
    orders: InMemoryOrderBook,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(
        FeeSchedules::new(FeeSchedule::standard()),
        OrderInitiator::new(gateway, Duration::from_secs(1)),
        verifier(),
        ledger,
        Box::new(orders),
    )
}

pub fn orchestrator() -> PaymentOrchestrator {
    orchestrator_with(Box::new(SandboxGateway::new()), Box::new(InMemoryLedger::new()))
}

/// Sandbox gateway that counts how often it is called.
#[derive(Clone, Default)]
pub struct CountingGateway {
    pub calls: Arc<AtomicUsize>,
}

impl CountingGateway {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for CountingGateway {
    async fn create_order(&self, amount: Amount, currency: Currency) -> Result<GatewayOrder> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SandboxGateway::new().create_order(amount, currency).await
    }
}

/// Ledger whose writes always fail.
pub struct FailingLedger;

#[async_trait]
impl PaymentLedger for FailingLedger {
    async fn try_commit(&self, _record: PaymentRecord) -> Result<CommitOutcome> {
        Err(FeeError::LedgerUnavailable("disk on fire".to_string()))
    }

    async fn list_for(
        &self,
        _student: &StudentId,
        _tenant: &TenantId,
    ) -> Result<Vec<PaymentRecord>> {
        Ok(Vec::new())
    }

    async fn get(&self, _order_id: &OrderId) -> Result<Option<PaymentRecord>> {
        Ok(None)
    }
}

/// In-memory ledger that can be taken down and brought back.
#[derive(Clone, Default)]
pub struct FlakyLedger {
    inner: InMemoryLedger,
    down: Arc<AtomicBool>,
}

impl FlakyLedger {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(FeeError::LedgerUnavailable("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentLedger for FlakyLedger {
    async fn try_commit(&self, record: PaymentRecord) -> Result<CommitOutcome> {
        self.check()?;
        self.inner.try_commit(record).await
    }

    async fn list_for(
        &self,
        student: &StudentId,
        tenant: &TenantId,
    ) -> Result<Vec<PaymentRecord>> {
        self.check()?;
        self.inner.list_for(student, tenant).await
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<PaymentRecord>> {
        self.check()?;
        self.inner.get(order_id).await
    }
}

/// Forwards every notification into a channel.
pub struct ChannelNotifier {
    pub sender: mpsc::UnboundedSender<(String, String, String)>,
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        self.sender
            .send((recipient.to_string(), subject.to_string(), body.to_string()))
            .map_err(|e| FeeError::Internal(e.to_string()))
    }
}

/// Channel notifier that takes `delay` before each send.
pub struct DelayedNotifier {
    pub inner: ChannelNotifier,
    pub delay: Duration,
}

#[async_trait]
impl Notifier for DelayedNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.send(recipient, subject, body).await
    }
}
