use super::order_initiator::OrderInitiator;
use crate::domain::attempt::{Attempt, AttemptState};
use crate::domain::fee_schedule::{FeeSchedules, Program, Semester};
use crate::domain::money::Amount;
use crate::domain::payment::{
    Caller, CommitOutcome, OrderId, PaymentOrder, PaymentRecord, PendingOrder, RejectReason,
    SettleResult, VerificationInput,
};
use crate::domain::ports::{NotifierRef, OrderBookBox, PaymentLedgerBox};
use crate::domain::signature::SignatureVerifier;
use crate::error::{FeeError, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

const NOTIFICATION_SUBJECT: &str = "Fee Payment Successful";

/// Entry point for paying semester fees.
///
/// `PaymentOrchestrator` prices a semester, opens a gateway order for it and,
/// once the gateway calls back, authenticates the callback and commits the
/// payment to the ledger. It holds no per-attempt state; everything shared
/// between attempts lives behind the ledger and order book ports.
pub struct PaymentOrchestrator {
    schedules: FeeSchedules,
    initiator: OrderInitiator,
    verifier: SignatureVerifier,
    ledger: PaymentLedgerBox,
    orders: OrderBookBox,
    notifier: Option<NotifierRef>,
    notifications: Mutex<JoinSet<()>>,
}

impl PaymentOrchestrator {
    pub fn new(
        schedules: FeeSchedules,
        initiator: OrderInitiator,
        verifier: SignatureVerifier,
        ledger: PaymentLedgerBox,
        orders: OrderBookBox,
    ) -> Self {
        Self {
            schedules,
            initiator,
            verifier,
            ledger,
            orders,
            notifier: None,
            notifications: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: NotifierRef) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Opens a gateway order for one semester's fee.
    ///
    /// Nothing is written to the ledger. Fails with `AlreadySatisfied` before
    /// the gateway is contacted if the semester is already paid.
    #[tracing::instrument(
        skip(self, caller),
        fields(student = %caller.student, tenant = %caller.tenant)
    )]
    pub async fn initiate(
        &self,
        caller: &Caller,
        program: Program,
        semester: Semester,
    ) -> Result<PaymentOrder> {
        let mut attempt = Attempt::requested();
        let schedule = self.schedules.for_tenant(&caller.tenant);
        let amount = schedule.amount_for(program, semester)?;

        if self.paid_semesters(caller).await?.contains(&semester) {
            tracing::info!("Semester already paid, no order opened");
            return Err(FeeError::AlreadySatisfied(semester));
        }

        let order = match self.initiator.open(amount, schedule.currency()).await {
            Ok(order) => order,
            Err(e) => {
                attempt.advance(AttemptState::Rejected)?;
                tracing::warn!(error = %e, "Could not open order");
                return Err(e);
            }
        };
        attempt.advance(AttemptState::OrderOpened)?;

        self.orders
            .open(PendingOrder {
                order_id: order.order_id.clone(),
                student: caller.student.clone(),
                tenant: caller.tenant.clone(),
                program,
                semester,
                amount: order.amount,
                currency: order.currency,
                created_at: order.created_at,
            })
            .await?;

        Ok(order)
    }

    /// Settles a gateway callback.
    ///
    /// Always ends in `Success`, `Duplicate` or `Rejected` unless the callback is
    /// malformed, names an order this system never opened for the caller, or the
    /// ledger fails. On `LedgerUnavailable` the outcome is unknown; resolve it
    /// with [`PaymentOrchestrator::lookup`] before telling the user anything.
    #[tracing::instrument(
        skip(self, caller, amount, signature),
        fields(student = %caller.student, tenant = %caller.tenant)
    )]
    pub async fn settle(
        &self,
        caller: &Caller,
        semester: Semester,
        amount: Amount,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<SettleResult> {
        let mut attempt = Attempt::opened();
        let input = VerificationInput::parse(order_id, payment_id, signature)?;

        attempt.advance(AttemptState::Verifying)?;
        if !self.verifier.verify_input(&input)? {
            attempt.advance(AttemptState::Rejected)?;
            tracing::warn!(order_id = %input.order_id, "Callback signature mismatch");
            return Ok(SettleResult::Rejected {
                reason: RejectReason::BadSignature,
            });
        }

        let pending = match self.orders.get(&input.order_id).await? {
            Some(pending) if pending.belongs_to(caller) => pending,
            Some(_) => {
                attempt.advance(AttemptState::Rejected)?;
                tracing::warn!(order_id = %input.order_id, "Order belongs to another student");
                return Err(FeeError::UnknownOrder(input.order_id.to_string()));
            }
            None => return self.redelivered(caller, &input, &mut attempt).await,
        };

        if !self.order_matches(&pending, semester, amount)? {
            attempt.advance(AttemptState::Rejected)?;
            return Ok(SettleResult::Rejected {
                reason: RejectReason::OrderMismatch,
            });
        }

        let record = PaymentRecord {
            student: pending.student.clone(),
            tenant: pending.tenant.clone(),
            semester: pending.semester,
            amount: pending.amount,
            currency: pending.currency,
            order_id: input.order_id.clone(),
            payment_id: input.payment_id.clone(),
            signature: input.signature.to_ascii_lowercase(),
            created_at: Utc::now(),
        };

        let outcome = match self.ledger.try_commit(record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    order_id = %input.order_id,
                    error = %e,
                    "Ledger write failed, settlement outcome unknown"
                );
                return Err(e);
            }
        };

        self.discard_pending(&input.order_id).await;

        match outcome {
            CommitOutcome::Committed(record) => {
                attempt.advance(AttemptState::Committed)?;
                tracing::info!(
                    order_id = %record.order_id,
                    payment_id = %record.payment_id,
                    semester = %record.semester,
                    "Payment committed"
                );
                self.notify(caller, &record).await;
                Ok(SettleResult::Success(record))
            }
            CommitOutcome::AlreadyPaid(existing) => {
                attempt.advance(AttemptState::AlreadyPaid)?;
                tracing::info!(
                    order_id = %input.order_id,
                    existing_order_id = %existing.order_id,
                    "Semester already paid"
                );
                Ok(SettleResult::Duplicate(existing))
            }
        }
    }

    /// Handles a verified callback whose pending order is gone: either the
    /// gateway redelivered a settled callback, or the order was never ours.
    async fn redelivered(
        &self,
        caller: &Caller,
        input: &VerificationInput,
        attempt: &mut Attempt,
    ) -> Result<SettleResult> {
        match self.ledger.get(&input.order_id).await? {
            Some(record) if record.student == caller.student && record.tenant == caller.tenant => {
                attempt.advance(AttemptState::AlreadyPaid)?;
                tracing::info!(
                    order_id = %input.order_id,
                    "Callback redelivered for settled order"
                );
                Ok(SettleResult::Duplicate(record))
            }
            _ => {
                attempt.advance(AttemptState::Rejected)?;
                tracing::warn!(order_id = %input.order_id, "Callback for unknown order");
                Err(FeeError::UnknownOrder(input.order_id.to_string()))
            }
        }
    }

    /// The callback must describe the order as it was opened, and the opened
    /// amount must still be what the fee schedule charges.
    fn order_matches(
        &self,
        pending: &PendingOrder,
        semester: Semester,
        amount: Amount,
    ) -> Result<bool> {
        if pending.semester != semester || pending.amount != amount {
            tracing::warn!(
                order_id = %pending.order_id,
                opened_semester = %pending.semester,
                callback_semester = %semester,
                "Callback does not match opened order"
            );
            return Ok(false);
        }

        let expected = self
            .schedules
            .for_tenant(&pending.tenant)
            .amount_for(pending.program, pending.semester)?;
        if expected != pending.amount {
            tracing::error!(
                order_id = %pending.order_id,
                opened = %pending.amount,
                expected = %expected,
                "Opened amount no longer matches the fee schedule, needs reconciliation"
            );
            return Ok(false);
        }
        Ok(true)
    }

    async fn discard_pending(&self, order_id: &OrderId) {
        if let Err(e) = self.orders.discard(order_id).await {
            tracing::warn!(order_id = %order_id, error = %e, "Could not discard pending order");
        }
    }

    async fn notify(&self, caller: &Caller, record: &PaymentRecord) {
        let (Some(notifier), Some(recipient)) = (self.notifier.clone(), caller.email.clone())
        else {
            return;
        };
        let body = format!(
            "Fee for {} semester has been paid. Payment Id: {}",
            record.semester, record.payment_id
        );
        let order_id = record.order_id.clone();
        let mut notifications = self.notifications.lock().await;
        while notifications.try_join_next().is_some() {}
        notifications.spawn(async move {
            if let Err(e) = notifier.send(&recipient, NOTIFICATION_SUBJECT, &body).await {
                tracing::warn!(order_id = %order_id, error = %e, "Payment notification failed");
            }
        });
    }

    /// Waits up to `limit` for spawned notifications to finish. Returns
    /// `false` if some were still running when the limit passed.
    pub async fn flush_notifications(&self, limit: Duration) -> bool {
        let mut notifications = self.notifications.lock().await;
        let drained = tokio::time::timeout(limit, async {
            while notifications.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            tracing::warn!(
                in_flight = notifications.len(),
                "Payment notifications still running"
            );
        }
        drained
    }

    /// The caller's payments, newest first.
    pub async fn history(&self, caller: &Caller) -> Result<Vec<PaymentRecord>> {
        self.ledger.list_for(&caller.student, &caller.tenant).await
    }

    pub async fn paid_semesters(&self, caller: &Caller) -> Result<Vec<Semester>> {
        Ok(self
            .history(caller)
            .await?
            .into_iter()
            .map(|record| record.semester)
            .collect())
    }

    /// Semesters of the programme still to be paid, in sequence order.
    pub async fn outstanding_semesters(
        &self,
        caller: &Caller,
        program: Program,
    ) -> Result<Vec<Semester>> {
        let paid = self.paid_semesters(caller).await?;
        Ok(self
            .schedules
            .for_tenant(&caller.tenant)
            .valid_semesters(program)
            .iter()
            .copied()
            .filter(|semester| !paid.contains(semester))
            .collect())
    }

    /// Looks a payment up by gateway order id.
    pub async fn lookup(&self, order_id: &OrderId) -> Result<Option<PaymentRecord>> {
        self.ledger.get(order_id).await
    }

    pub fn schedules(&self) -> &FeeSchedules {
        &self.schedules
    }
}
