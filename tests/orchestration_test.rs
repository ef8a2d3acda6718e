mod common;

use chrono::Utc;
use common::{
    ChannelNotifier, CountingGateway, DelayedNotifier, FailingLedger, FlakyLedger, caller,
    orchestrator, orchestrator_over, orchestrator_with, sign,
};
use feeledger::domain::fee_schedule::{Program, Semester};
use feeledger::domain::money::{Amount, Currency};
use feeledger::domain::payment::{OrderId, PendingOrder, RejectReason, SettleResult};
use feeledger::domain::ports::OrderBook;
use feeledger::error::FeeError;
use feeledger::infrastructure::in_memory::{InMemoryLedger, InMemoryOrderBook};
use feeledger::infrastructure::sandbox::SandboxGateway;
use rand::Rng;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_bca_third_semester_end_to_end() {
    let engine = orchestrator();
    let who = caller("student-42");

    let order = engine
        .initiate(&who, Program::Bca, Semester::Third)
        .await
        .unwrap();
    assert_eq!(order.amount.value(), dec!(45000));
    assert_eq!(order.amount.to_minor_units().unwrap(), 4_500_000);
    assert!(engine.history(&who).await.unwrap().is_empty());

    let signature = sign(&order.order_id, "pay_abc");
    let result = engine
        .settle(
            &who,
            Semester::Third,
            order.amount,
            order.order_id.as_str(),
            "pay_abc",
            &signature,
        )
        .await
        .unwrap();

    let SettleResult::Success(record) = &result else {
        panic!("expected success, got {:?}", result);
    };
    assert_eq!(record.semester, Semester::Third);
    assert_eq!(record.amount.value(), dec!(45000));
    assert_eq!(record.payment_id.as_str(), "pay_abc");
    assert!(result.confirmation().contains("pay_abc"));

    assert_eq!(engine.paid_semesters(&who).await.unwrap(), vec![Semester::Third]);
    assert_eq!(
        engine.lookup(&order.order_id).await.unwrap().as_ref(),
        Some(record)
    );
}

#[tokio::test]
async fn test_signature_for_other_order_is_rejected() {
    let engine = orchestrator();
    let who = caller("s1");
    let order = engine
        .initiate(&who, Program::Bba, Semester::First)
        .await
        .unwrap();
    let other = engine
        .initiate(&caller("s2"), Program::Bba, Semester::First)
        .await
        .unwrap();

    let signature = sign(&other.order_id, "pay_1");
    let result = engine
        .settle(
            &who,
            Semester::First,
            order.amount,
            order.order_id.as_str(),
            "pay_1",
            &signature,
        )
        .await
        .unwrap();

    assert_eq!(
        result,
        SettleResult::Rejected {
            reason: RejectReason::BadSignature
        }
    );
    assert_eq!(
        result.confirmation(),
        "Payment could not be completed. Please try again."
    );
    assert!(engine.history(&who).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_flipped_signature_bytes_are_rejected() {
    let engine = orchestrator();
    let who = caller("s1");
    let order = engine
        .initiate(&who, Program::Btech, Semester::Eighth)
        .await
        .unwrap();
    let signature = hex::decode(sign(&order.order_id, "pay_1")).unwrap();

    let mut rng = rand::thread_rng();
    for _ in 0..32 {
        let mut tampered = signature.clone();
        let index = rng.gen_range(0..tampered.len());
        let mask: u8 = rng.gen_range(1..=255);
        tampered[index] ^= mask;

        let result = engine
            .settle(
                &who,
                Semester::Eighth,
                order.amount,
                order.order_id.as_str(),
                "pay_1",
                &hex::encode(&tampered),
            )
            .await
            .unwrap();
        assert_eq!(
            result,
            SettleResult::Rejected {
                reason: RejectReason::BadSignature
            }
        );
    }
    assert!(engine.history(&who).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_callback() {
    let engine = orchestrator();
    let who = caller("s1");
    let order = engine
        .initiate(&who, Program::Bca, Semester::First)
        .await
        .unwrap();

    for (order_id, payment_id, signature) in [
        ("", "pay_1", "ab"),
        (order.order_id.as_str(), "", "ab"),
        (order.order_id.as_str(), "pay_1", ""),
        (order.order_id.as_str(), "pay_1", "not-hex"),
        (order.order_id.as_str(), "pay_1", "abcd"),
    ] {
        let result = engine
            .settle(&who, Semester::First, order.amount, order_id, payment_id, signature)
            .await;
        assert!(
            matches!(result, Err(FeeError::MalformedCallback(_))),
            "{:?} for ({}, {}, {})",
            result,
            order_id,
            payment_id,
            signature
        );
    }
}

#[tokio::test]
async fn test_settle_is_idempotent() {
    let engine = orchestrator();
    let who = caller("s1");
    let order = engine
        .initiate(&who, Program::Msc, Semester::Fifth)
        .await
        .unwrap();
    let signature = sign(&order.order_id, "pay_1");

    let mut results = Vec::new();
    for _ in 0..3 {
        results.push(
            engine
                .settle(
                    &who,
                    Semester::Fifth,
                    order.amount,
                    order.order_id.as_str(),
                    "pay_1",
                    &signature,
                )
                .await
                .unwrap(),
        );
    }

    let SettleResult::Success(record) = &results[0] else {
        panic!("expected success, got {:?}", results[0]);
    };
    assert_eq!(results[1], SettleResult::Duplicate(record.clone()));
    assert_eq!(results[2], SettleResult::Duplicate(record.clone()));
    assert_eq!(engine.history(&who).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_order_for_paid_semester_is_duplicate() {
    let engine = orchestrator();
    let who = caller("s1");
    let first = engine
        .initiate(&who, Program::Mca, Semester::Second)
        .await
        .unwrap();
    let second = engine
        .initiate(&who, Program::Mca, Semester::Second)
        .await
        .unwrap();

    let settled = engine
        .settle(
            &who,
            Semester::Second,
            first.amount,
            first.order_id.as_str(),
            "pay_1",
            &sign(&first.order_id, "pay_1"),
        )
        .await
        .unwrap();
    let late = engine
        .settle(
            &who,
            Semester::Second,
            second.amount,
            second.order_id.as_str(),
            "pay_2",
            &sign(&second.order_id, "pay_2"),
        )
        .await
        .unwrap();

    let SettleResult::Success(record) = settled else {
        panic!("expected success, got {:?}", settled);
    };
    assert_eq!(late, SettleResult::Duplicate(record));
    assert_eq!(engine.history(&who).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_already_paid_semester_never_reaches_gateway() {
    let gateway = CountingGateway::default();
    let engine = orchestrator_with(Box::new(gateway.clone()), Box::new(InMemoryLedger::new()));
    let who = caller("s1");

    let order = engine
        .initiate(&who, Program::Bsc, Semester::Fourth)
        .await
        .unwrap();
    engine
        .settle(
            &who,
            Semester::Fourth,
            order.amount,
            order.order_id.as_str(),
            "pay_1",
            &sign(&order.order_id, "pay_1"),
        )
        .await
        .unwrap();
    assert_eq!(gateway.calls(), 1);

    let result = engine.initiate(&who, Program::Bsc, Semester::Fourth).await;
    assert!(matches!(
        result,
        Err(FeeError::AlreadySatisfied(Semester::Fourth))
    ));
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn test_invalid_semester_never_reaches_gateway() {
    let gateway = CountingGateway::default();
    let engine = orchestrator_with(Box::new(gateway.clone()), Box::new(InMemoryLedger::new()));

    let result = engine
        .initiate(&caller("s1"), Program::Mtech, Semester::Sixth)
        .await;
    assert!(matches!(result, Err(FeeError::InvalidSemester { .. })));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_order_never_opened_is_unknown() {
    let engine = orchestrator();
    let who = caller("s1");
    let forged = OrderId::new("order_forged").unwrap();

    let result = engine
        .settle(
            &who,
            Semester::First,
            Amount::new(dec!(45000)).unwrap(),
            forged.as_str(),
            "pay_1",
            &sign(&forged, "pay_1"),
        )
        .await;
    assert!(matches!(result, Err(FeeError::UnknownOrder(_))));
}

#[tokio::test]
async fn test_callback_for_other_semester_is_mismatch() {
    let engine = orchestrator();
    let who = caller("s1");
    let order = engine
        .initiate(&who, Program::Bca, Semester::First)
        .await
        .unwrap();

    let result = engine
        .settle(
            &who,
            Semester::Second,
            order.amount,
            order.order_id.as_str(),
            "pay_1",
            &sign(&order.order_id, "pay_1"),
        )
        .await
        .unwrap();
    assert_eq!(
        result,
        SettleResult::Rejected {
            reason: RejectReason::OrderMismatch
        }
    );
    assert!(engine.paid_semesters(&who).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ledger_failure_is_surfaced() {
    let engine = orchestrator_with(Box::new(SandboxGateway::new()), Box::new(FailingLedger));
    let who = caller("s1");
    let order = engine
        .initiate(&who, Program::Bca, Semester::First)
        .await
        .unwrap();

    let result = engine
        .settle(
            &who,
            Semester::First,
            order.amount,
            order.order_id.as_str(),
            "pay_1",
            &sign(&order.order_id, "pay_1"),
        )
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, FeeError::LedgerUnavailable(_)));
    assert!(err.is_unknown_outcome());
}

#[tokio::test]
async fn test_settle_retry_after_ledger_outage() {
    let ledger = FlakyLedger::default();
    let engine = orchestrator_with(Box::new(SandboxGateway::new()), Box::new(ledger.clone()));
    let who = caller("s1");
    let order = engine
        .initiate(&who, Program::Bca, Semester::Fourth)
        .await
        .unwrap();
    let signature = sign(&order.order_id, "pay_1");

    ledger.set_down(true);
    let result = engine
        .settle(
            &who,
            Semester::Fourth,
            order.amount,
            order.order_id.as_str(),
            "pay_1",
            &signature,
        )
        .await;
    assert!(matches!(result, Err(FeeError::LedgerUnavailable(_))));

    ledger.set_down(false);
    assert!(engine.lookup(&order.order_id).await.unwrap().is_none());

    let retried = engine
        .settle(
            &who,
            Semester::Fourth,
            order.amount,
            order.order_id.as_str(),
            "pay_1",
            &signature,
        )
        .await
        .unwrap();
    let SettleResult::Success(record) = &retried else {
        panic!("expected success, got {:?}", retried);
    };
    assert_eq!(record.order_id, order.order_id);
    assert_eq!(
        engine.lookup(&order.order_id).await.unwrap().as_ref(),
        Some(record)
    );
}

#[tokio::test]
async fn test_opened_amount_off_schedule_is_mismatch() {
    let orders = InMemoryOrderBook::new();
    let engine = orchestrator_over(
        Box::new(SandboxGateway::new()),
        Box::new(InMemoryLedger::new()),
        orders.clone(),
    );
    let who = caller("s1");
    let stale = Amount::new(dec!(40000)).unwrap();
    let order_id = OrderId::new("order_stale").unwrap();
    orders
        .open(PendingOrder {
            order_id: order_id.clone(),
            student: who.student.clone(),
            tenant: who.tenant.clone(),
            program: Program::Bca,
            semester: Semester::First,
            amount: stale,
            currency: Currency::Inr,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let result = engine
        .settle(
            &who,
            Semester::First,
            stale,
            order_id.as_str(),
            "pay_1",
            &sign(&order_id, "pay_1"),
        )
        .await
        .unwrap();
    assert_eq!(
        result,
        SettleResult::Rejected {
            reason: RejectReason::OrderMismatch
        }
    );
    assert!(engine.history(&who).await.unwrap().is_empty());
    assert!(engine.lookup(&order_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_notification_sent_once_on_commit() {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let engine = orchestrator().with_notifier(Arc::new(ChannelNotifier { sender }));
    let who = caller("s1").with_email("s1@example.edu");
    let order = engine
        .initiate(&who, Program::Bca, Semester::Second)
        .await
        .unwrap();
    let signature = sign(&order.order_id, "pay_77");

    for _ in 0..2 {
        engine
            .settle(
                &who,
                Semester::Second,
                order.amount,
                order.order_id.as_str(),
                "pay_77",
                &signature,
            )
            .await
            .unwrap();
    }

    let (recipient, subject, body) = tokio::time::timeout(Duration::from_secs(1), receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recipient, "s1@example.edu");
    assert_eq!(subject, "Fee Payment Successful");
    assert!(body.contains("SECOND"));
    assert!(body.contains("pay_77"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_flush_waits_for_slow_notification() {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let notifier = DelayedNotifier {
        inner: ChannelNotifier { sender },
        delay: Duration::from_millis(200),
    };
    let engine = orchestrator().with_notifier(Arc::new(notifier));
    let who = caller("s1").with_email("s1@example.edu");
    let order = engine
        .initiate(&who, Program::Bsc, Semester::Sixth)
        .await
        .unwrap();
    engine
        .settle(
            &who,
            Semester::Sixth,
            order.amount,
            order.order_id.as_str(),
            "pay_9",
            &sign(&order.order_id, "pay_9"),
        )
        .await
        .unwrap();

    assert!(!engine.flush_notifications(Duration::from_millis(10)).await);
    assert!(receiver.try_recv().is_err());

    assert!(engine.flush_notifications(Duration::from_secs(2)).await);
    let (recipient, _, body) = receiver.try_recv().unwrap();
    assert_eq!(recipient, "s1@example.edu");
    assert!(body.contains("pay_9"));
    assert!(engine.flush_notifications(Duration::from_millis(10)).await);
}

#[tokio::test]
async fn test_no_notification_without_email() {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let engine = orchestrator().with_notifier(Arc::new(ChannelNotifier { sender }));
    let who = caller("s1");
    let order = engine
        .initiate(&who, Program::Bca, Semester::First)
        .await
        .unwrap();
    engine
        .settle(
            &who,
            Semester::First,
            order.amount,
            order.order_id.as_str(),
            "pay_1",
            &sign(&order.order_id, "pay_1"),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_outstanding_semesters_shrink_as_paid() {
    let engine = orchestrator();
    let who = caller("s1");

    for semester in [Semester::First, Semester::Third] {
        let order = engine.initiate(&who, Program::Mtech, semester).await.unwrap();
        engine
            .settle(
                &who,
                semester,
                order.amount,
                order.order_id.as_str(),
                "pay_x",
                &sign(&order.order_id, "pay_x"),
            )
            .await
            .unwrap();
    }

    assert_eq!(
        engine
            .outstanding_semesters(&who, Program::Mtech)
            .await
            .unwrap(),
        vec![Semester::Second, Semester::Fourth]
    );
    let history = engine.history(&who).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].created_at >= history[1].created_at);
}
