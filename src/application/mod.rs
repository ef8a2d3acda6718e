//! Application layer orchestrating fee payments.
//!
//! `OrderInitiator` wraps the gateway with a timeout, and `PaymentOrchestrator`
//! ties pricing, order opening, callback verification and ledger commits together.

pub mod order_initiator;
pub mod orchestrator;
