//! Domain types and ports of the fee ledger.

pub mod attempt;
pub mod fee_schedule;
pub mod money;
pub mod payment;
pub mod ports;
pub mod signature;
