use super::fee_schedule::{Program, Semester};
use super::money::{Amount, Currency};
use crate::error::{FeeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Rejects empty identifiers and identifiers containing control characters.
            pub fn new(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(FeeError::Validation(format!("{} must not be empty", $what)));
                }
                if value.chars().any(char::is_control) {
                    return Err(FeeError::Validation(format!(
                        "{} contains control characters",
                        $what
                    )));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = FeeError;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Student identifier issued by the identity provider.
    StudentId,
    "Student id"
);
string_id!(
    /// Institution a student and their payments belong to.
    TenantId,
    "Tenant"
);
string_id!(
    /// Opaque order identifier issued by the payment gateway.
    OrderId,
    "Order id"
);
string_id!(
    /// Payment identifier reported by the gateway callback.
    PaymentId,
    "Payment id"
);

/// The authenticated caller, as supplied by the identity/session provider.
///
/// Never derived from a gateway callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub student: StudentId,
    pub tenant: TenantId,
    /// Where payment confirmations go. `None` skips notification.
    pub email: Option<String>,
}

impl Caller {
    pub fn new(student: StudentId, tenant: TenantId) -> Self {
        Self {
            student,
            tenant,
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// A gateway reservation, handed back to the client to complete checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub order_id: OrderId,
    pub amount: Amount,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

/// An opened order remembered locally until it settles or is discarded.
///
/// Lets `settle` prove that an order id was issued by this system and re-derive
/// what it was for, instead of trusting the callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: OrderId,
    pub student: StudentId,
    pub tenant: TenantId,
    pub program: Program,
    pub semester: Semester,
    pub amount: Amount,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl PendingOrder {
    pub fn belongs_to(&self, caller: &Caller) -> bool {
        self.student == caller.student && self.tenant == caller.tenant
    }
}

/// Uniqueness key of the ledger: one payment per student, tenant and semester.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
    pub tenant: TenantId,
    pub student: StudentId,
    pub semester: Semester,
}

impl LedgerKey {
    /// Prefix shared by every key of one student, see [`LedgerKey::to_bytes`].
    pub fn student_prefix(tenant: &TenantId, student: &StudentId) -> Vec<u8> {
        let mut key = Vec::with_capacity(tenant.as_str().len() + student.as_str().len() + 2);
        key.extend_from_slice(tenant.as_str().as_bytes());
        key.push(0);
        key.extend_from_slice(student.as_str().as_bytes());
        key.push(0);
        key
    }

    /// `tenant \0 student \0 SEMESTER`; ids cannot contain NUL so the encoding is unambiguous.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut key = Self::student_prefix(&self.tenant, &self.student);
        key.extend_from_slice(self.semester.label().as_bytes());
        key
    }
}

/// A completed, verified payment. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub student: StudentId,
    pub tenant: TenantId,
    pub semester: Semester,
    pub amount: Amount,
    pub currency: Currency,
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub signature: String,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn key(&self) -> LedgerKey {
        LedgerKey {
            tenant: self.tenant.clone(),
            student: self.student.clone(),
            semester: self.semester,
        }
    }
}

/// The untrusted (order id, payment id, signature) triple from a gateway callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationInput {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub signature: String,
}

impl VerificationInput {
    /// Structural validation only; authenticity is checked by the signature verifier.
    pub fn parse(order_id: &str, payment_id: &str, signature: &str) -> Result<Self> {
        let malformed = |e: FeeError| FeeError::MalformedCallback(e.to_string());
        let signature = signature.trim();
        if signature.is_empty() {
            return Err(FeeError::MalformedCallback(
                "Signature must not be empty".to_string(),
            ));
        }
        Ok(Self {
            order_id: OrderId::new(order_id).map_err(malformed)?,
            payment_id: PaymentId::new(payment_id).map_err(malformed)?,
            signature: signature.to_string(),
        })
    }
}

/// Result of the ledger's atomic insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(PaymentRecord),
    AlreadyPaid(PaymentRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BadSignature,
    OrderMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::BadSignature => f.write_str("bad signature"),
            RejectReason::OrderMismatch => f.write_str("order mismatch"),
        }
    }
}

/// Terminal outcome of a settlement.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleResult {
    Success(PaymentRecord),
    Duplicate(PaymentRecord),
    Rejected { reason: RejectReason },
}

impl SettleResult {
    pub fn record(&self) -> Option<&PaymentRecord> {
        match self {
            SettleResult::Success(record) | SettleResult::Duplicate(record) => Some(record),
            SettleResult::Rejected { .. } => None,
        }
    }

    /// Message suitable for the end user.
    ///
    /// Rejections share a single message whatever the reason.
    pub fn confirmation(&self) -> String {
        match self {
            SettleResult::Success(record) => format!(
                "Fee for {} semester has been paid. Payment Id: {}",
                record.semester, record.payment_id
            ),
            SettleResult::Duplicate(record) => format!(
                "Fee for {} semester was already paid. Payment Id: {}",
                record.semester, record.payment_id
            ),
            SettleResult::Rejected { .. } => {
                "Payment could not be completed. Please try again.".to_string()
            }
        }
    }
}
