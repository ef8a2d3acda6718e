use crate::error::{FeeError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of decimal places in the minor unit of every supported currency.
const MINOR_UNIT_SCALE: u32 = 2;

/// Represents a positive monetary amount owed or paid.
///
/// This is a wrapper around `rust_decimal::Decimal` to enforce domain-specific rules:
/// amounts are strictly positive and expressible in whole minor units (paise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(pub(crate) Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(FeeError::Validation("Amount must be positive".to_string()));
        }
        if value.normalize().scale() > MINOR_UNIT_SCALE {
            return Err(FeeError::Validation(format!(
                "Amount {} has sub-minor-unit precision",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Builds an amount from an integer count of minor units, as gateways report it.
    pub fn from_minor_units(units: i64) -> Result<Self> {
        Self::new(Decimal::new(units, MINOR_UNIT_SCALE))
    }

    /// Converts the amount to integer minor units (e.g. 450.50 INR -> 45050 paise).
    pub fn to_minor_units(&self) -> Result<i64> {
        let out_of_range = || FeeError::Validation(format!("Amount {} out of range", self.0));
        let scaled = self
            .0
            .checked_mul(Decimal::from(10i64.pow(MINOR_UNIT_SCALE)))
            .ok_or_else(out_of_range)?;
        i64::try_from(scaled.normalize()).map_err(|_| out_of_range())
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = FeeError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| FeeError::Validation(format!("Invalid amount '{}': {}", s, e)))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Inr,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
        }
    }
}

impl FromStr for Currency {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::Inr),
            other => Err(FeeError::Validation(format!(
                "Unsupported currency '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
