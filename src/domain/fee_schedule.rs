use super::money::{Amount, Currency};
use super::payment::TenantId;
use crate::error::{FeeError, Result};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

static SEMESTER_SEQUENCE: [Semester; 8] = Semester::ALL;

/// An academic programme a student is enrolled in.
///
/// Determines both the valid semester sequence and the base fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Program {
    Bca,
    Bba,
    Bsc,
    Mca,
    Mtech,
    Msc,
    Btech,
}

impl Program {
    pub const ALL: [Program; 7] = [
        Program::Bca,
        Program::Bba,
        Program::Bsc,
        Program::Mca,
        Program::Mtech,
        Program::Msc,
        Program::Btech,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Program::Bca => "BCA",
            Program::Bba => "BBA",
            Program::Bsc => "BSC",
            Program::Mca => "MCA",
            Program::Mtech => "MTECH",
            Program::Msc => "MSC",
            Program::Btech => "BTECH",
        }
    }

    /// Ordered semester sequence for the programme.
    pub fn semesters(&self) -> &'static [Semester] {
        match self {
            Program::Bca | Program::Bba | Program::Bsc => &SEMESTER_SEQUENCE[..6],
            Program::Mca | Program::Mtech => &SEMESTER_SEQUENCE[..4],
            Program::Msc | Program::Btech => &SEMESTER_SEQUENCE[..],
        }
    }
}

impl FromStr for Program {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Program::ALL
            .into_iter()
            .find(|p| p.code() == wanted)
            .ok_or_else(|| FeeError::Validation(format!("Unknown programme '{}'", s)))
    }
}

impl TryFrom<String> for Program {
    type Error = FeeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Ordered semester label. Which labels are acceptable depends on the [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Semester {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
    Seventh,
    Eighth,
}

impl Semester {
    pub const ALL: [Semester; 8] = [
        Semester::First,
        Semester::Second,
        Semester::Third,
        Semester::Fourth,
        Semester::Fifth,
        Semester::Sixth,
        Semester::Seventh,
        Semester::Eighth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Semester::First => "FIRST",
            Semester::Second => "SECOND",
            Semester::Third => "THIRD",
            Semester::Fourth => "FOURTH",
            Semester::Fifth => "FIFTH",
            Semester::Sixth => "SIXTH",
            Semester::Seventh => "SEVENTH",
            Semester::Eighth => "EIGHTH",
        }
    }
}

impl FromStr for Semester {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Semester::ALL
            .into_iter()
            .find(|sem| sem.label() == wanted)
            .ok_or_else(|| FeeError::Validation(format!("Unknown semester '{}'", s)))
    }
}

impl TryFrom<String> for Semester {
    type Error = FeeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed fee lookup for one institution.
///
/// The schedule is the only source of truth for what a semester costs; amounts
/// declared by a client are never used to price an order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    currency: Currency,
    fees: HashMap<Program, Amount>,
}

impl FeeSchedule {
    /// The standard per-semester fee for every programme.
    pub fn standard() -> Self {
        let fees = [
            (Program::Bca, dec!(45000)),
            (Program::Bba, dec!(40000)),
            (Program::Bsc, dec!(35000)),
            (Program::Mca, dec!(60000)),
            (Program::Mtech, dec!(75000)),
            (Program::Msc, dec!(50000)),
            (Program::Btech, dec!(90000)),
        ]
        .into_iter()
        .map(|(program, fee)| (program, Amount(fee)))
        .collect();

        Self {
            currency: Currency::Inr,
            fees,
        }
    }

    /// Returns a copy of this schedule with the given programme fees replaced.
    pub fn with_overrides(&self, overrides: &HashMap<Program, Amount>) -> Self {
        let mut fees = self.fees.clone();
        fees.extend(overrides.iter().map(|(p, a)| (*p, *a)));
        Self {
            currency: self.currency,
            fees,
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn valid_semesters(&self, program: Program) -> &'static [Semester] {
        program.semesters()
    }

    pub fn amount_for(&self, program: Program, semester: Semester) -> Result<Amount> {
        if !program.semesters().contains(&semester) {
            return Err(FeeError::InvalidSemester { program, semester });
        }
        self.fees
            .get(&program)
            .copied()
            .ok_or_else(|| FeeError::Config(format!("No fee configured for {}", program)))
    }

    /// Every (semester, amount) row of a programme, in sequence order.
    pub fn table(&self, program: Program) -> Result<Vec<(Semester, Amount)>> {
        program
            .semesters()
            .iter()
            .map(|sem| Ok((*sem, self.amount_for(program, *sem)?)))
            .collect()
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

/// Immutable registry of fee schedules, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedules {
    default: FeeSchedule,
    tenants: HashMap<TenantId, FeeSchedule>,
}

impl FeeSchedules {
    pub fn new(default: FeeSchedule) -> Self {
        Self {
            default,
            tenants: HashMap::new(),
        }
    }

    pub fn with_tenant(mut self, tenant: TenantId, schedule: FeeSchedule) -> Self {
        self.tenants.insert(tenant, schedule);
        self
    }

    pub fn default_schedule(&self) -> &FeeSchedule {
        &self.default
    }

    /// The tenant's own schedule, or the default one.
    pub fn for_tenant(&self, tenant: &TenantId) -> &FeeSchedule {
        self.tenants.get(tenant).unwrap_or(&self.default)
    }
}
