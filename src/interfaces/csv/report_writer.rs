use crate::domain::fee_schedule::{Program, Semester};
use crate::domain::money::{Amount, Currency};
use crate::domain::payment::PaymentRecord;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct FeeRow<'a> {
    program: &'a str,
    semester: &'a str,
    amount: String,
    currency: &'a str,
}

#[derive(Serialize)]
struct PaymentRow<'a> {
    semester: &'a str,
    amount: String,
    currency: &'a str,
    order_id: &'a str,
    payment_id: &'a str,
    paid_at: String,
}

/// Writes fee tables and payment histories as CSV.
///
/// Amounts are written in their normalized decimal form (`45000`, `1.5`).
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_fee_table(
        &mut self,
        program: Program,
        currency: Currency,
        rows: &[(Semester, Amount)],
    ) -> Result<()> {
        for (semester, amount) in rows {
            self.writer.serialize(FeeRow {
                program: program.code(),
                semester: semester.label(),
                amount: amount.to_string(),
                currency: currency.code(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes one row per record. An empty history still gets a header row.
    pub fn write_payments(&mut self, records: &[PaymentRecord]) -> Result<()> {
        if records.is_empty() {
            self.writer.write_record([
                "semester",
                "amount",
                "currency",
                "order_id",
                "payment_id",
                "paid_at",
            ])?;
        }
        for record in records {
            self.writer.serialize(PaymentRow {
                semester: record.semester.label(),
                amount: record.amount.to_string(),
                currency: record.currency.code(),
                order_id: record.order_id.as_str(),
                payment_id: record.payment_id.as_str(),
                paid_at: record.created_at.to_rfc3339(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
impl ReportWriter<Vec<u8>> {
    fn into_string(self) -> String {
        let bytes = self.writer.into_inner().map_err(|e| e.into_error()).unwrap();
        String::from_utf8(bytes).unwrap()
    }
}
