//! Document numbering.
//!
//! Numbers look like `FIN-2025-0007`: a kind code, the period (year of the
//! document date), and a sequence zero-padded to four digits. The next number is
//! one past the highest parseable sequence already stored under the same
//! company and prefix. Allocation reads through the caller's unit of work, so it
//! is only collision free when the insert that consumes the number happens in
//! that same unit of work.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::traits::LedgerReader;
use crate::types::{LedgerError, LedgerResult};
use crate::voucher::VoucherType;

const SEQUENCE_WIDTH: usize = 4;

/// Kinds of numbered documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    FreightInvoice,
    ServiceInvoice,
    TruckingBill,
    Voucher(VoucherType),
}

impl DocumentKind {
    /// Leading code of the number
    pub fn code(&self) -> &'static str {
        match self {
            DocumentKind::FreightInvoice => "FIN",
            DocumentKind::ServiceInvoice => "INV",
            DocumentKind::TruckingBill => "TRK",
            DocumentKind::Voucher(VoucherType::Journal) => "JV",
            DocumentKind::Voucher(VoucherType::Payment) => "PV",
            DocumentKind::Voucher(VoucherType::Receipt) => "RV",
            DocumentKind::Voucher(VoucherType::Contra) => "CV",
        }
    }

    /// Prefix shared by every number of this kind in a period
    pub fn period_prefix(&self, year: i32) -> String {
        format!("{}-{}-", self.code(), year)
    }

    /// Whether a job-linked document takes its number from the job
    pub fn derives_from_job(&self) -> bool {
        matches!(
            self,
            DocumentKind::ServiceInvoice | DocumentKind::TruckingBill
        )
    }
}

/// Result of a sequential allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberAllocation {
    pub number: String,
    pub sequence: u32,
    /// Stored numbers under the prefix whose sequence failed to parse
    pub corrupt: Vec<String>,
}

impl NumberAllocation {
    /// True when no earlier document exists in the period
    pub fn is_first(&self) -> bool {
        self.sequence == 1 && self.corrupt.is_empty()
    }
}

/// Parses the sequence that follows `prefix` in `number`
pub fn parse_sequence(prefix: &str, number: &str) -> Option<u32> {
    let suffix = number.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

pub fn format_number(prefix: &str, sequence: u32) -> String {
    format!("{prefix}{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// Computes the next sequence from the numbers already issued under `prefix`
pub fn next_sequence<'a, I>(prefix: &str, existing: I) -> LedgerResult<(u32, Vec<String>)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut highest: Option<u32> = None;
    let mut corrupt = Vec::new();

    for number in existing {
        match parse_sequence(prefix, number) {
            Some(sequence) => highest = highest.max(Some(sequence)),
            None => corrupt.push(number.to_string()),
        }
    }

    let next = match highest {
        Some(sequence) => sequence.checked_add(1).ok_or_else(|| {
            LedgerError::Conflict(format!("sequence exhausted for prefix {prefix}"))
        })?,
        None => 1,
    };

    Ok((next, corrupt))
}

/// Allocates the next sequential number for `kind` in the period of `date`
pub async fn allocate<R>(
    reader: &R,
    company_id: &str,
    kind: DocumentKind,
    date: NaiveDate,
) -> LedgerResult<NumberAllocation>
where
    R: LedgerReader + ?Sized,
{
    let prefix = kind.period_prefix(date.year());
    let mut existing = reader.document_numbers(company_id, &prefix).await?;
    // Standalone postings share the reference namespace; sub-references such as
    // `{number}-COST-{item}` are not sequence numbers and are left out
    existing.extend(
        reader
            .list_references(company_id, &prefix)
            .await?
            .into_iter()
            .filter(|r| parse_sequence(&prefix, r).is_some()),
    );
    let (sequence, corrupt) = next_sequence(&prefix, existing.iter().map(String::as_str))?;

    if !corrupt.is_empty() {
        tracing::warn!(
            company_id,
            prefix = %prefix,
            corrupt = ?corrupt,
            "Ignoring document numbers with unparseable sequence"
        );
    }

    Ok(NumberAllocation {
        number: format_number(&prefix, sequence),
        sequence,
        corrupt,
    })
}

/// Derives a document number from the serial suffix of a job number
pub fn derive_from_job(kind: DocumentKind, job_number: &str) -> LedgerResult<String> {
    if !kind.derives_from_job() {
        return Err(LedgerError::Validation(format!(
            "{} numbers are not derived from jobs",
            kind.code()
        )));
    }

    let start = job_number
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .len();
    let digits = &job_number[start..];

    if digits.is_empty() {
        return Err(LedgerError::Validation(format!(
            "job number '{job_number}' has no serial suffix"
        )));
    }

    Ok(format!("{}-{}", kind.code(), digits))
}
