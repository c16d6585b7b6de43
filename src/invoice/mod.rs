//! Freight, service and trucking invoices and the records they draw on.
//!
//! Customers, vendors and jobs belong to neighbouring modules of the ERP; the
//! ledger only reads the fields it posts from and flips a job's lock on
//! approval.

pub mod posting;
pub mod resolution;

pub use posting::{
    ApprovalOutcome, InvoiceManager, RevertOutcome, SkippedPosting, INVOICE_EDIT_ROLES,
};
pub use resolution::{
    resolve_anchors, resolve_cost_account, resolve_receivable, resolve_vendor_account,
    MissingAnchor, ResolutionSource, ResolvedAccount, ResolvedAnchors,
};

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::numbering::DocumentKind;
use crate::types::{new_id, LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceKind {
    /// Freight invoice; approval also books per-item costs
    Freight,
    /// Sales-tax service invoice
    Service,
    /// Trucking bill
    Trucking,
}

impl InvoiceKind {
    pub fn document_kind(&self) -> DocumentKind {
        match self {
            InvoiceKind::Freight => DocumentKind::FreightInvoice,
            InvoiceKind::Service => DocumentKind::ServiceInvoice,
            InvoiceKind::Trucking => DocumentKind::TruckingBill,
        }
    }

    /// Whether approval posts an auxiliary cost transaction per item
    pub fn books_costs(&self) -> bool {
        matches!(self, InvoiceKind::Freight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Cancelled,
}

/// Billed line of an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: String,
    pub description: String,
    /// Name of the expense master the line was seeded from
    pub expense_name: Option<String>,
    pub cost_account_id: Option<String>,
    pub vendor_id: Option<String>,
    /// Cost of the line, payable to the vendor
    pub amount: BigDecimal,
    /// Amount billed to the customer
    pub total: BigDecimal,
}

impl InvoiceItem {
    fn from_new(new: NewInvoiceItem) -> Self {
        Self {
            id: new_id(),
            description: new.description,
            expense_name: new.expense_name,
            cost_account_id: new.cost_account_id,
            vendor_id: new.vendor_id,
            amount: new.amount,
            total: new.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    pub description: String,
    pub expense_name: Option<String>,
    pub cost_account_id: Option<String>,
    pub vendor_id: Option<String>,
    pub amount: BigDecimal,
    pub total: BigDecimal,
}

impl From<InvoiceItem> for NewInvoiceItem {
    fn from(item: InvoiceItem) -> Self {
        Self {
            description: item.description,
            expense_name: item.expense_name,
            cost_account_id: item.cost_account_id,
            vendor_id: item.vendor_id,
            amount: item.amount,
            total: item.total,
        }
    }
}

impl NewInvoiceItem {
    pub fn new(description: &str, amount: BigDecimal, total: BigDecimal) -> Self {
        Self {
            description: description.to_string(),
            expense_name: None,
            cost_account_id: None,
            vendor_id: None,
            amount,
            total,
        }
    }

    pub fn expense(mut self, expense_name: &str) -> Self {
        self.expense_name = Some(expense_name.to_string());
        self
    }

    pub fn cost_account(mut self, account_id: &str) -> Self {
        self.cost_account_id = Some(account_id.to_string());
        self
    }

    pub fn vendor(mut self, vendor_id: &str) -> Self {
        self.vendor_id = Some(vendor_id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub company_id: String,
    pub invoice_number: String,
    pub kind: InvoiceKind,
    pub date: NaiveDate,
    pub customer_id: String,
    pub job_id: Option<String>,
    pub items: Vec<InvoiceItem>,
    /// Sum of item totals
    pub total_amount: BigDecimal,
    pub tax_amount: BigDecimal,
    /// `total_amount + tax_amount`
    pub grand_total: BigDecimal,
    pub currency_code: Option<String>,
    pub usd_rate: Option<BigDecimal>,
    pub exchange_rate: Option<BigDecimal>,
    pub is_approved: bool,
    pub status: InvoiceStatus,
    /// Primary sale transaction, set while approved
    pub transaction_id: Option<String>,
    pub created_by_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Invoice {
    /// `usd_rate * exchange_rate`, for display only
    pub fn effective_rate(&self) -> Option<BigDecimal> {
        match (&self.usd_rate, &self.exchange_rate) {
            (Some(usd), Some(exchange)) => Some(usd * exchange),
            _ => None,
        }
    }

    /// Reference of the cost posting for one item
    pub fn cost_reference(&self, item_id: &str) -> String {
        format!("{}{}", self.cost_reference_prefix(), item_id)
    }

    /// Prefix shared by every cost posting of this invoice and no other
    pub fn cost_reference_prefix(&self) -> String {
        format!("{}-COST-", self.invoice_number)
    }

    pub(crate) fn set_items(&mut self, items: Vec<NewInvoiceItem>, tax_amount: BigDecimal) {
        self.items = items.into_iter().map(InvoiceItem::from_new).collect();
        self.total_amount = self.items.iter().map(|i| &i.total).sum();
        self.grand_total = &self.total_amount + &tax_amount;
        self.tax_amount = tax_amount;
    }
}

/// Input for creating an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub kind: InvoiceKind,
    pub date: NaiveDate,
    /// Defaults to the job's customer
    pub customer_id: Option<String>,
    pub job_id: Option<String>,
    /// Seeded from the job's expenses when empty
    pub items: Vec<NewInvoiceItem>,
    pub tax_amount: BigDecimal,
    pub currency_code: Option<String>,
    pub usd_rate: Option<BigDecimal>,
    pub exchange_rate: Option<BigDecimal>,
}

impl NewInvoice {
    pub fn new(kind: InvoiceKind, date: NaiveDate) -> Self {
        Self {
            kind,
            date,
            customer_id: None,
            job_id: None,
            items: Vec::new(),
            tax_amount: BigDecimal::from(0),
            currency_code: None,
            usd_rate: None,
            exchange_rate: None,
        }
    }

    pub fn customer(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }

    pub fn job(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    pub fn item(mut self, item: NewInvoiceItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn tax(mut self, tax_amount: BigDecimal) -> Self {
        self.tax_amount = tax_amount;
        self
    }

    pub fn rates(mut self, currency_code: &str, usd_rate: BigDecimal, exchange_rate: BigDecimal) -> Self {
        self.currency_code = Some(currency_code.to_string());
        self.usd_rate = Some(usd_rate);
        self.exchange_rate = Some(exchange_rate);
        self
    }
}

/// Edits to a draft invoice; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub date: Option<NaiveDate>,
    pub customer_id: Option<String>,
    pub items: Option<Vec<NewInvoiceItem>>,
    pub tax_amount: Option<BigDecimal>,
    pub usd_rate: Option<BigDecimal>,
    pub exchange_rate: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub company_id: String,
    pub name: String,
    /// Customer's own receivable account
    pub account_id: Option<String>,
}

impl Customer {
    pub fn new(company_id: &str, name: &str) -> Self {
        Self {
            id: new_id(),
            company_id: company_id.to_string(),
            name: name.to_string(),
            account_id: None,
        }
    }

    pub fn with_account(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub company_id: String,
    pub name: String,
    /// Vendor's own payable account
    pub account_id: Option<String>,
}

impl Vendor {
    pub fn new(company_id: &str, name: &str) -> Self {
        Self {
            id: new_id(),
            company_id: company_id.to_string(),
            name: name.to_string(),
            account_id: None,
        }
    }

    pub fn with_account(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Open,
    /// An approved invoice references the job; it is no longer editable
    Locked,
}

/// Expense recorded against a job, billable to the customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExpense {
    pub description: String,
    pub expense_name: Option<String>,
    pub cost_account_id: Option<String>,
    pub vendor_id: Option<String>,
    pub cost: BigDecimal,
    pub price: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub company_id: String,
    pub job_number: String,
    pub customer_id: String,
    pub status: JobStatus,
    pub expenses: Vec<JobExpense>,
}

impl Job {
    pub fn new(company_id: &str, job_number: &str, customer_id: &str) -> Self {
        Self {
            id: new_id(),
            company_id: company_id.to_string(),
            job_number: job_number.to_string(),
            customer_id: customer_id.to_string(),
            status: JobStatus::Open,
            expenses: Vec::new(),
        }
    }

    pub fn with_expense(mut self, expense: JobExpense) -> Self {
        self.expenses.push(expense);
        self
    }

    pub fn is_locked(&self) -> bool {
        self.status == JobStatus::Locked
    }

    /// Invoice lines seeded from the job's expenses
    pub fn invoice_items(&self) -> Vec<NewInvoiceItem> {
        self.expenses
            .iter()
            .map(|e| NewInvoiceItem {
                description: e.description.clone(),
                expense_name: e.expense_name.clone(),
                cost_account_id: e.cost_account_id.clone(),
                vendor_id: e.vendor_id.clone(),
                amount: e.cost.clone(),
                total: e.price.clone(),
            })
            .collect()
    }
}

pub(crate) fn validate_items(items: &[NewInvoiceItem], tax_amount: &BigDecimal) -> LedgerResult<()> {
    if items.is_empty() {
        return Err(LedgerError::Validation(
            "An invoice needs at least one item".to_string(),
        ));
    }

    let zero = BigDecimal::from(0);
    if *tax_amount < zero {
        return Err(LedgerError::Validation(
            "Tax amount cannot be negative".to_string(),
        ));
    }
    for item in items {
        if item.amount < zero || item.total < zero {
            return Err(LedgerError::Validation(format!(
                "Item '{}' has a negative amount",
                item.description
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn invoice(number: &str) -> Invoice {
        let mut invoice = Invoice {
            id: new_id(),
            company_id: "c1".to_string(),
            invoice_number: number.to_string(),
            kind: InvoiceKind::Freight,
            date: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            customer_id: "cust".to_string(),
            job_id: None,
            items: Vec::new(),
            total_amount: BigDecimal::from(0),
            tax_amount: BigDecimal::from(0),
            grand_total: BigDecimal::from(0),
            currency_code: None,
            usd_rate: None,
            exchange_rate: None,
            is_approved: false,
            status: InvoiceStatus::Draft,
            transaction_id: None,
            created_by_id: "u1".to_string(),
            created_at: crate::types::now(),
            updated_at: crate::types::now(),
        };
        invoice.set_items(
            vec![
                NewInvoiceItem::new("Ocean freight", BigDecimal::from(600), BigDecimal::from(800)),
                NewInvoiceItem::new("Documentation", BigDecimal::from(50), BigDecimal::from(200)),
            ],
            BigDecimal::from(170),
        );
        invoice
    }

    #[test]
    fn totals_follow_items_and_tax() {
        let invoice = invoice("FIN-2025-0001");
        assert_eq!(invoice.total_amount, BigDecimal::from(1000));
        assert_eq!(invoice.grand_total, BigDecimal::from(1170));
    }

    #[test]
    fn effective_rate_needs_both_rates() {
        let mut invoice = invoice("FIN-2025-0001");
        assert_eq!(invoice.effective_rate(), None);

        invoice.usd_rate = Some(BigDecimal::from_str("1.5").unwrap());
        assert_eq!(invoice.effective_rate(), None);

        invoice.exchange_rate = Some(BigDecimal::from_str("278.40").unwrap());
        assert_eq!(
            invoice.effective_rate(),
            Some(BigDecimal::from_str("417.6").unwrap())
        );
    }

    #[test]
    fn cost_prefix_does_not_cover_longer_numbers() {
        let short = invoice("FIN-2025-0001");
        let long = invoice("FIN-2025-00010");
        let item = &long.items[0].id;
        assert!(!long.cost_reference(item).starts_with(&short.cost_reference_prefix()));
        assert!(short
            .cost_reference(&short.items[0].id)
            .starts_with(&short.cost_reference_prefix()));
    }

    #[test]
    fn job_expenses_seed_items() {
        let job = Job::new("c1", "JOB-2025-0042", "cust").with_expense(JobExpense {
            description: "Terminal Handling".to_string(),
            expense_name: Some("THC".to_string()),
            cost_account_id: None,
            vendor_id: Some("v1".to_string()),
            cost: BigDecimal::from(300),
            price: BigDecimal::from(450),
        });
        let items = job.invoice_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].amount, BigDecimal::from(300));
        assert_eq!(items[0].total, BigDecimal::from(450));
        assert_eq!(items[0].vendor_id.as_deref(), Some("v1"));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let items = vec![NewInvoiceItem::new(
            "Refund",
            BigDecimal::from(-1),
            BigDecimal::from(0),
        )];
        assert!(validate_items(&items, &BigDecimal::from(0)).is_err());
        assert!(validate_items(&[], &BigDecimal::from(0)).is_err());
    }
}
