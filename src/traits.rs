//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::invoice::{Customer, Invoice, Job, Vendor};
use crate::types::*;
use crate::voucher::Voucher;

/// Storage abstraction for the ledger system
///
/// A store hands out read snapshots and write units of work. Writers are
/// serialized: a [`LedgerWriter`] holds the store's writer permit until it is
/// committed or dropped, and dropping it without [`LedgerWriter::commit`]
/// discards every change made through it. Readers only ever observe committed
/// state.
#[async_trait]
pub trait LedgerStorage: Clone + Send + Sync + 'static {
    type Reader: LedgerReader;
    type Writer: LedgerWriter;

    /// Snapshot of the last committed state
    async fn reader(&self) -> LedgerResult<Self::Reader>;

    /// Open a write unit of work
    async fn begin(&self) -> LedgerResult<Self::Writer>;
}

/// Company-scoped queries available on snapshots and units of work
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn get_account(&self, company_id: &str, account_id: &str)
        -> LedgerResult<Option<Account>>;

    async fn find_account_by_code(&self, company_id: &str, code: &str)
        -> LedgerResult<Option<Account>>;

    /// All accounts of a company in insertion order
    async fn list_accounts(&self, company_id: &str) -> LedgerResult<Vec<Account>>;

    /// Number of ledger entries posted against an account
    async fn count_account_entries(&self, company_id: &str, account_id: &str)
        -> LedgerResult<usize>;

    async fn get_transaction(&self, company_id: &str, reference: &str)
        -> LedgerResult<Option<Transaction>>;

    /// Transactions dated within the inclusive range, ordered by date
    async fn list_transactions(
        &self,
        company_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Transaction references starting with `prefix`
    async fn list_references(&self, company_id: &str, prefix: &str) -> LedgerResult<Vec<String>>;

    /// Voucher and invoice numbers starting with `prefix`
    async fn document_numbers(&self, company_id: &str, prefix: &str)
        -> LedgerResult<Vec<String>>;

    async fn get_voucher(&self, company_id: &str, voucher_id: &str)
        -> LedgerResult<Option<Voucher>>;

    async fn list_vouchers(&self, company_id: &str) -> LedgerResult<Vec<Voucher>>;

    async fn get_invoice(&self, company_id: &str, invoice_id: &str)
        -> LedgerResult<Option<Invoice>>;

    async fn list_invoices(&self, company_id: &str) -> LedgerResult<Vec<Invoice>>;

    async fn get_customer(&self, company_id: &str, customer_id: &str)
        -> LedgerResult<Option<Customer>>;

    async fn get_vendor(&self, company_id: &str, vendor_id: &str) -> LedgerResult<Option<Vendor>>;

    async fn get_job(&self, company_id: &str, job_id: &str) -> LedgerResult<Option<Job>>;
}

/// Write unit of work
#[async_trait]
pub trait LedgerWriter: LedgerReader {
    /// Insert or replace an account; codes stay unique per company
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()>;

    async fn delete_account(&mut self, company_id: &str, account_id: &str) -> LedgerResult<()>;

    /// Insert a transaction with its entries; fails on a duplicate reference
    async fn insert_transaction(&mut self, transaction: &Transaction) -> LedgerResult<()>;

    /// Replace the header and entries of an existing transaction
    async fn update_transaction(&mut self, transaction: &Transaction) -> LedgerResult<()>;

    /// Remove a transaction and all its entries, returning what was removed
    async fn delete_transaction(&mut self, company_id: &str, reference: &str)
        -> LedgerResult<Option<Transaction>>;

    async fn save_voucher(&mut self, voucher: &Voucher) -> LedgerResult<()>;

    async fn delete_voucher(&mut self, company_id: &str, voucher_id: &str) -> LedgerResult<()>;

    async fn save_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()>;

    async fn delete_invoice(&mut self, company_id: &str, invoice_id: &str) -> LedgerResult<()>;

    async fn save_customer(&mut self, customer: &Customer) -> LedgerResult<()>;

    async fn save_vendor(&mut self, vendor: &Vendor) -> LedgerResult<()>;

    async fn save_job(&mut self, job: &Job) -> LedgerResult<()>;

    /// Make every change visible to readers at once
    async fn commit(self) -> LedgerResult<()>;
}

/// Trait for implementing custom account validation rules
pub trait AccountValidator: Send + Sync {
    /// Validate an account before saving
    fn validate_account(&self, account: &Account) -> LedgerResult<()>;
}

/// Trait for implementing custom posting validation rules
pub trait TransactionValidator: Send + Sync {
    /// Validate the lines of a posting before they reach storage
    fn validate_entries(&self, entries: &[EntryLine]) -> LedgerResult<()>;

    /// Validate the header fields of a posting
    fn validate_header(&self, transaction: &NewTransaction) -> LedgerResult<()> {
        if transaction.reference.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Transaction reference cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default account validator with basic rules
pub struct DefaultAccountValidator;

impl AccountValidator for DefaultAccountValidator {
    fn validate_account(&self, account: &Account) -> LedgerResult<()> {
        if account.code.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Account code cannot be empty".to_string(),
            ));
        }

        if account.name.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Account name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Default posting validator with the double-entry rules
pub struct DefaultTransactionValidator;

impl TransactionValidator for DefaultTransactionValidator {
    fn validate_entries(&self, entries: &[EntryLine]) -> LedgerResult<()> {
        if entries.len() < 2 {
            return Err(LedgerError::Validation(
                "Transaction must have at least two entries for double-entry bookkeeping"
                    .to_string(),
            ));
        }

        let zero = bigdecimal::BigDecimal::from(0);
        for entry in entries {
            if entry.debit < zero || entry.credit < zero {
                return Err(LedgerError::Validation(format!(
                    "Entry amounts cannot be negative (account {})",
                    entry.account_id
                )));
            }
        }

        let debits = total_debits(entries);
        let credits = total_credits(entries);
        if !within_tolerance(&debits, &credits) {
            return Err(LedgerError::Validation(format!(
                "Transaction is not balanced: debits = {}, credits = {}",
                debits, credits
            )));
        }

        Ok(())
    }
}
