//! In-memory storage implementation for testing and embedding

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::invoice::{Customer, Invoice, Job, Vendor};
use crate::traits::*;
use crate::types::*;
use crate::voucher::Voucher;

/// Everything the store holds. Collections keep insertion order.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: Vec<Account>,
    transactions: Vec<Transaction>,
    vouchers: Vec<Voucher>,
    invoices: Vec<Invoice>,
    customers: Vec<Customer>,
    vendors: Vec<Vendor>,
    jobs: Vec<Job>,
}

impl MemoryState {
    fn get_account(&self, company_id: &str, account_id: &str) -> Option<Account> {
        self.accounts
            .iter()
            .find(|a| a.company_id == company_id && a.id == account_id)
            .cloned()
    }

    fn find_account_by_code(&self, company_id: &str, code: &str) -> Option<Account> {
        self.accounts
            .iter()
            .find(|a| a.company_id == company_id && a.code == code)
            .cloned()
    }

    fn list_accounts(&self, company_id: &str) -> Vec<Account> {
        self.accounts
            .iter()
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect()
    }

    fn count_account_entries(&self, company_id: &str, account_id: &str) -> usize {
        self.transactions
            .iter()
            .filter(|t| t.company_id == company_id)
            .flat_map(|t| t.entries.iter())
            .filter(|e| e.account_id == account_id)
            .count()
    }

    fn get_transaction(&self, company_id: &str, reference: &str) -> Option<Transaction> {
        self.transactions
            .iter()
            .find(|t| t.company_id == company_id && t.reference == reference)
            .cloned()
    }

    fn list_transactions(
        &self,
        company_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|txn| {
                if txn.company_id != company_id {
                    return false;
                }
                if let Some(start) = start_date {
                    if txn.date < start {
                        return false;
                    }
                }
                if let Some(end) = end_date {
                    if txn.date > end {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        transactions.sort_by_key(|t| t.date);
        transactions
    }

    fn list_references(&self, company_id: &str, prefix: &str) -> Vec<String> {
        self.transactions
            .iter()
            .filter(|t| t.company_id == company_id && t.reference.starts_with(prefix))
            .map(|t| t.reference.clone())
            .collect()
    }

    fn document_numbers(&self, company_id: &str, prefix: &str) -> Vec<String> {
        let vouchers = self
            .vouchers
            .iter()
            .filter(|v| v.company_id == company_id)
            .map(|v| &v.voucher_number);
        let invoices = self
            .invoices
            .iter()
            .filter(|i| i.company_id == company_id)
            .map(|i| &i.invoice_number);
        vouchers
            .chain(invoices)
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn get_voucher(&self, company_id: &str, voucher_id: &str) -> Option<Voucher> {
        self.vouchers
            .iter()
            .find(|v| v.company_id == company_id && v.id == voucher_id)
            .cloned()
    }

    fn list_vouchers(&self, company_id: &str) -> Vec<Voucher> {
        self.vouchers
            .iter()
            .filter(|v| v.company_id == company_id)
            .cloned()
            .collect()
    }

    fn get_invoice(&self, company_id: &str, invoice_id: &str) -> Option<Invoice> {
        self.invoices
            .iter()
            .find(|i| i.company_id == company_id && i.id == invoice_id)
            .cloned()
    }

    fn list_invoices(&self, company_id: &str) -> Vec<Invoice> {
        self.invoices
            .iter()
            .filter(|i| i.company_id == company_id)
            .cloned()
            .collect()
    }

    fn get_customer(&self, company_id: &str, customer_id: &str) -> Option<Customer> {
        self.customers
            .iter()
            .find(|c| c.company_id == company_id && c.id == customer_id)
            .cloned()
    }

    fn get_vendor(&self, company_id: &str, vendor_id: &str) -> Option<Vendor> {
        self.vendors
            .iter()
            .find(|v| v.company_id == company_id && v.id == vendor_id)
            .cloned()
    }

    fn get_job(&self, company_id: &str, job_id: &str) -> Option<Job> {
        self.jobs
            .iter()
            .find(|j| j.company_id == company_id && j.id == job_id)
            .cloned()
    }
}

/// Replace the element matching `same` or append `value`
fn upsert<T: Clone>(items: &mut Vec<T>, value: &T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|item| same(item)) {
        Some(slot) => *slot = value.clone(),
        None => items.push(value.clone()),
    }
}

fn poisoned<E>(_: E) -> LedgerError {
    LedgerError::Storage("memory store lock poisoned".to_string())
}

/// In-memory storage for tests, demos and embedding
///
/// Committed state is an immutable snapshot behind an `Arc`; readers clone the
/// `Arc`, writers work on a private copy and swap it in on commit. A single
/// writer permit serializes units of work.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    committed: Arc<RwLock<Arc<MemoryState>>>,
    writer_permit: Arc<Mutex<()>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            committed: Arc::new(RwLock::new(Arc::new(MemoryState::default()))),
            writer_permit: Arc::new(Mutex::new(())),
        }
    }

    fn current(&self) -> LedgerResult<Arc<MemoryState>> {
        Ok(self.committed.read().map_err(poisoned)?.clone())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Read snapshot of a [`MemoryStorage`]
#[derive(Debug, Clone)]
pub struct MemoryReader {
    state: Arc<MemoryState>,
}

/// Write unit of work on a [`MemoryStorage`]
pub struct MemoryWriter {
    state: MemoryState,
    committed: Arc<RwLock<Arc<MemoryState>>>,
    _permit: OwnedMutexGuard<()>,
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    async fn reader(&self) -> LedgerResult<MemoryReader> {
        Ok(MemoryReader {
            state: self.current()?,
        })
    }

    async fn begin(&self) -> LedgerResult<MemoryWriter> {
        let permit = self.writer_permit.clone().lock_owned().await;
        let state = self.current()?.as_ref().clone();
        Ok(MemoryWriter {
            state,
            committed: self.committed.clone(),
            _permit: permit,
        })
    }
}

macro_rules! memory_reader {
    ($ty:ty) => {
        #[async_trait]
        impl LedgerReader for $ty {
            async fn get_account(
                &self,
                company_id: &str,
                account_id: &str,
            ) -> LedgerResult<Option<Account>> {
                Ok(self.state.get_account(company_id, account_id))
            }

            async fn find_account_by_code(
                &self,
                company_id: &str,
                code: &str,
            ) -> LedgerResult<Option<Account>> {
                Ok(self.state.find_account_by_code(company_id, code))
            }

            async fn list_accounts(&self, company_id: &str) -> LedgerResult<Vec<Account>> {
                Ok(self.state.list_accounts(company_id))
            }

            async fn count_account_entries(
                &self,
                company_id: &str,
                account_id: &str,
            ) -> LedgerResult<usize> {
                Ok(self.state.count_account_entries(company_id, account_id))
            }

            async fn get_transaction(
                &self,
                company_id: &str,
                reference: &str,
            ) -> LedgerResult<Option<Transaction>> {
                Ok(self.state.get_transaction(company_id, reference))
            }

            async fn list_transactions(
                &self,
                company_id: &str,
                start_date: Option<NaiveDate>,
                end_date: Option<NaiveDate>,
            ) -> LedgerResult<Vec<Transaction>> {
                Ok(self
                    .state
                    .list_transactions(company_id, start_date, end_date))
            }

            async fn list_references(
                &self,
                company_id: &str,
                prefix: &str,
            ) -> LedgerResult<Vec<String>> {
                Ok(self.state.list_references(company_id, prefix))
            }

            async fn document_numbers(
                &self,
                company_id: &str,
                prefix: &str,
            ) -> LedgerResult<Vec<String>> {
                Ok(self.state.document_numbers(company_id, prefix))
            }

            async fn get_voucher(
                &self,
                company_id: &str,
                voucher_id: &str,
            ) -> LedgerResult<Option<Voucher>> {
                Ok(self.state.get_voucher(company_id, voucher_id))
            }

            async fn list_vouchers(&self, company_id: &str) -> LedgerResult<Vec<Voucher>> {
                Ok(self.state.list_vouchers(company_id))
            }

            async fn get_invoice(
                &self,
                company_id: &str,
                invoice_id: &str,
            ) -> LedgerResult<Option<Invoice>> {
                Ok(self.state.get_invoice(company_id, invoice_id))
            }

            async fn list_invoices(&self, company_id: &str) -> LedgerResult<Vec<Invoice>> {
                Ok(self.state.list_invoices(company_id))
            }

            async fn get_customer(
                &self,
                company_id: &str,
                customer_id: &str,
            ) -> LedgerResult<Option<Customer>> {
                Ok(self.state.get_customer(company_id, customer_id))
            }

            async fn get_vendor(
                &self,
                company_id: &str,
                vendor_id: &str,
            ) -> LedgerResult<Option<Vendor>> {
                Ok(self.state.get_vendor(company_id, vendor_id))
            }

            async fn get_job(&self, company_id: &str, job_id: &str) -> LedgerResult<Option<Job>> {
                Ok(self.state.get_job(company_id, job_id))
            }
        }
    };
}

memory_reader!(MemoryReader);
memory_reader!(MemoryWriter);

#[async_trait]
impl LedgerWriter for MemoryWriter {
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()> {
        let duplicate = self.state.accounts.iter().any(|a| {
            a.company_id == account.company_id && a.code == account.code && a.id != account.id
        });
        if duplicate {
            return Err(LedgerError::Conflict(format!(
                "account code '{}' already exists",
                account.code
            )));
        }
        upsert(&mut self.state.accounts, account, |a| a.id == account.id);
        Ok(())
    }

    async fn delete_account(&mut self, company_id: &str, account_id: &str) -> LedgerResult<()> {
        let before = self.state.accounts.len();
        self.state
            .accounts
            .retain(|a| !(a.company_id == company_id && a.id == account_id));
        if self.state.accounts.len() == before {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> LedgerResult<()> {
        let duplicate = self.state.transactions.iter().any(|t| {
            t.company_id == transaction.company_id && t.reference == transaction.reference
        });
        if duplicate {
            return Err(LedgerError::Conflict(format!(
                "transaction reference '{}' already exists",
                transaction.reference
            )));
        }
        self.state.transactions.push(transaction.clone());
        Ok(())
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> LedgerResult<()> {
        match self
            .state
            .transactions
            .iter_mut()
            .find(|t| t.company_id == transaction.company_id && t.id == transaction.id)
        {
            Some(slot) => {
                *slot = transaction.clone();
                Ok(())
            }
            None => Err(LedgerError::TransactionNotFound(
                transaction.reference.clone(),
            )),
        }
    }

    async fn delete_transaction(
        &mut self,
        company_id: &str,
        reference: &str,
    ) -> LedgerResult<Option<Transaction>> {
        let position = self
            .state
            .transactions
            .iter()
            .position(|t| t.company_id == company_id && t.reference == reference);
        Ok(position.map(|index| self.state.transactions.remove(index)))
    }

    async fn save_voucher(&mut self, voucher: &Voucher) -> LedgerResult<()> {
        let duplicate = self.state.vouchers.iter().any(|v| {
            v.company_id == voucher.company_id
                && v.voucher_number == voucher.voucher_number
                && v.id != voucher.id
        });
        if duplicate {
            return Err(LedgerError::Conflict(format!(
                "voucher number '{}' already exists",
                voucher.voucher_number
            )));
        }
        upsert(&mut self.state.vouchers, voucher, |v| v.id == voucher.id);
        Ok(())
    }

    async fn delete_voucher(&mut self, company_id: &str, voucher_id: &str) -> LedgerResult<()> {
        let before = self.state.vouchers.len();
        self.state
            .vouchers
            .retain(|v| !(v.company_id == company_id && v.id == voucher_id));
        if self.state.vouchers.len() == before {
            return Err(LedgerError::VoucherNotFound(voucher_id.to_string()));
        }
        Ok(())
    }

    async fn save_invoice(&mut self, invoice: &Invoice) -> LedgerResult<()> {
        let duplicate = self.state.invoices.iter().any(|i| {
            i.company_id == invoice.company_id
                && i.invoice_number == invoice.invoice_number
                && i.id != invoice.id
        });
        if duplicate {
            return Err(LedgerError::Conflict(format!(
                "invoice number '{}' already exists",
                invoice.invoice_number
            )));
        }
        upsert(&mut self.state.invoices, invoice, |i| i.id == invoice.id);
        Ok(())
    }

    async fn delete_invoice(&mut self, company_id: &str, invoice_id: &str) -> LedgerResult<()> {
        let before = self.state.invoices.len();
        self.state
            .invoices
            .retain(|i| !(i.company_id == company_id && i.id == invoice_id));
        if self.state.invoices.len() == before {
            return Err(LedgerError::InvoiceNotFound(invoice_id.to_string()));
        }
        Ok(())
    }

    async fn save_customer(&mut self, customer: &Customer) -> LedgerResult<()> {
        upsert(&mut self.state.customers, customer, |c| {
            c.company_id == customer.company_id && c.id == customer.id
        });
        Ok(())
    }

    async fn save_vendor(&mut self, vendor: &Vendor) -> LedgerResult<()> {
        upsert(&mut self.state.vendors, vendor, |v| {
            v.company_id == vendor.company_id && v.id == vendor.id
        });
        Ok(())
    }

    async fn save_job(&mut self, job: &Job) -> LedgerResult<()> {
        upsert(&mut self.state.jobs, job, |j| {
            j.company_id == job.company_id && j.id == job.id
        });
        Ok(())
    }

    async fn commit(self) -> LedgerResult<()> {
        let MemoryWriter {
            state, committed, ..
        } = self;
        *committed.write().map_err(poisoned)? = Arc::new(state);
        Ok(())
    }
}
