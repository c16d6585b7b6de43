//! Core types and data structures for the ledger

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest debit/credit difference a posting may carry and still count as balanced
pub fn balance_tolerance() -> BigDecimal {
    BigDecimal::new(1.into(), 2)
}

/// Returns true when two amounts are equal within [`balance_tolerance`]
pub fn within_tolerance(left: &BigDecimal, right: &BigDecimal) -> bool {
    (left - right).abs() <= balance_tolerance()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Account types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Assets - what the business owns (Cash, Bank, Receivables, etc.)
    Asset,
    /// Liabilities - what the business owes (Vendor payables, Sales tax, etc.)
    Liability,
    /// Equity - owner's interest in the business
    Equity,
    /// Revenue - freight and service charges billed to customers
    Revenue,
    /// Expenses - costs incurred by the business
    Expense,
}

impl AccountType {
    /// Returns the normal balance side for this account type
    /// Assets and Expenses normally have debit balances
    /// Liabilities, Equity, and Revenue normally have credit balances
    pub fn normal_balance(&self) -> EntryType {
        match self {
            AccountType::Asset | AccountType::Expense => EntryType::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                EntryType::Credit
            }
        }
    }

    /// Converts a raw `debit - credit` sum into the balance shown on statements.
    pub fn display_balance(&self, raw: &BigDecimal) -> BigDecimal {
        match self.normal_balance() {
            EntryType::Debit => raw.clone(),
            EntryType::Credit => -raw.clone(),
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Revenue => "REVENUE",
            AccountType::Expense => "EXPENSE",
        };
        f.write_str(name)
    }
}

/// Sides of a double-entry posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Debit - increases Assets and Expenses, decreases Liabilities, Equity, and Revenue
    Debit,
    /// Credit - increases Liabilities, Equity, and Revenue, decreases Assets and Expenses
    Credit,
}

/// Chart of accounts node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: String,
    /// Owning company
    pub company_id: String,
    /// Account code, unique per company ("1230", "4100", ...)
    pub code: String,
    /// Human-readable account name
    pub name: String,
    /// Type of account (Asset, Liability, etc.)
    pub account_type: AccountType,
    /// Optional parent account for hierarchical chart of accounts
    pub parent_id: Option<String>,
    /// Business division the account reports under
    pub division: Option<String>,
    /// When the account was created
    pub created_at: NaiveDateTime,
    /// When the account was last updated
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Create a new account with a generated id
    pub fn new(company_id: &str, new: NewAccount) -> Self {
        let now = now();
        Self {
            id: new_id(),
            company_id: company_id.to_string(),
            code: new.code,
            name: new.name,
            account_type: new.account_type,
            parent_id: new.parent_id,
            division: new.division,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_id: Option<String>,
    pub division: Option<String>,
}

impl NewAccount {
    pub fn new(code: &str, name: &str, account_type: AccountType) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            parent_id: None,
            division: None,
        }
    }

    pub fn under(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }
}

/// A single posting line as submitted by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryLine {
    pub account_id: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub description: Option<String>,
}

impl EntryLine {
    /// Create a debit line
    pub fn debit(account_id: &str, amount: BigDecimal, description: Option<String>) -> Self {
        Self {
            account_id: account_id.to_string(),
            debit: amount,
            credit: BigDecimal::from(0),
            description,
        }
    }

    /// Create a credit line
    pub fn credit(account_id: &str, amount: BigDecimal, description: Option<String>) -> Self {
        Self {
            account_id: account_id.to_string(),
            debit: BigDecimal::from(0),
            credit: amount,
            description,
        }
    }

    /// Net effect of the line on its account (`debit - credit`)
    pub fn net(&self) -> BigDecimal {
        &self.debit - &self.credit
    }
}

/// Sum of the debit column of a set of lines
pub fn total_debits(lines: &[EntryLine]) -> BigDecimal {
    lines.iter().map(|l| &l.debit).sum()
}

/// Sum of the credit column of a set of lines
pub fn total_credits(lines: &[EntryLine]) -> BigDecimal {
    lines.iter().map(|l| &l.credit).sum()
}

/// Stored ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub transaction_id: String,
    pub account_id: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub description: Option<String>,
}

impl Entry {
    fn from_line(transaction_id: &str, line: EntryLine) -> Self {
        Self {
            id: new_id(),
            transaction_id: transaction_id.to_string(),
            account_id: line.account_id,
            debit: line.debit,
            credit: line.credit,
            description: line.description,
        }
    }
}

/// What produced a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Journal,
    Payment,
    Receipt,
    Contra,
    /// Customer receivable and revenue from an approved invoice
    Sale,
    /// Per-item cost allocation from an approved freight invoice
    Cost,
}

/// Input for posting a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub reference: String,
    pub date: NaiveDate,
    pub description: String,
    pub kind: TransactionKind,
    pub entries: Vec<EntryLine>,
}

/// Atomic unit of ledger mutation: a header plus balanced entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub company_id: String,
    /// Unique per company; links the transaction to its business document
    pub reference: String,
    pub date: NaiveDate,
    pub description: String,
    pub kind: TransactionKind,
    pub entries: Vec<Entry>,
    pub created_at: NaiveDateTime,
}

impl Transaction {
    pub(crate) fn from_new(company_id: &str, new: NewTransaction) -> Self {
        let id = new_id();
        let entries = new
            .entries
            .into_iter()
            .map(|line| Entry::from_line(&id, line))
            .collect();
        Self {
            id,
            company_id: company_id.to_string(),
            reference: new.reference,
            date: new.date,
            description: new.description,
            kind: new.kind,
            entries,
            created_at: now(),
        }
    }

    pub(crate) fn replace_entries(&mut self, lines: Vec<EntryLine>) {
        let id = self.id.clone();
        self.entries = lines
            .into_iter()
            .map(|line| Entry::from_line(&id, line))
            .collect();
    }

    /// Calculate total debits
    pub fn total_debits(&self) -> BigDecimal {
        self.entries.iter().map(|e| &e.debit).sum()
    }

    /// Calculate total credits
    pub fn total_credits(&self) -> BigDecimal {
        self.entries.iter().map(|e| &e.credit).sum()
    }

    /// Check if the transaction is balanced within the monetary tolerance
    pub fn is_balanced(&self) -> bool {
        within_tolerance(&self.total_debits(), &self.total_credits())
    }
}

/// Roles supplied by the auth collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Accounts,
    Operations,
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "ADMIN",
            Role::Accounts => "ACCOUNTS",
            Role::Operations => "OPERATIONS",
            Role::Viewer => "VIEWER",
        };
        f.write_str(name)
    }
}

/// Who is performing an operation, and for which company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub company_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: &str, company_id: &str, role: Role) -> Self {
        Self {
            user_id: user_id.to_string(),
            company_id: company_id.to_string(),
            role,
        }
    }

    /// Fails with [`LedgerError::Unauthorized`] unless the actor holds one of `allowed`
    pub fn require(&self, allowed: &[Role], action: &str) -> LedgerResult<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized(format!(
                "role {} may not {}",
                self.role, action
            )))
        }
    }
}

/// Roles allowed to mutate the ledger
pub const LEDGER_ROLES: &[Role] = &[Role::Admin, Role::Accounts];

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Not authorized: {0}")]
    Unauthorized(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Coarse error classes an outer API layer maps to responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Authorization,
    Internal,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::AccountNotFound(_)
            | LedgerError::TransactionNotFound(_)
            | LedgerError::VoucherNotFound(_)
            | LedgerError::InvoiceNotFound(_)
            | LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::Unauthorized(_) => ErrorKind::Authorization,
            LedgerError::Storage(_) | LedgerError::Config(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
