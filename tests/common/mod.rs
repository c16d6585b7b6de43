//! Shared fixtures for the integration tests

#![allow(dead_code)]

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use freight_ledger::{
    Account, AccountType, Actor, Ledger, MemoryAuditLog, MemoryStorage, NewAccount,
    PostingConfig, Role,
};
use std::collections::HashMap;
use std::sync::Arc;

pub const COMPANY: &str = "karachi";

/// Freight forwarder's chart: code, name, type, parent code
pub const CHART: &[(&str, &str, AccountType, Option<&str>)] = &[
    ("1000", "Assets", AccountType::Asset, None),
    ("1110", "Cash in Hand", AccountType::Asset, Some("1000")),
    ("1120", "Bank", AccountType::Asset, Some("1000")),
    ("1230", "Trade Debtors", AccountType::Asset, Some("1000")),
    ("2000", "Liabilities", AccountType::Liability, None),
    ("2210", "Vendors Payable", AccountType::Liability, Some("2000")),
    ("2310", "Sales Tax Payable", AccountType::Liability, Some("2000")),
    ("3100", "Owner Capital", AccountType::Equity, None),
    ("4100", "Freight Revenue", AccountType::Revenue, None),
    ("5100", "Freight Cost", AccountType::Expense, None),
    ("5120", "Terminal Handling Charges", AccountType::Expense, None),
];

pub struct Fixture {
    pub ledger: Ledger<MemoryStorage>,
    pub storage: MemoryStorage,
    pub audit: MemoryAuditLog,
    pub accounts: HashMap<String, Account>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(PostingConfig::default()).await
    }

    pub async fn with_config(config: PostingConfig) -> Self {
        let storage = MemoryStorage::new();
        let audit = MemoryAuditLog::new();
        let ledger = Ledger::with_audit(storage.clone(), config, Arc::new(audit.clone()));

        let admin = admin();
        let mut accounts: HashMap<String, Account> = HashMap::new();
        for (code, name, account_type, parent) in CHART {
            let mut new = NewAccount::new(code, name, *account_type);
            if let Some(parent) = parent {
                new = new.under(&accounts[*parent].id);
            }
            let account = ledger.create_account(&admin, new).await.unwrap();
            accounts.insert(code.to_string(), account);
        }

        Self {
            ledger,
            storage,
            audit,
            accounts,
        }
    }

    /// Account id by code
    pub fn id(&self, code: &str) -> String {
        self.accounts[code].id.clone()
    }
}

pub fn admin() -> Actor {
    Actor::new("admin-1", COMPANY, Role::Admin)
}

pub fn accountant() -> Actor {
    Actor::new("acc-1", COMPANY, Role::Accounts)
}

pub fn operations() -> Actor {
    Actor::new("ops-1", COMPANY, Role::Operations)
}

pub fn viewer() -> Actor {
    Actor::new("view-1", COMPANY, Role::Viewer)
}

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap()
}

pub fn amount(value: i64) -> BigDecimal {
    BigDecimal::from(value)
}
