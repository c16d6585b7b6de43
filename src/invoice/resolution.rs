//! Account resolution for invoice postings.
//!
//! Every chain ends at an anchor account. Anchors are looked up by code once per
//! approval; an anchor whose code is configured but absent from the chart is
//! reported as missing rather than silently ignored.

use std::collections::HashMap;

use crate::config::{AnchorCodes, AnchorPurpose};
use crate::invoice::InvoiceItem;
use crate::traits::LedgerReader;
use crate::types::*;

/// Anchor whose configured code has no account in the company
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAnchor {
    pub purpose: AnchorPurpose,
    pub code: String,
}

/// Anchor accounts of one company
#[derive(Debug, Clone, Default)]
pub struct ResolvedAnchors {
    accounts: HashMap<AnchorPurpose, Account>,
    /// Configured codes that resolve to no account
    pub missing: Vec<MissingAnchor>,
    /// Purposes with no code configured at all
    pub unconfigured: Vec<AnchorPurpose>,
}

impl ResolvedAnchors {
    pub fn account(&self, purpose: AnchorPurpose) -> Option<&Account> {
        self.accounts.get(&purpose)
    }

    pub fn account_id(&self, purpose: AnchorPurpose) -> Option<&str> {
        self.account(purpose).map(|a| a.id.as_str())
    }

    /// True when every configured code resolved
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub async fn resolve_anchors<R>(
    reader: &R,
    company_id: &str,
    codes: &AnchorCodes,
) -> LedgerResult<ResolvedAnchors>
where
    R: LedgerReader + ?Sized,
{
    let mut resolved = ResolvedAnchors::default();

    for purpose in AnchorPurpose::ALL {
        let Some(code) = codes.code(purpose) else {
            resolved.unconfigured.push(purpose);
            continue;
        };
        match reader.find_account_by_code(company_id, code).await? {
            Some(account) => {
                resolved.accounts.insert(purpose, account);
            }
            None => resolved.missing.push(MissingAnchor {
                purpose,
                code: code.to_string(),
            }),
        }
    }

    Ok(resolved)
}

/// Which step of a fallback chain produced an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Set on the item, customer or vendor itself
    Linked,
    /// Found by matching names against the chart
    NameMatch,
    /// Company anchor account
    Anchor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub account_id: String,
    pub source: ResolutionSource,
}

impl ResolvedAccount {
    fn new(account_id: &str, source: ResolutionSource) -> Self {
        Self {
            account_id: account_id.to_string(),
            source,
        }
    }
}

/// Cost account for a freight item.
///
/// The item's own cost account wins; otherwise the first EXPENSE account whose
/// name contains the item's expense name, then its description, ignoring case;
/// otherwise the cost anchor.
pub async fn resolve_cost_account<R>(
    reader: &R,
    company_id: &str,
    item: &InvoiceItem,
    anchors: &ResolvedAnchors,
) -> LedgerResult<Option<ResolvedAccount>>
where
    R: LedgerReader + ?Sized,
{
    if let Some(ref account_id) = item.cost_account_id {
        if reader.get_account(company_id, account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id.clone()));
        }
        return Ok(Some(ResolvedAccount::new(account_id, ResolutionSource::Linked)));
    }

    let expenses: Vec<Account> = reader
        .list_accounts(company_id)
        .await?
        .into_iter()
        .filter(|a| a.account_type == AccountType::Expense)
        .collect();

    let needles = item
        .expense_name
        .iter()
        .chain(std::iter::once(&item.description))
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty());

    for needle in needles {
        if let Some(account) = expenses
            .iter()
            .find(|a| a.name.to_lowercase().contains(&needle))
        {
            tracing::debug!(
                item = %item.id,
                account = %account.code,
                "Cost account matched by name"
            );
            return Ok(Some(ResolvedAccount::new(
                &account.id,
                ResolutionSource::NameMatch,
            )));
        }
    }

    Ok(anchors
        .account_id(AnchorPurpose::Cost)
        .map(|id| ResolvedAccount::new(id, ResolutionSource::Anchor)))
}

/// Payable account for an item's vendor.
///
/// The vendor's own account wins; otherwise a LIABILITY account named exactly
/// like the vendor, ignoring case; otherwise the payable anchor.
pub async fn resolve_vendor_account<R>(
    reader: &R,
    company_id: &str,
    vendor_id: Option<&str>,
    anchors: &ResolvedAnchors,
) -> LedgerResult<Option<ResolvedAccount>>
where
    R: LedgerReader + ?Sized,
{
    let vendor = match vendor_id {
        Some(id) => Some(
            reader
                .get_vendor(company_id, id)
                .await?
                .ok_or_else(|| LedgerError::NotFound(format!("Vendor {id}")))?,
        ),
        None => None,
    };

    if let Some(vendor) = vendor {
        if let Some(ref account_id) = vendor.account_id {
            return Ok(Some(ResolvedAccount::new(account_id, ResolutionSource::Linked)));
        }

        let name = vendor.name.trim().to_lowercase();
        if let Some(account) = reader
            .list_accounts(company_id)
            .await?
            .into_iter()
            .find(|a| {
                a.account_type == AccountType::Liability && a.name.trim().to_lowercase() == name
            })
        {
            tracing::debug!(
                vendor = %vendor.id,
                account = %account.code,
                "Vendor payable matched by name"
            );
            return Ok(Some(ResolvedAccount::new(
                &account.id,
                ResolutionSource::NameMatch,
            )));
        }
    }

    Ok(anchors
        .account_id(AnchorPurpose::Payable)
        .map(|id| ResolvedAccount::new(id, ResolutionSource::Anchor)))
}

/// Receivable account for a customer: its own account, else the receivable anchor
pub async fn resolve_receivable<R>(
    reader: &R,
    company_id: &str,
    customer_id: &str,
    anchors: &ResolvedAnchors,
) -> LedgerResult<Option<ResolvedAccount>>
where
    R: LedgerReader + ?Sized,
{
    let customer = reader
        .get_customer(company_id, customer_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Customer {customer_id}")))?;

    if let Some(ref account_id) = customer.account_id {
        return Ok(Some(ResolvedAccount::new(account_id, ResolutionSource::Linked)));
    }

    Ok(anchors
        .account_id(AnchorPurpose::Receivable)
        .map(|id| ResolvedAccount::new(id, ResolutionSource::Anchor)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::{Customer, Vendor};
    use crate::traits::{LedgerStorage, LedgerWriter};
    use crate::utils::MemoryStorage;
    use bigdecimal::BigDecimal;

    fn item(description: &str, expense_name: Option<&str>) -> InvoiceItem {
        InvoiceItem {
            id: new_id(),
            description: description.to_string(),
            expense_name: expense_name.map(str::to_string),
            cost_account_id: None,
            vendor_id: None,
            amount: BigDecimal::from(100),
            total: BigDecimal::from(150),
        }
    }

    async fn chart(storage: &MemoryStorage) -> Vec<Account> {
        let accounts = vec![
            Account::new("c1", NewAccount::new("5100", "Freight Cost", AccountType::Expense)),
            Account::new(
                "c1",
                NewAccount::new("5120", "Terminal Handling Charges", AccountType::Expense),
            ),
            Account::new("c1", NewAccount::new("2210", "Vendors Payable", AccountType::Liability)),
            Account::new("c1", NewAccount::new("2215", "Maersk Line", AccountType::Liability)),
            Account::new("c1", NewAccount::new("1230", "Trade Debtors", AccountType::Asset)),
        ];
        let mut session = storage.begin().await.unwrap();
        for account in &accounts {
            session.save_account(account).await.unwrap();
        }
        session.commit().await.unwrap();
        accounts
    }

    #[tokio::test]
    async fn anchors_report_missing_and_unconfigured() {
        let storage = MemoryStorage::new();
        chart(&storage).await;
        let reader = storage.reader().await.unwrap();

        let anchors = resolve_anchors(&reader, "c1", &AnchorCodes::default())
            .await
            .unwrap();
        assert!(!anchors.is_complete());
        assert_eq!(
            anchors.missing,
            vec![MissingAnchor {
                purpose: AnchorPurpose::Revenue,
                code: "4100".to_string()
            }]
        );
        assert_eq!(anchors.unconfigured, vec![AnchorPurpose::SalesTax]);
        assert!(anchors.account_id(AnchorPurpose::Receivable).is_some());
    }

    #[tokio::test]
    async fn cost_account_falls_back_through_name_match_to_anchor() {
        let storage = MemoryStorage::new();
        let accounts = chart(&storage).await;
        let reader = storage.reader().await.unwrap();
        let anchors = resolve_anchors(&reader, "c1", &AnchorCodes::default())
            .await
            .unwrap();

        let matched = resolve_cost_account(&reader, "c1", &item("Terminal Handling", None), &anchors)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.account_id, accounts[1].id);
        assert_eq!(matched.source, ResolutionSource::NameMatch);

        let by_expense = resolve_cost_account(
            &reader,
            "c1",
            &item("Misc", Some("terminal handling")),
            &anchors,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(by_expense.account_id, accounts[1].id);

        let fallback = resolve_cost_account(&reader, "c1", &item("Fuel surcharge", None), &anchors)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fallback.account_id, accounts[0].id);
        assert_eq!(fallback.source, ResolutionSource::Anchor);
    }

    #[tokio::test]
    async fn explicit_cost_account_must_exist() {
        let storage = MemoryStorage::new();
        chart(&storage).await;
        let reader = storage.reader().await.unwrap();
        let anchors = ResolvedAnchors::default();

        let mut explicit = item("Terminal Handling", None);
        explicit.cost_account_id = Some("nope".to_string());
        let err = resolve_cost_account(&reader, "c1", &explicit, &anchors)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn vendor_and_customer_chains() {
        let storage = MemoryStorage::new();
        let accounts = chart(&storage).await;
        let maersk = Vendor::new("c1", "MAERSK LINE");
        let unknown = Vendor::new("c1", "Local Trucker");
        let linked = Customer::new("c1", "Acme").with_account(&accounts[4].id);
        let walk_in = Customer::new("c1", "Walk-in");
        let mut session = storage.begin().await.unwrap();
        session.save_vendor(&maersk).await.unwrap();
        session.save_vendor(&unknown).await.unwrap();
        session.save_customer(&linked).await.unwrap();
        session.save_customer(&walk_in).await.unwrap();
        session.commit().await.unwrap();

        let reader = storage.reader().await.unwrap();
        let anchors = resolve_anchors(&reader, "c1", &AnchorCodes::default())
            .await
            .unwrap();

        let by_name = resolve_vendor_account(&reader, "c1", Some(&maersk.id), &anchors)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.account_id, accounts[3].id);

        let anchor = resolve_vendor_account(&reader, "c1", Some(&unknown.id), &anchors)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(anchor.account_id, accounts[2].id);
        assert_eq!(anchor.source, ResolutionSource::Anchor);

        let none = resolve_vendor_account(&reader, "c1", None, &anchors)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(none.source, ResolutionSource::Anchor);

        let own = resolve_receivable(&reader, "c1", &linked.id, &anchors)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(own.source, ResolutionSource::Linked);
        let default = resolve_receivable(&reader, "c1", &walk_in.id, &anchors)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(default.account_id, accounts[4].id);
        assert_eq!(default.source, ResolutionSource::Anchor);
    }
}
