//! Chart of accounts management

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::audit::{self, AuditEvent, AuditSink};
use crate::traits::*;
use crate::types::*;

/// Account manager for handling chart of accounts operations
pub struct AccountManager<S: LedgerStorage> {
    storage: S,
    validator: Box<dyn AccountValidator>,
    audit: Arc<dyn AuditSink>,
}

impl<S: LedgerStorage> AccountManager<S> {
    /// Create a new account manager
    pub fn new(storage: S, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultAccountValidator),
            audit,
        }
    }

    /// Create a new account manager with custom validator
    pub fn with_validator(
        storage: S,
        validator: Box<dyn AccountValidator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            storage,
            validator,
            audit,
        }
    }

    /// Create a new account
    pub async fn create_account(&self, actor: &Actor, new: NewAccount) -> LedgerResult<Account> {
        actor.require(LEDGER_ROLES, "change the chart of accounts")?;
        let company_id = actor.company_id.as_str();
        let account = Account::new(company_id, new);
        self.validator.validate_account(&account)?;

        let mut session = self.storage.begin().await?;

        if session
            .find_account_by_code(company_id, &account.code)
            .await?
            .is_some()
        {
            return Err(LedgerError::Conflict(format!(
                "Account with code '{}' already exists",
                account.code
            )));
        }

        if let Some(ref parent_id) = account.parent_id {
            if session.get_account(company_id, parent_id).await?.is_none() {
                return Err(LedgerError::AccountNotFound(parent_id.clone()));
            }
        }

        session.save_account(&account).await?;
        session.commit().await?;

        tracing::info!(company_id, code = %account.code, "Account created");
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                "CREATE",
                "accounts",
                &account.id,
                serde_json::json!({ "code": account.code, "type": account.account_type }),
            ),
        );

        Ok(account)
    }

    /// Get an account by ID
    pub async fn get_account(
        &self,
        company_id: &str,
        account_id: &str,
    ) -> LedgerResult<Option<Account>> {
        self.storage
            .reader()
            .await?
            .get_account(company_id, account_id)
            .await
    }

    /// Get an account by code
    pub async fn get_account_by_code(
        &self,
        company_id: &str,
        code: &str,
    ) -> LedgerResult<Option<Account>> {
        self.storage
            .reader()
            .await?
            .find_account_by_code(company_id, code)
            .await
    }

    /// List all accounts in insertion order
    pub async fn list_accounts(&self, company_id: &str) -> LedgerResult<Vec<Account>> {
        self.storage.reader().await?.list_accounts(company_id).await
    }

    /// Chart of accounts as a parent -> children tree
    pub async fn account_tree(&self, company_id: &str) -> LedgerResult<Vec<AccountNode>> {
        Ok(build_tree(self.list_accounts(company_id).await?))
    }

    /// Change an account's type; refused once any entry references the account
    pub async fn change_account_type(
        &self,
        actor: &Actor,
        account_id: &str,
        account_type: AccountType,
    ) -> LedgerResult<Account> {
        actor.require(LEDGER_ROLES, "change the chart of accounts")?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let mut account = session
            .get_account(company_id, account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        if account.account_type == account_type {
            return Ok(account);
        }

        let entries = session.count_account_entries(company_id, account_id).await?;
        if entries > 0 {
            return Err(LedgerError::Conflict(format!(
                "Account '{}' has {} ledger entries; its type is fixed",
                account.code, entries
            )));
        }

        let previous = account.account_type;
        account.account_type = account_type;
        account.updated_at = now();
        session.save_account(&account).await?;
        session.commit().await?;

        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                "UPDATE_TYPE",
                "accounts",
                &account.id,
                serde_json::json!({ "from": previous, "to": account_type }),
            ),
        );

        Ok(account)
    }

    /// Delete an account that has no children and no entries
    pub async fn delete_account(&self, actor: &Actor, account_id: &str) -> LedgerResult<()> {
        actor.require(LEDGER_ROLES, "change the chart of accounts")?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let account = session
            .get_account(company_id, account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        let has_children = session
            .list_accounts(company_id)
            .await?
            .iter()
            .any(|a| a.parent_id.as_deref() == Some(account_id));
        if has_children {
            return Err(LedgerError::Conflict(format!(
                "Account '{}' has child accounts",
                account.code
            )));
        }

        if session.count_account_entries(company_id, account_id).await? > 0 {
            return Err(LedgerError::Conflict(format!(
                "Account '{}' has ledger entries",
                account.code
            )));
        }

        session.delete_account(company_id, account_id).await?;
        session.commit().await?;

        tracing::info!(company_id, code = %account.code, "Account deleted");
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                "DELETE",
                "accounts",
                account_id,
                serde_json::json!({ "code": account.code }),
            ),
        );

        Ok(())
    }

    /// Propose the next unused child code under `parent_id`
    pub async fn suggest_next_code(&self, company_id: &str, parent_id: &str) -> LedgerResult<String> {
        let accounts = self.list_accounts(company_id).await?;
        let parent = accounts
            .iter()
            .find(|a| a.id == parent_id)
            .ok_or_else(|| LedgerError::AccountNotFound(parent_id.to_string()))?;

        let siblings: Vec<&str> = accounts
            .iter()
            .filter(|a| a.parent_id.as_deref() == Some(parent_id))
            .map(|a| a.code.as_str())
            .collect();
        let taken: HashSet<&str> = accounts.iter().map(|a| a.code.as_str()).collect();

        suggest_code(&parent.code, &siblings, &taken)
    }
}

/// Account with its children, for hierarchical display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountNode {
    pub account: Account,
    pub children: Vec<AccountNode>,
}

impl AccountNode {
    /// Header accounts group others and normally receive no postings
    pub fn is_header(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Build the parent -> children tree, keeping insertion order at every level
pub fn build_tree(accounts: Vec<Account>) -> Vec<AccountNode> {
    let ids: HashSet<String> = accounts.iter().map(|a| a.id.clone()).collect();

    fn attach(parent_id: Option<&str>, accounts: &[Account], ids: &HashSet<String>) -> Vec<AccountNode> {
        accounts
            .iter()
            .filter(|a| match parent_id {
                Some(parent) => a.parent_id.as_deref() == Some(parent),
                // Orphans whose parent is missing are shown as roots
                None => a.parent_id.as_ref().is_none_or(|p| !ids.contains(p)),
            })
            .map(|a| AccountNode {
                account: a.clone(),
                children: attach(Some(&a.id), accounts, ids),
            })
            .collect()
    }

    attach(None, &accounts, &ids)
}

/// Suffix appended to a parent code that has no trailing zero to count from
const CHILD_SUFFIX: &str = "01";

/// Code suggestion rule.
///
/// With siblings, the highest sibling's trailing digits are incremented keeping
/// their width. Without siblings, a parent ending in zero counts up from itself
/// ("1000" -> "1001"), any other parent gets [`CHILD_SUFFIX`] appended.
/// Candidates already taken anywhere in the company are skipped.
pub fn suggest_code(
    parent_code: &str,
    siblings: &[&str],
    taken: &HashSet<&str>,
) -> LedgerResult<String> {
    let highest = siblings
        .iter()
        .copied()
        .max_by(|a, b| {
            numeric_value(a)
                .cmp(&numeric_value(b))
                .then_with(|| a.cmp(b))
        });

    let mut candidate = match highest {
        Some(code) => increment_code(code)?,
        None if parent_code.ends_with('0') => increment_code(parent_code)?,
        None => format!("{parent_code}{CHILD_SUFFIX}"),
    };

    while taken.contains(candidate.as_str()) {
        candidate = increment_code(&candidate)?;
    }

    Ok(candidate)
}

fn numeric_value(code: &str) -> Option<u128> {
    code.parse().ok()
}

/// Increment the trailing digits of a code, preserving zero padding
fn increment_code(code: &str) -> LedgerResult<String> {
    let head = code.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &code[head.len()..];
    if digits.is_empty() {
        return Err(LedgerError::Validation(format!(
            "account code '{code}' has no numeric suffix"
        )));
    }

    let next = digits
        .parse::<u128>()
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| LedgerError::Validation(format!("account code '{code}' overflows")))?;

    Ok(format!("{head}{next:0width$}", width = digits.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1000", &[], "1001")]
    #[case("1000", &["1001", "1002"], "1003")]
    #[case("1000", &["1009", "1002"], "1010")]
    #[case("1231", &[], "123101")]
    #[case("1231", &["123101"], "123102")]
    #[case("5100", &["5100-09"], "5100-10")]
    fn suggests_next_child_code(
        #[case] parent: &str,
        #[case] siblings: &[&str],
        #[case] expected: &str,
    ) {
        let taken: HashSet<&str> = siblings.iter().copied().chain([parent]).collect();
        assert_eq!(suggest_code(parent, siblings, &taken).unwrap(), expected);
    }

    #[test]
    fn skips_codes_used_elsewhere_in_the_chart() {
        let taken: HashSet<&str> = ["1000", "1001", "1002"].into_iter().collect();
        assert_eq!(suggest_code("1000", &[], &taken).unwrap(), "1003");
    }

    #[test]
    fn tree_preserves_insertion_order_and_marks_headers() {
        let assets = Account::new("c1", NewAccount::new("1000", "Assets", AccountType::Asset));
        let bank = Account::new(
            "c1",
            NewAccount::new("1100", "Bank", AccountType::Asset).under(&assets.id),
        );
        let cash = Account::new(
            "c1",
            NewAccount::new("1050", "Cash", AccountType::Asset).under(&assets.id),
        );
        let revenue = Account::new("c1", NewAccount::new("4000", "Revenue", AccountType::Revenue));

        let tree = build_tree(vec![assets, bank, cash, revenue]);
        assert_eq!(tree.len(), 2);
        assert!(tree[0].is_header());
        let children: Vec<&str> = tree[0]
            .children
            .iter()
            .map(|n| n.account.code.as_str())
            .collect();
        assert_eq!(children, vec!["1100", "1050"]);
        assert!(!tree[1].is_header());
    }
}
