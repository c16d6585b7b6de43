//! Transaction posting and ledger queries

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::audit::{self, AuditEvent, AuditSink};
use crate::traits::*;
use crate::types::*;

/// Transaction manager: the only path by which entries reach storage
pub struct TransactionManager<S: LedgerStorage> {
    storage: S,
    validator: Box<dyn TransactionValidator>,
    audit: Arc<dyn AuditSink>,
}

impl<S: LedgerStorage> TransactionManager<S> {
    /// Create a new transaction manager
    pub fn new(storage: S, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultTransactionValidator),
            audit,
        }
    }

    /// Create a new transaction manager with custom validator
    pub fn with_validator(
        storage: S,
        validator: Box<dyn TransactionValidator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            storage,
            validator,
            audit,
        }
    }

    /// Run the configured validator over a set of lines
    pub fn validate_entries(&self, entries: &[EntryLine]) -> LedgerResult<()> {
        self.validator.validate_entries(entries)
    }

    /// Fails with `AccountNotFound` unless every line's account belongs to the company
    pub async fn ensure_accounts<R>(
        &self,
        session: &R,
        company_id: &str,
        entries: &[EntryLine],
    ) -> LedgerResult<()>
    where
        R: LedgerReader + ?Sized,
    {
        for entry in entries {
            if session
                .get_account(company_id, &entry.account_id)
                .await?
                .is_none()
            {
                return Err(LedgerError::AccountNotFound(entry.account_id.clone()));
            }
        }
        Ok(())
    }

    /// Post a transaction inside an open unit of work
    pub async fn post_in<W>(
        &self,
        session: &mut W,
        company_id: &str,
        new: NewTransaction,
    ) -> LedgerResult<Transaction>
    where
        W: LedgerWriter + ?Sized,
    {
        self.validator.validate_header(&new)?;
        self.validator.validate_entries(&new.entries)?;
        self.ensure_accounts(&*session, company_id, &new.entries)
            .await?;

        if session
            .get_transaction(company_id, &new.reference)
            .await?
            .is_some()
        {
            return Err(LedgerError::Conflict(format!(
                "reference '{}' is already posted",
                new.reference
            )));
        }

        let transaction = Transaction::from_new(company_id, new);
        session.insert_transaction(&transaction).await?;

        tracing::debug!(
            company_id,
            reference = %transaction.reference,
            entries = transaction.entries.len(),
            "Transaction staged"
        );

        Ok(transaction)
    }

    /// Swap the entries of a posted transaction, keeping its reference
    pub async fn replace_entries_in<W>(
        &self,
        session: &mut W,
        company_id: &str,
        reference: &str,
        date: NaiveDate,
        description: &str,
        entries: Vec<EntryLine>,
    ) -> LedgerResult<Transaction>
    where
        W: LedgerWriter + ?Sized,
    {
        self.validator.validate_entries(&entries)?;
        self.ensure_accounts(&*session, company_id, &entries).await?;

        let mut transaction = session
            .get_transaction(company_id, reference)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;

        transaction.date = date;
        transaction.description = description.to_string();
        transaction.replace_entries(entries);
        session.update_transaction(&transaction).await?;

        Ok(transaction)
    }

    /// Delete the transaction carrying `reference`, if any
    pub async fn reverse_in<W>(
        &self,
        session: &mut W,
        company_id: &str,
        reference: &str,
    ) -> LedgerResult<Option<Transaction>>
    where
        W: LedgerWriter + ?Sized,
    {
        session.delete_transaction(company_id, reference).await
    }

    /// Delete every transaction whose reference starts with `prefix`
    pub async fn reverse_prefix_in<W>(
        &self,
        session: &mut W,
        company_id: &str,
        prefix: &str,
    ) -> LedgerResult<Vec<Transaction>>
    where
        W: LedgerWriter + ?Sized,
    {
        let mut removed = Vec::new();
        for reference in session.list_references(company_id, prefix).await? {
            if let Some(transaction) = session.delete_transaction(company_id, &reference).await? {
                removed.push(transaction);
            }
        }
        Ok(removed)
    }

    /// Post a standalone transaction in its own unit of work
    pub async fn post(&self, actor: &Actor, new: NewTransaction) -> LedgerResult<Transaction> {
        actor.require(LEDGER_ROLES, "post transactions")?;

        let mut session = self.storage.begin().await?;
        let issued = session
            .document_numbers(&actor.company_id, &new.reference)
            .await?
            .contains(&new.reference);
        if issued {
            return Err(LedgerError::Conflict(format!(
                "reference '{}' belongs to an issued voucher or invoice",
                new.reference
            )));
        }
        let transaction = self.post_in(&mut session, &actor.company_id, new).await?;
        session.commit().await?;

        tracing::info!(
            company_id = %actor.company_id,
            reference = %transaction.reference,
            total = %transaction.total_debits(),
            "Transaction posted"
        );
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                "POST",
                "transactions",
                &transaction.id,
                serde_json::json!({ "reference": transaction.reference }),
            ),
        );

        Ok(transaction)
    }

    /// Remove a transaction and its entries in its own unit of work
    pub async fn reverse(&self, actor: &Actor, reference: &str) -> LedgerResult<Transaction> {
        actor.require(LEDGER_ROLES, "reverse transactions")?;

        let mut session = self.storage.begin().await?;
        let transaction = self
            .reverse_in(&mut session, &actor.company_id, reference)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;
        session.commit().await?;

        tracing::info!(
            company_id = %actor.company_id,
            reference,
            "Transaction reversed"
        );
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                "REVERSE",
                "transactions",
                &transaction.id,
                serde_json::json!({ "reference": reference }),
            ),
        );

        Ok(transaction)
    }

    /// Get a transaction by reference
    pub async fn get_transaction(
        &self,
        company_id: &str,
        reference: &str,
    ) -> LedgerResult<Option<Transaction>> {
        self.storage
            .reader()
            .await?
            .get_transaction(company_id, reference)
            .await
    }

    /// Get all transactions within a date range
    pub async fn get_transactions(
        &self,
        company_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<Transaction>> {
        self.storage
            .reader()
            .await?
            .list_transactions(company_id, start_date, end_date)
            .await
    }

    /// Raw `debit - credit` balance of an account up to and including `as_of_date`
    pub async fn account_balance(
        &self,
        company_id: &str,
        account_id: &str,
        as_of_date: Option<NaiveDate>,
    ) -> LedgerResult<BigDecimal> {
        let reader = self.storage.reader().await?;
        if reader.get_account(company_id, account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }
        let balances = raw_balances(&reader, company_id, None, as_of_date).await?;
        Ok(balances
            .get(account_id)
            .cloned()
            .unwrap_or_else(|| BigDecimal::from(0)))
    }

    /// Entry-by-entry movement of one account with a running raw balance
    pub async fn account_statement(
        &self,
        company_id: &str,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<AccountStatement> {
        let reader = self.storage.reader().await?;
        let account = reader
            .get_account(company_id, account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        let opening_balance = match start_date.and_then(|d| d.pred_opt()) {
            Some(day_before) => raw_balances(&reader, company_id, None, Some(day_before))
                .await?
                .remove(account_id)
                .unwrap_or_else(|| BigDecimal::from(0)),
            None => BigDecimal::from(0),
        };

        let mut running = opening_balance.clone();
        let mut lines = Vec::new();
        for transaction in reader
            .list_transactions(company_id, start_date, end_date)
            .await?
        {
            for entry in transaction
                .entries
                .iter()
                .filter(|e| e.account_id == account_id)
            {
                running += &entry.debit;
                running -= &entry.credit;
                lines.push(StatementEntry {
                    date: transaction.date,
                    reference: transaction.reference.clone(),
                    description: entry
                        .description
                        .clone()
                        .unwrap_or_else(|| transaction.description.clone()),
                    debit: entry.debit.clone(),
                    credit: entry.credit.clone(),
                    running_balance: running.clone(),
                });
            }
        }

        Ok(AccountStatement {
            account,
            opening_balance,
            closing_balance: running,
            lines,
        })
    }
}

/// Raw `debit - credit` per account id for transactions dated within the range
pub(crate) async fn raw_balances<R>(
    reader: &R,
    company_id: &str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> LedgerResult<HashMap<String, BigDecimal>>
where
    R: LedgerReader + ?Sized,
{
    let mut balances: HashMap<String, BigDecimal> = HashMap::new();
    for transaction in reader
        .list_transactions(company_id, start_date, end_date)
        .await?
    {
        for entry in transaction.entries {
            let balance = balances
                .entry(entry.account_id)
                .or_insert_with(|| BigDecimal::from(0));
            *balance += entry.debit;
            *balance -= entry.credit;
        }
    }
    Ok(balances)
}

/// Ledger view of a single account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatement {
    pub account: Account,
    pub opening_balance: BigDecimal,
    pub closing_balance: BigDecimal,
    pub lines: Vec<StatementEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    pub date: NaiveDate,
    pub reference: String,
    pub description: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub running_balance: BigDecimal,
}

/// Transaction builder for assembling postings
#[derive(Debug)]
pub struct TransactionBuilder {
    transaction: NewTransaction,
}

impl TransactionBuilder {
    /// Create a new transaction builder
    pub fn new(reference: &str, date: NaiveDate, description: &str) -> Self {
        Self {
            transaction: NewTransaction {
                reference: reference.to_string(),
                date,
                description: description.to_string(),
                kind: TransactionKind::Journal,
                entries: Vec::new(),
            },
        }
    }

    /// Set what produced the transaction
    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.transaction.kind = kind;
        self
    }

    /// Add a debit entry
    pub fn debit(mut self, account_id: &str, amount: BigDecimal, description: Option<String>) -> Self {
        self.transaction
            .entries
            .push(EntryLine::debit(account_id, amount, description));
        self
    }

    /// Add a credit entry
    pub fn credit(
        mut self,
        account_id: &str,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Self {
        self.transaction
            .entries
            .push(EntryLine::credit(account_id, amount, description));
        self
    }

    /// Add a custom entry
    pub fn entry(mut self, entry: EntryLine) -> Self {
        self.transaction.entries.push(entry);
        self
    }

    /// Build the transaction, checking the double-entry rules
    pub fn build(self) -> LedgerResult<NewTransaction> {
        DefaultTransactionValidator.validate_entries(&self.transaction.entries)?;
        Ok(self.transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    #[test]
    fn builder_accepts_balanced_journal() {
        let txn = TransactionBuilder::new("JV-2025-0001", date(), "Opening")
            .debit("cash", BigDecimal::from(500), None)
            .credit("capital", BigDecimal::from(500), None)
            .build()
            .unwrap();
        assert_eq!(txn.entries.len(), 2);
        assert_eq!(txn.kind, TransactionKind::Journal);
    }

    #[test]
    fn builder_rejects_unbalanced_and_single_line() {
        let unbalanced = TransactionBuilder::new("JV-1", date(), "x")
            .debit("cash", BigDecimal::from(1000), None)
            .credit("revenue", BigDecimal::from(500), None)
            .build();
        assert!(matches!(unbalanced, Err(LedgerError::Validation(_))));

        let single = TransactionBuilder::new("JV-2", date(), "x")
            .debit("cash", BigDecimal::from(0), None)
            .build();
        assert!(matches!(single, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn builder_rejects_negative_amounts() {
        let result = TransactionBuilder::new("JV-3", date(), "x")
            .debit("cash", BigDecimal::from(-5), None)
            .credit("revenue", BigDecimal::from(-5), None)
            .build();
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn one_cent_rounding_difference_is_tolerated() {
        let result = TransactionBuilder::new("JV-4", date(), "x")
            .debit("cash", BigDecimal::from_str("333.34").unwrap(), None)
            .credit("revenue", BigDecimal::from_str("333.33").unwrap(), None)
            .build();
        assert!(result.is_ok());
    }

    proptest! {
        #[test]
        fn accepted_postings_stay_within_tolerance(
            debits in proptest::collection::vec(0i64..1_000_000, 1..6),
            credits in proptest::collection::vec(0i64..1_000_000, 1..6),
        ) {
            let mut builder = TransactionBuilder::new("P-1", date(), "generated");
            for cents in &debits {
                builder = builder.debit("dr", BigDecimal::new((*cents).into(), 2), None);
            }
            for cents in &credits {
                builder = builder.credit("cr", BigDecimal::new((*cents).into(), 2), None);
            }

            let debit_total: i64 = debits.iter().sum();
            let credit_total: i64 = credits.iter().sum();
            let result = builder.build();

            prop_assert_eq!(result.is_ok(), (debit_total - credit_total).abs() <= 1);
            if let Ok(txn) = result {
                let diff = total_debits(&txn.entries) - total_credits(&txn.entries);
                prop_assert!(diff.abs() <= balance_tolerance());
            }
        }
    }
}
