//! Main ledger orchestrator that wires the registry, posting engines and reports

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::PostingConfig;
use crate::invoice::{
    resolve_anchors, ApprovalOutcome, Customer, Invoice, InvoiceManager, Job, NewInvoice,
    ResolvedAnchors, RevertOutcome, Vendor,
};
use crate::ledger::{AccountManager, AccountNode, TransactionManager};
use crate::reports::{BalanceSheet, ProfitAndLoss, ReportCompiler, TrialBalance};
use crate::traits::*;
use crate::types::*;
use crate::voucher::{NewVoucher, Voucher, VoucherDeletion, VoucherManager};

/// Main ledger system that orchestrates all accounting operations
pub struct Ledger<S: LedgerStorage> {
    storage: S,
    accounts: AccountManager<S>,
    transactions: Arc<TransactionManager<S>>,
    vouchers: VoucherManager<S>,
    invoices: InvoiceManager<S>,
    reports: ReportCompiler<S>,
}

impl<S: LedgerStorage> Ledger<S> {
    /// Create a ledger that audits through `tracing`
    pub fn new(storage: S, config: PostingConfig) -> Self {
        Self::with_audit(storage, config, Arc::new(TracingAuditSink))
    }

    /// Create a ledger with a custom audit sink
    pub fn with_audit(storage: S, config: PostingConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self::with_validators(
            storage,
            config,
            audit,
            Box::new(DefaultAccountValidator),
            Box::new(DefaultTransactionValidator),
        )
    }

    /// Create a ledger with custom validators
    pub fn with_validators(
        storage: S,
        config: PostingConfig,
        audit: Arc<dyn AuditSink>,
        account_validator: Box<dyn AccountValidator>,
        transaction_validator: Box<dyn TransactionValidator>,
    ) -> Self {
        let transactions = Arc::new(TransactionManager::with_validator(
            storage.clone(),
            transaction_validator,
            audit.clone(),
        ));
        Self {
            accounts: AccountManager::with_validator(
                storage.clone(),
                account_validator,
                audit.clone(),
            ),
            vouchers: VoucherManager::new(storage.clone(), transactions.clone(), audit.clone()),
            invoices: InvoiceManager::new(storage.clone(), transactions.clone(), config, audit),
            reports: ReportCompiler::new(storage.clone()),
            transactions,
            storage,
        }
    }

    pub fn accounts(&self) -> &AccountManager<S> {
        &self.accounts
    }

    pub fn transactions(&self) -> &TransactionManager<S> {
        &self.transactions
    }

    pub fn vouchers(&self) -> &VoucherManager<S> {
        &self.vouchers
    }

    pub fn invoices(&self) -> &InvoiceManager<S> {
        &self.invoices
    }

    pub fn reports(&self) -> &ReportCompiler<S> {
        &self.reports
    }

    pub fn config(&self) -> &PostingConfig {
        self.invoices.config()
    }

    // Chart of accounts
    pub async fn create_account(&self, actor: &Actor, new: NewAccount) -> LedgerResult<Account> {
        self.accounts.create_account(actor, new).await
    }

    pub async fn list_accounts(&self, company_id: &str) -> LedgerResult<Vec<Account>> {
        self.accounts.list_accounts(company_id).await
    }

    pub async fn account_tree(&self, company_id: &str) -> LedgerResult<Vec<AccountNode>> {
        self.accounts.account_tree(company_id).await
    }

    pub async fn suggest_next_code(&self, company_id: &str, parent_id: &str) -> LedgerResult<String> {
        self.accounts.suggest_next_code(company_id, parent_id).await
    }

    pub async fn delete_account(&self, actor: &Actor, account_id: &str) -> LedgerResult<()> {
        self.accounts.delete_account(actor, account_id).await
    }

    /// Resolve the company's anchor map, reporting codes that match no account
    pub async fn check_anchors(&self, company_id: &str) -> LedgerResult<ResolvedAnchors> {
        let reader = self.storage.reader().await?;
        let anchors =
            resolve_anchors(&reader, company_id, self.config().anchors_for(company_id)).await?;
        for missing in &anchors.missing {
            tracing::warn!(
                company_id,
                purpose = %missing.purpose,
                code = %missing.code,
                "Anchor account code does not resolve"
            );
        }
        for purpose in &anchors.unconfigured {
            tracing::warn!(
                company_id,
                purpose = %purpose,
                "No anchor account configured; postings that need it follow the missing-anchor policy"
            );
        }
        Ok(anchors)
    }

    // Ledger core
    pub async fn post_transaction(&self, actor: &Actor, new: NewTransaction) -> LedgerResult<Transaction> {
        self.transactions.post(actor, new).await
    }

    pub async fn reverse_transaction(&self, actor: &Actor, reference: &str) -> LedgerResult<Transaction> {
        self.transactions.reverse(actor, reference).await
    }

    pub async fn account_balance(
        &self,
        company_id: &str,
        account_id: &str,
        as_of_date: Option<NaiveDate>,
    ) -> LedgerResult<BigDecimal> {
        self.transactions
            .account_balance(company_id, account_id, as_of_date)
            .await
    }

    // Vouchers
    pub async fn create_voucher(&self, actor: &Actor, new: NewVoucher) -> LedgerResult<Voucher> {
        self.vouchers.create(actor, new).await
    }

    pub async fn delete_voucher(&self, actor: &Actor, voucher_id: &str) -> LedgerResult<VoucherDeletion> {
        self.vouchers.delete(actor, voucher_id).await
    }

    // Invoices
    pub async fn create_invoice(&self, actor: &Actor, new: NewInvoice) -> LedgerResult<Invoice> {
        self.invoices.create(actor, new).await
    }

    pub async fn approve_invoice(&self, actor: &Actor, invoice_id: &str) -> LedgerResult<ApprovalOutcome> {
        self.invoices.approve(actor, invoice_id).await
    }

    pub async fn revert_invoice(&self, actor: &Actor, invoice_id: &str) -> LedgerResult<RevertOutcome> {
        self.invoices.revert_to_draft(actor, invoice_id).await
    }

    // Records owned by neighbouring modules
    pub async fn register_customer(&self, customer: &Customer) -> LedgerResult<()> {
        let mut session = self.storage.begin().await?;
        session.save_customer(customer).await?;
        session.commit().await
    }

    pub async fn register_vendor(&self, vendor: &Vendor) -> LedgerResult<()> {
        let mut session = self.storage.begin().await?;
        session.save_vendor(vendor).await?;
        session.commit().await
    }

    pub async fn register_job(&self, job: &Job) -> LedgerResult<()> {
        let mut session = self.storage.begin().await?;
        session.save_job(job).await?;
        session.commit().await
    }

    // Statements
    pub async fn trial_balance(&self, company_id: &str, as_of_date: NaiveDate) -> LedgerResult<TrialBalance> {
        self.reports.trial_balance(company_id, as_of_date).await
    }

    pub async fn profit_and_loss(
        &self,
        company_id: &str,
        from_date: Option<NaiveDate>,
        as_of_date: NaiveDate,
    ) -> LedgerResult<ProfitAndLoss> {
        self.reports
            .profit_and_loss(company_id, from_date, as_of_date)
            .await
    }

    pub async fn balance_sheet(&self, company_id: &str, as_of_date: NaiveDate) -> LedgerResult<BalanceSheet> {
        self.reports.balance_sheet(company_id, as_of_date).await
    }

    /// Validate the integrity of the ledger
    pub async fn validate_integrity(
        &self,
        company_id: &str,
        as_of_date: NaiveDate,
    ) -> LedgerResult<LedgerIntegrityReport> {
        let trial_balance = self.trial_balance(company_id, as_of_date).await?;
        let balance_sheet = self.balance_sheet(company_id, as_of_date).await?;
        let transactions = self
            .transactions
            .get_transactions(company_id, None, Some(as_of_date))
            .await?;

        let mut issues = Vec::new();

        for transaction in transactions.iter().filter(|t| !t.is_balanced()) {
            issues.push(format!(
                "Transaction {} is not balanced: debits = {}, credits = {}",
                transaction.reference,
                transaction.total_debits(),
                transaction.total_credits()
            ));
        }

        if !trial_balance.is_balanced {
            issues.push(format!(
                "Trial balance is not balanced: debits = {}, credits = {}",
                trial_balance.total_debits, trial_balance.total_credits
            ));
        }

        let total_claims = &balance_sheet.total_liabilities
            + &balance_sheet.total_equity
            + &balance_sheet.current_net_profit;

        if !balance_sheet.is_balanced {
            issues.push(format!(
                "Balance sheet is not balanced: assets = {}, liabilities + equity + profit = {}",
                balance_sheet.total_assets, total_claims
            ));
        }

        Ok(LedgerIntegrityReport {
            as_of_date,
            is_valid: issues.is_empty(),
            issues,
            trial_balance_total_debits: trial_balance.total_debits,
            trial_balance_total_credits: trial_balance.total_credits,
            balance_sheet_total_assets: balance_sheet.total_assets,
            balance_sheet_total_claims: total_claims,
        })
    }
}

/// Report on ledger integrity and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub as_of_date: NaiveDate,
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub trial_balance_total_debits: BigDecimal,
    pub trial_balance_total_credits: BigDecimal,
    pub balance_sheet_total_assets: BigDecimal,
    /// Liabilities plus equity plus current profit
    pub balance_sheet_total_claims: BigDecimal,
}
