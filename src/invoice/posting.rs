//! Invoice lifecycle and the postings approval produces.
//!
//! Approving a draft posts one sale transaction (receivable against revenue and
//! sales tax) under the invoice number and, for freight invoices, one cost
//! transaction per item under `{number}-COST-{item id}`. Reverting removes
//! exactly those references. Each operation is one unit of work.

use bigdecimal::BigDecimal;
use std::sync::Arc;

use crate::audit::{self, AuditEvent, AuditSink};
use crate::config::{AnchorPurpose, MissingAnchorPolicy, PostingConfig};
use crate::invoice::resolution::{
    resolve_anchors, resolve_cost_account, resolve_receivable, resolve_vendor_account,
    ResolvedAnchors,
};
use crate::invoice::{
    validate_items, Invoice, InvoiceStatus, InvoiceUpdate, JobStatus, NewInvoice,
};
use crate::ledger::TransactionManager;
use crate::numbering;
use crate::traits::*;
use crate::types::*;

/// Roles allowed to raise and edit invoices
pub const INVOICE_EDIT_ROLES: &[Role] = &[Role::Admin, Role::Accounts, Role::Operations];

/// A posting approval left out because an anchor account was unavailable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPosting {
    pub reference: String,
    pub missing: AnchorPurpose,
}

/// Everything an approval wrote
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub invoice: Invoice,
    pub primary: Option<Transaction>,
    pub costs: Vec<Transaction>,
    pub skipped: Vec<SkippedPosting>,
}

/// Everything a revert removed
#[derive(Debug, Clone)]
pub struct RevertOutcome {
    pub invoice: Invoice,
    pub reversed: Vec<Transaction>,
}

pub struct InvoiceManager<S: LedgerStorage> {
    storage: S,
    transactions: Arc<TransactionManager<S>>,
    config: PostingConfig,
    audit: Arc<dyn AuditSink>,
}

impl<S: LedgerStorage> InvoiceManager<S> {
    pub fn new(
        storage: S,
        transactions: Arc<TransactionManager<S>>,
        config: PostingConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            storage,
            transactions,
            config,
            audit,
        }
    }

    pub fn config(&self) -> &PostingConfig {
        &self.config
    }

    /// Raise a draft invoice
    pub async fn create(&self, actor: &Actor, new: NewInvoice) -> LedgerResult<Invoice> {
        actor.require(INVOICE_EDIT_ROLES, "create invoices")?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;

        let job = match new.job_id {
            Some(ref job_id) => {
                let job = session
                    .get_job(company_id, job_id)
                    .await?
                    .ok_or_else(|| LedgerError::NotFound(format!("Job {job_id}")))?;
                if job.is_locked() {
                    return Err(LedgerError::Conflict(format!(
                        "job {} is locked by an approved invoice",
                        job.job_number
                    )));
                }
                Some(job)
            }
            None => None,
        };

        let customer_id = new
            .customer_id
            .clone()
            .or_else(|| job.as_ref().map(|j| j.customer_id.clone()))
            .ok_or_else(|| LedgerError::Validation("An invoice needs a customer".to_string()))?;
        if session.get_customer(company_id, &customer_id).await?.is_none() {
            return Err(LedgerError::NotFound(format!("Customer {customer_id}")));
        }

        let items = match (&job, new.items.is_empty()) {
            (Some(job), true) => job.invoice_items(),
            _ => new.items,
        };
        validate_items(&items, &new.tax_amount)?;

        let document = new.kind.document_kind();
        let invoice_number = match job {
            Some(ref job) if document.derives_from_job() => {
                numbering::derive_from_job(document, &job.job_number)?
            }
            _ => {
                numbering::allocate(&session, company_id, document, new.date)
                    .await?
                    .number
            }
        };

        let now = now();
        let mut invoice = Invoice {
            id: new_id(),
            company_id: company_id.to_string(),
            invoice_number,
            kind: new.kind,
            date: new.date,
            customer_id,
            job_id: new.job_id,
            items: Vec::new(),
            total_amount: BigDecimal::from(0),
            tax_amount: BigDecimal::from(0),
            grand_total: BigDecimal::from(0),
            currency_code: new.currency_code,
            usd_rate: new.usd_rate,
            exchange_rate: new.exchange_rate,
            is_approved: false,
            status: InvoiceStatus::Draft,
            transaction_id: None,
            created_by_id: actor.user_id.clone(),
            created_at: now,
            updated_at: now,
        };
        invoice.set_items(items, new.tax_amount);

        session.save_invoice(&invoice).await?;
        session.commit().await?;

        tracing::info!(
            company_id,
            invoice_number = %invoice.invoice_number,
            grand_total = %invoice.grand_total,
            "Invoice created"
        );
        self.emit(actor, "CREATE", &invoice, serde_json::json!({
            "invoice_number": invoice.invoice_number,
            "grand_total": invoice.grand_total.to_string(),
        }));

        Ok(invoice)
    }

    /// Edit a draft invoice
    pub async fn update(
        &self,
        actor: &Actor,
        invoice_id: &str,
        update: InvoiceUpdate,
    ) -> LedgerResult<Invoice> {
        actor.require(INVOICE_EDIT_ROLES, "edit invoices")?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let mut invoice = load(&session, company_id, invoice_id).await?;
        ensure_editable(&invoice)?;

        if let Some(ref customer_id) = update.customer_id {
            if session.get_customer(company_id, customer_id).await?.is_none() {
                return Err(LedgerError::NotFound(format!("Customer {customer_id}")));
            }
            invoice.customer_id = customer_id.clone();
        }
        if let Some(date) = update.date {
            invoice.date = date;
        }
        if update.usd_rate.is_some() {
            invoice.usd_rate = update.usd_rate;
        }
        if update.exchange_rate.is_some() {
            invoice.exchange_rate = update.exchange_rate;
        }
        if update.items.is_some() || update.tax_amount.is_some() {
            let tax_amount = update
                .tax_amount
                .unwrap_or_else(|| invoice.tax_amount.clone());
            let items = match update.items {
                Some(items) => items,
                None => invoice.items.iter().cloned().map(Into::into).collect(),
            };
            validate_items(&items, &tax_amount)?;
            invoice.set_items(items, tax_amount);
        }
        invoice.updated_at = now();

        session.save_invoice(&invoice).await?;
        session.commit().await?;

        tracing::info!(
            company_id,
            invoice_number = %invoice.invoice_number,
            "Invoice updated"
        );
        self.emit(actor, "UPDATE", &invoice, serde_json::json!({
            "grand_total": invoice.grand_total.to_string(),
        }));

        Ok(invoice)
    }

    /// Approve a draft invoice and post its sale and cost transactions
    pub async fn approve(&self, actor: &Actor, invoice_id: &str) -> LedgerResult<ApprovalOutcome> {
        actor.require(LEDGER_ROLES, "approve invoices")?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let mut invoice = load(&session, company_id, invoice_id).await?;
        if invoice.is_approved {
            return Err(LedgerError::Conflict(format!(
                "invoice {} is already approved",
                invoice.invoice_number
            )));
        }
        if invoice.status != InvoiceStatus::Draft {
            return Err(LedgerError::Conflict(format!(
                "invoice {} is {:?}, only drafts can be approved",
                invoice.invoice_number, invoice.status
            )));
        }

        if let Some(ref job_id) = invoice.job_id {
            if let Some(job) = session.get_job(company_id, job_id).await? {
                if job.is_locked() {
                    return Err(LedgerError::Conflict(format!(
                        "job {} is locked by another approved invoice",
                        job.job_number
                    )));
                }
            }
        }

        let anchors =
            resolve_anchors(&session, company_id, self.config.anchors_for(company_id)).await?;
        let mut skipped = Vec::new();

        let primary = self
            .post_sale(&mut session, &invoice, &anchors, &mut skipped)
            .await?;
        invoice.transaction_id = primary.as_ref().map(|t| t.id.clone());

        let mut costs = Vec::new();
        if invoice.kind.books_costs() {
            for item in &invoice.items {
                if item.amount <= BigDecimal::from(0) {
                    continue;
                }
                let reference = invoice.cost_reference(&item.id);

                let cost = resolve_cost_account(&session, company_id, item, &anchors).await?;
                let payable =
                    resolve_vendor_account(&session, company_id, item.vendor_id.as_deref(), &anchors)
                        .await?;
                let (cost, payable) = match (cost, payable) {
                    (Some(cost), Some(payable)) => (cost, payable),
                    (None, _) => {
                        self.missing_anchor(&reference, AnchorPurpose::Cost, &mut skipped)?;
                        continue;
                    }
                    (_, None) => {
                        self.missing_anchor(&reference, AnchorPurpose::Payable, &mut skipped)?;
                        continue;
                    }
                };

                let posting = NewTransaction {
                    reference,
                    date: invoice.date,
                    description: format!("Cost of {} on {}", item.description, invoice.invoice_number),
                    kind: TransactionKind::Cost,
                    entries: vec![
                        EntryLine::debit(&cost.account_id, item.amount.clone(), Some(item.description.clone())),
                        EntryLine::credit(&payable.account_id, item.amount.clone(), Some(item.description.clone())),
                    ],
                };
                costs.push(
                    self.transactions
                        .post_in(&mut session, company_id, posting)
                        .await?,
                );
            }
        }

        invoice.is_approved = true;
        invoice.status = InvoiceStatus::Sent;
        invoice.updated_at = now();
        session.save_invoice(&invoice).await?;
        set_job_status(&mut session, &invoice, JobStatus::Locked).await?;
        session.commit().await?;

        tracing::info!(
            company_id,
            invoice_number = %invoice.invoice_number,
            primary = primary.is_some(),
            costs = costs.len(),
            skipped = skipped.len(),
            "Invoice approved"
        );
        self.emit(actor, "APPROVE", &invoice, serde_json::json!({
            "invoice_number": invoice.invoice_number,
            "transaction_id": invoice.transaction_id,
            "cost_postings": costs.len(),
            "skipped": skipped.iter().map(|s| &s.reference).collect::<Vec<_>>(),
        }));

        Ok(ApprovalOutcome {
            invoice,
            primary,
            costs,
            skipped,
        })
    }

    async fn post_sale(
        &self,
        session: &mut S::Writer,
        invoice: &Invoice,
        anchors: &ResolvedAnchors,
        skipped: &mut Vec<SkippedPosting>,
    ) -> LedgerResult<Option<Transaction>> {
        let zero = BigDecimal::from(0);
        if invoice.grand_total <= zero {
            return Ok(None);
        }
        let company_id = invoice.company_id.as_str();
        let reference = invoice.invoice_number.as_str();

        let Some(receivable) =
            resolve_receivable(&*session, company_id, &invoice.customer_id, anchors).await?
        else {
            self.missing_anchor(reference, AnchorPurpose::Receivable, skipped)?;
            return Ok(None);
        };

        let Some(revenue) = anchors.account_id(AnchorPurpose::Revenue) else {
            self.missing_anchor(reference, AnchorPurpose::Revenue, skipped)?;
            return Ok(None);
        };

        let mut entries = vec![EntryLine::debit(
            &receivable.account_id,
            invoice.grand_total.clone(),
            None,
        )];
        entries.extend(
            invoice
                .items
                .iter()
                .filter(|i| i.total > zero)
                .map(|i| EntryLine::credit(revenue, i.total.clone(), Some(i.description.clone()))),
        );

        if invoice.tax_amount > zero {
            let Some(sales_tax) = anchors.account_id(AnchorPurpose::SalesTax) else {
                self.missing_anchor(reference, AnchorPurpose::SalesTax, skipped)?;
                return Ok(None);
            };
            entries.push(EntryLine::credit(
                sales_tax,
                invoice.tax_amount.clone(),
                Some("Sales tax".to_string()),
            ));
        }

        let posting = NewTransaction {
            reference: reference.to_string(),
            date: invoice.date,
            description: format!("Invoice {}", invoice.invoice_number),
            kind: TransactionKind::Sale,
            entries,
        };
        let transaction = self
            .transactions
            .post_in(session, company_id, posting)
            .await?;

        Ok(Some(transaction))
    }

    fn missing_anchor(
        &self,
        reference: &str,
        purpose: AnchorPurpose,
        skipped: &mut Vec<SkippedPosting>,
    ) -> LedgerResult<()> {
        match self.config.missing_anchor {
            MissingAnchorPolicy::Reject => Err(LedgerError::Validation(format!(
                "no {purpose} account available for posting {reference}"
            ))),
            MissingAnchorPolicy::Skip => {
                tracing::warn!(
                    reference,
                    purpose = %purpose,
                    "Posting skipped, anchor account missing"
                );
                skipped.push(SkippedPosting {
                    reference: reference.to_string(),
                    missing: purpose,
                });
                Ok(())
            }
        }
    }

    /// Undo an approval: remove its postings, return to draft, unlock the job
    pub async fn revert_to_draft(&self, actor: &Actor, invoice_id: &str) -> LedgerResult<RevertOutcome> {
        actor.require(LEDGER_ROLES, "revert invoices")?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let mut invoice = load(&session, company_id, invoice_id).await?;
        if !invoice.is_approved {
            return Err(LedgerError::Conflict(format!(
                "invoice {} is not approved",
                invoice.invoice_number
            )));
        }

        let reversed = self.reverse_postings(&mut session, &invoice).await?;
        invoice.is_approved = false;
        invoice.status = InvoiceStatus::Draft;
        invoice.transaction_id = None;
        invoice.updated_at = now();
        session.save_invoice(&invoice).await?;
        set_job_status(&mut session, &invoice, JobStatus::Open).await?;
        session.commit().await?;

        tracing::info!(
            company_id,
            invoice_number = %invoice.invoice_number,
            reversed = reversed.len(),
            "Invoice reverted to draft"
        );
        self.emit(actor, "REVERT_TO_DRAFT", &invoice, serde_json::json!({
            "reversed": reversed.iter().map(|t| &t.reference).collect::<Vec<_>>(),
        }));

        Ok(RevertOutcome { invoice, reversed })
    }

    /// Cancel a draft or approved invoice, reversing any postings
    pub async fn cancel(&self, actor: &Actor, invoice_id: &str) -> LedgerResult<RevertOutcome> {
        actor.require(LEDGER_ROLES, "cancel invoices")?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let mut invoice = load(&session, company_id, invoice_id).await?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(LedgerError::Conflict(format!(
                "invoice {} is already cancelled",
                invoice.invoice_number
            )));
        }

        let reversed = if invoice.is_approved {
            let reversed = self.reverse_postings(&mut session, &invoice).await?;
            set_job_status(&mut session, &invoice, JobStatus::Open).await?;
            reversed
        } else {
            Vec::new()
        };
        invoice.is_approved = false;
        invoice.status = InvoiceStatus::Cancelled;
        invoice.transaction_id = None;
        invoice.updated_at = now();
        session.save_invoice(&invoice).await?;
        session.commit().await?;

        tracing::info!(
            company_id,
            invoice_number = %invoice.invoice_number,
            reversed = reversed.len(),
            "Invoice cancelled"
        );
        self.emit(actor, "CANCEL", &invoice, serde_json::json!({
            "invoice_number": invoice.invoice_number,
        }));

        Ok(RevertOutcome { invoice, reversed })
    }

    /// Delete an unapproved invoice; cancelled ones need an admin
    pub async fn delete(&self, actor: &Actor, invoice_id: &str) -> LedgerResult<()> {
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let invoice = load(&session, company_id, invoice_id).await?;
        if invoice.is_approved {
            return Err(LedgerError::Conflict(format!(
                "invoice {} is approved; revert it first",
                invoice.invoice_number
            )));
        }
        match invoice.status {
            InvoiceStatus::Draft => actor.require(LEDGER_ROLES, "delete invoices")?,
            _ => actor.require(&[Role::Admin], "delete issued invoices")?,
        }

        session.delete_invoice(company_id, invoice_id).await?;
        session.commit().await?;

        tracing::info!(
            company_id,
            invoice_number = %invoice.invoice_number,
            "Invoice deleted"
        );
        self.emit(actor, "DELETE", &invoice, serde_json::json!({
            "invoice_number": invoice.invoice_number,
            "status": invoice.status,
        }));

        Ok(())
    }

    pub async fn get(&self, company_id: &str, invoice_id: &str) -> LedgerResult<Invoice> {
        let reader = self.storage.reader().await?;
        load(&reader, company_id, invoice_id).await
    }

    pub async fn list(&self, company_id: &str) -> LedgerResult<Vec<Invoice>> {
        self.storage.reader().await?.list_invoices(company_id).await
    }

    async fn reverse_postings(
        &self,
        session: &mut S::Writer,
        invoice: &Invoice,
    ) -> LedgerResult<Vec<Transaction>> {
        let company_id = invoice.company_id.as_str();
        let mut reversed = Vec::new();
        if let Some(primary) = self
            .transactions
            .reverse_in(session, company_id, &invoice.invoice_number)
            .await?
        {
            reversed.push(primary);
        }
        reversed.extend(
            self.transactions
                .reverse_prefix_in(session, company_id, &invoice.cost_reference_prefix())
                .await?,
        );
        Ok(reversed)
    }

    fn emit(&self, actor: &Actor, action: &str, invoice: &Invoice, payload: serde_json::Value) {
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(actor, action, "invoices", &invoice.id, payload),
        );
    }
}

fn ensure_editable(invoice: &Invoice) -> LedgerResult<()> {
    if invoice.is_approved || invoice.status != InvoiceStatus::Draft {
        return Err(LedgerError::Conflict(format!(
            "invoice {} is {:?}; only unapproved drafts can be edited",
            invoice.invoice_number, invoice.status
        )));
    }
    Ok(())
}

async fn set_job_status<W>(session: &mut W, invoice: &Invoice, status: JobStatus) -> LedgerResult<()>
where
    W: LedgerWriter + ?Sized,
{
    let Some(ref job_id) = invoice.job_id else {
        return Ok(());
    };
    if status == JobStatus::Open {
        // The lock stays while any other approved invoice bills the job
        let still_billed = session
            .list_invoices(&invoice.company_id)
            .await?
            .iter()
            .any(|i| i.id != invoice.id && i.is_approved && i.job_id.as_deref() == Some(job_id));
        if still_billed {
            tracing::debug!(job_id = %job_id, invoice_number = %invoice.invoice_number, "Job kept locked");
            return Ok(());
        }
    }
    if let Some(mut job) = session.get_job(&invoice.company_id, job_id).await? {
        if job.status != status {
            job.status = status;
            session.save_job(&job).await?;
        }
    }
    Ok(())
}

async fn load<R>(reader: &R, company_id: &str, invoice_id: &str) -> LedgerResult<Invoice>
where
    R: LedgerReader + ?Sized,
{
    reader
        .get_invoice(company_id, invoice_id)
        .await?
        .ok_or_else(|| LedgerError::InvoiceNotFound(invoice_id.to_string()))
}
