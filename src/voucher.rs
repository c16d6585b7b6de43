//! Manual vouchers: journal, payment, receipt and contra entries.
//!
//! Lifecycle is `DRAFT -> POSTED -> CANCELLED`. A posted voucher owns exactly one
//! ledger transaction whose reference is the voucher number. Deleting a draft
//! removes it outright; deleting a posted voucher voids it, removing its
//! transaction but keeping the voucher and its lines for audit.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::{self, AuditEvent, AuditSink};
use crate::ledger::TransactionManager;
use crate::numbering::{self, DocumentKind};
use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherType {
    Journal,
    Payment,
    Receipt,
    Contra,
}

impl VoucherType {
    pub fn transaction_kind(&self) -> TransactionKind {
        match self {
            VoucherType::Journal => TransactionKind::Journal,
            VoucherType::Payment => TransactionKind::Payment,
            VoucherType::Receipt => TransactionKind::Receipt,
            VoucherType::Contra => TransactionKind::Contra,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherStatus {
    Draft,
    Posted,
    Cancelled,
}

/// Voucher lines mirror ledger entry lines
pub type VoucherEntry = EntryLine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: String,
    pub company_id: String,
    pub voucher_number: String,
    pub voucher_type: VoucherType,
    pub date: NaiveDate,
    pub narration: Option<String>,
    pub payment_mode: Option<String>,
    pub status: VoucherStatus,
    pub created_by_id: String,
    pub posted_by_id: Option<String>,
    pub entries: Vec<VoucherEntry>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Voucher {
    fn description(&self) -> String {
        self.narration
            .clone()
            .unwrap_or_else(|| format!("{:?} voucher {}", self.voucher_type, self.voucher_number))
    }

    /// The ledger posting this voucher stands for
    pub fn to_transaction(&self) -> NewTransaction {
        NewTransaction {
            reference: self.voucher_number.clone(),
            date: self.date,
            description: self.description(),
            kind: self.voucher_type.transaction_kind(),
            entries: self.entries.clone(),
        }
    }
}

/// Input for creating a voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVoucher {
    pub voucher_type: VoucherType,
    pub date: NaiveDate,
    pub narration: Option<String>,
    pub payment_mode: Option<String>,
    pub entries: Vec<VoucherEntry>,
    /// `Draft` or `Posted`
    pub status: VoucherStatus,
}

/// Replacement lines and header fields for an existing voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherUpdate {
    pub date: Option<NaiveDate>,
    pub narration: Option<String>,
    pub payment_mode: Option<String>,
    pub entries: Vec<VoucherEntry>,
}

/// What `delete` did to a voucher
#[derive(Debug, Clone, PartialEq)]
pub enum VoucherDeletion {
    /// Draft removed together with any stray transaction under its number
    Removed,
    /// Posted voucher cancelled; its transaction is gone
    Voided(Voucher),
}

pub struct VoucherManager<S: LedgerStorage> {
    storage: S,
    transactions: Arc<TransactionManager<S>>,
    audit: Arc<dyn AuditSink>,
}

impl<S: LedgerStorage> VoucherManager<S> {
    pub fn new(
        storage: S,
        transactions: Arc<TransactionManager<S>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            storage,
            transactions,
            audit,
        }
    }

    fn check_lines(&self, entries: &[VoucherEntry]) -> LedgerResult<()> {
        if entries.len() < 2 {
            return Err(LedgerError::Validation(
                "A voucher needs at least two lines".to_string(),
            ));
        }
        self.transactions.validate_entries(entries)
    }

    /// Create a voucher, posting it immediately when `status` is `Posted`
    pub async fn create(&self, actor: &Actor, new: NewVoucher) -> LedgerResult<Voucher> {
        actor.require(LEDGER_ROLES, "create vouchers")?;
        if new.status == VoucherStatus::Cancelled {
            return Err(LedgerError::Validation(
                "A voucher cannot be created cancelled".to_string(),
            ));
        }
        self.check_lines(&new.entries)?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        self.transactions
            .ensure_accounts(&session, company_id, &new.entries)
            .await?;

        let allocation = numbering::allocate(
            &session,
            company_id,
            DocumentKind::Voucher(new.voucher_type),
            new.date,
        )
        .await?;

        let posted = new.status == VoucherStatus::Posted;
        let now = now();
        let voucher = Voucher {
            id: new_id(),
            company_id: company_id.to_string(),
            voucher_number: allocation.number,
            voucher_type: new.voucher_type,
            date: new.date,
            narration: new.narration,
            payment_mode: new.payment_mode,
            status: new.status,
            created_by_id: actor.user_id.clone(),
            posted_by_id: posted.then(|| actor.user_id.clone()),
            entries: new.entries,
            created_at: now,
            updated_at: now,
        };

        session.save_voucher(&voucher).await?;
        if posted {
            self.transactions
                .post_in(&mut session, company_id, voucher.to_transaction())
                .await?;
        }
        session.commit().await?;

        tracing::info!(
            company_id,
            voucher_number = %voucher.voucher_number,
            status = ?voucher.status,
            "Voucher created"
        );
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                "CREATE",
                "vouchers",
                &voucher.id,
                serde_json::json!({
                    "voucher_number": voucher.voucher_number,
                    "status": voucher.status,
                }),
            ),
        );

        Ok(voucher)
    }

    /// Replace a voucher's lines; a posted voucher's transaction is rewritten with it
    pub async fn update(
        &self,
        actor: &Actor,
        voucher_id: &str,
        update: VoucherUpdate,
    ) -> LedgerResult<Voucher> {
        actor.require(LEDGER_ROLES, "update vouchers")?;
        self.check_lines(&update.entries)?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let mut voucher = load(&session, company_id, voucher_id).await?;
        if voucher.status == VoucherStatus::Cancelled {
            return Err(LedgerError::Conflict(format!(
                "voucher {} is cancelled",
                voucher.voucher_number
            )));
        }
        self.transactions
            .ensure_accounts(&session, company_id, &update.entries)
            .await?;

        if let Some(date) = update.date {
            voucher.date = date;
        }
        if update.narration.is_some() {
            voucher.narration = update.narration;
        }
        if update.payment_mode.is_some() {
            voucher.payment_mode = update.payment_mode;
        }
        voucher.entries = update.entries;
        voucher.updated_at = now();

        if voucher.status == VoucherStatus::Posted {
            let description = voucher.description();
            let existing = session
                .get_transaction(company_id, &voucher.voucher_number)
                .await?;
            match existing {
                Some(_) => {
                    self.transactions
                        .replace_entries_in(
                            &mut session,
                            company_id,
                            &voucher.voucher_number,
                            voucher.date,
                            &description,
                            voucher.entries.clone(),
                        )
                        .await?;
                }
                None => {
                    self.transactions
                        .post_in(&mut session, company_id, voucher.to_transaction())
                        .await?;
                }
            }
        }

        session.save_voucher(&voucher).await?;
        session.commit().await?;

        tracing::info!(
            company_id,
            voucher_number = %voucher.voucher_number,
            "Voucher updated"
        );
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                "UPDATE",
                "vouchers",
                &voucher.id,
                serde_json::json!({ "lines": voucher.entries.len() }),
            ),
        );

        Ok(voucher)
    }

    /// Post a draft voucher to the ledger
    pub async fn post(&self, actor: &Actor, voucher_id: &str) -> LedgerResult<Voucher> {
        actor.require(LEDGER_ROLES, "post vouchers")?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let mut voucher = load(&session, company_id, voucher_id).await?;
        if voucher.status != VoucherStatus::Draft {
            return Err(LedgerError::Conflict(format!(
                "voucher {} is {:?}, only drafts can be posted",
                voucher.voucher_number, voucher.status
            )));
        }

        self.transactions
            .post_in(&mut session, company_id, voucher.to_transaction())
            .await?;
        voucher.status = VoucherStatus::Posted;
        voucher.posted_by_id = Some(actor.user_id.clone());
        voucher.updated_at = now();
        session.save_voucher(&voucher).await?;
        session.commit().await?;

        tracing::info!(
            company_id,
            voucher_number = %voucher.voucher_number,
            "Voucher posted"
        );
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                "POST",
                "vouchers",
                &voucher.id,
                serde_json::json!({ "voucher_number": voucher.voucher_number }),
            ),
        );

        Ok(voucher)
    }

    /// Delete a draft, void a posted voucher, refuse a cancelled one
    pub async fn delete(&self, actor: &Actor, voucher_id: &str) -> LedgerResult<VoucherDeletion> {
        actor.require(LEDGER_ROLES, "delete vouchers")?;
        let company_id = actor.company_id.as_str();

        let mut session = self.storage.begin().await?;
        let mut voucher = load(&session, company_id, voucher_id).await?;

        let outcome = match voucher.status {
            VoucherStatus::Cancelled => {
                return Err(LedgerError::Conflict(format!(
                    "voucher {} is already voided",
                    voucher.voucher_number
                )));
            }
            VoucherStatus::Posted => {
                self.transactions
                    .reverse_in(&mut session, company_id, &voucher.voucher_number)
                    .await?;
                voucher.status = VoucherStatus::Cancelled;
                voucher.updated_at = now();
                session.save_voucher(&voucher).await?;
                VoucherDeletion::Voided(voucher.clone())
            }
            VoucherStatus::Draft => {
                self.transactions
                    .reverse_in(&mut session, company_id, &voucher.voucher_number)
                    .await?;
                session.delete_voucher(company_id, voucher_id).await?;
                VoucherDeletion::Removed
            }
        };
        session.commit().await?;

        let action = match outcome {
            VoucherDeletion::Removed => "DELETE",
            VoucherDeletion::Voided(_) => "VOID",
        };
        tracing::info!(
            company_id,
            voucher_number = %voucher.voucher_number,
            action,
            "Voucher deleted"
        );
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::new(
                actor,
                action,
                "vouchers",
                voucher_id,
                serde_json::json!({ "voucher_number": voucher.voucher_number }),
            ),
        );

        Ok(outcome)
    }

    pub async fn get(&self, company_id: &str, voucher_id: &str) -> LedgerResult<Voucher> {
        let reader = self.storage.reader().await?;
        load(&reader, company_id, voucher_id).await
    }

    pub async fn list(&self, company_id: &str) -> LedgerResult<Vec<Voucher>> {
        self.storage.reader().await?.list_vouchers(company_id).await
    }
}

async fn load<R>(reader: &R, company_id: &str, voucher_id: &str) -> LedgerResult<Voucher>
where
    R: LedgerReader + ?Sized,
{
    reader
        .get_voucher(company_id, voucher_id)
        .await?
        .ok_or_else(|| LedgerError::VoucherNotFound(voucher_id.to_string()))
}
