//! # Freight Ledger
//!
//! Double-entry general ledger for a freight-forwarding ERP: chart of accounts,
//! manual vouchers, invoice postings, document numbering and financial
//! statements, all scoped per company.
//!
//! ## Features
//!
//! - **Double-entry bookkeeping**: every posting balances within 0.01 and lands atomically
//! - **Account registry**: hierarchical chart of accounts with code suggestion
//! - **Vouchers**: journal, payment, receipt and contra vouchers with a draft/posted/cancelled lifecycle
//! - **Invoice postings**: receivable, revenue, sales tax and per-item cost postings on approval
//! - **Document numbering**: gap-free period-scoped numbers allocated inside the posting unit of work
//! - **Financial statements**: trial balance, profit and loss, and balance sheet
//! - **Storage abstraction**: units of work behind the [`LedgerStorage`] trait
//!
//! ## Quick Start
//!
//! ```rust
//! use freight_ledger::{
//!     Actor, AccountType, Ledger, MemoryStorage, NewAccount, PostingConfig, Role,
//! };
//!
//! # async fn run() -> freight_ledger::LedgerResult<()> {
//! let ledger = Ledger::new(MemoryStorage::new(), PostingConfig::default());
//! let actor = Actor::new("user-1", "company-1", Role::Accounts);
//!
//! let assets = ledger
//!     .create_account(&actor, NewAccount::new("1000", "Assets", AccountType::Asset))
//!     .await?;
//! let code = ledger.suggest_next_code("company-1", &assets.id).await?;
//! assert_eq!(code, "1001");
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod invoice;
pub mod ledger;
pub mod numbering;
pub mod reports;
pub mod traits;
pub mod types;
pub mod utils;
pub mod voucher;

// Re-export commonly used types
pub use audit::{AuditEvent, AuditSink, MemoryAuditLog, TracingAuditSink};
pub use config::{AnchorCodes, AnchorPurpose, MissingAnchorPolicy, PostingConfig};
pub use invoice::{
    ApprovalOutcome, Customer, Invoice, InvoiceItem, InvoiceKind, InvoiceManager, InvoiceStatus,
    InvoiceUpdate, Job, JobExpense, JobStatus, NewInvoice, NewInvoiceItem, RevertOutcome,
    SkippedPosting, Vendor,
};
pub use ledger::*;
pub use numbering::{DocumentKind, NumberAllocation};
pub use reports::*;
pub use traits::*;
pub use types::*;
pub use utils::*;
pub use voucher::*;
