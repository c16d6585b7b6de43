//! Posting configuration: which accounts anchor automatic postings.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

use crate::types::LedgerResult;

/// Purpose an anchor account serves when a more specific account cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorPurpose {
    /// Credited with invoice item totals
    Revenue,
    /// Debited with freight item costs when no expense account resolves
    Cost,
    /// Debited with invoice grand totals when the customer has no account
    Receivable,
    /// Credited with freight item costs when the vendor has no account
    Payable,
    /// Credited with invoice tax amounts
    SalesTax,
}

impl AnchorPurpose {
    pub const ALL: [AnchorPurpose; 5] = [
        AnchorPurpose::Revenue,
        AnchorPurpose::Cost,
        AnchorPurpose::Receivable,
        AnchorPurpose::Payable,
        AnchorPurpose::SalesTax,
    ];
}

impl fmt::Display for AnchorPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnchorPurpose::Revenue => "revenue",
            AnchorPurpose::Cost => "cost",
            AnchorPurpose::Receivable => "receivable",
            AnchorPurpose::Payable => "payable",
            AnchorPurpose::SalesTax => "sales_tax",
        };
        f.write_str(name)
    }
}

/// Account codes per anchor purpose.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnchorCodes {
    #[serde(default = "default_revenue")]
    pub revenue: Option<String>,
    #[serde(default = "default_cost")]
    pub cost: Option<String>,
    #[serde(default = "default_receivable")]
    pub receivable: Option<String>,
    #[serde(default = "default_payable")]
    pub payable: Option<String>,
    /// Credited with an invoice's tax amount. Unset by default: until a code is
    /// configured, approving a taxed invoice falls under [`MissingAnchorPolicy`]
    /// and its whole sale posting (receivable included) is skipped or rejected.
    #[serde(default)]
    pub sales_tax: Option<String>,
}

fn default_revenue() -> Option<String> {
    Some("4100".to_string())
}

fn default_cost() -> Option<String> {
    Some("5100".to_string())
}

fn default_receivable() -> Option<String> {
    Some("1230".to_string())
}

fn default_payable() -> Option<String> {
    Some("2210".to_string())
}

impl Default for AnchorCodes {
    fn default() -> Self {
        Self {
            revenue: default_revenue(),
            cost: default_cost(),
            receivable: default_receivable(),
            payable: default_payable(),
            sales_tax: None,
        }
    }
}

impl AnchorCodes {
    /// Configured code for a purpose, if any
    pub fn code(&self, purpose: AnchorPurpose) -> Option<&str> {
        match purpose {
            AnchorPurpose::Revenue => self.revenue.as_deref(),
            AnchorPurpose::Cost => self.cost.as_deref(),
            AnchorPurpose::Receivable => self.receivable.as_deref(),
            AnchorPurpose::Payable => self.payable.as_deref(),
            AnchorPurpose::SalesTax => self.sales_tax.as_deref(),
        }
    }
}

/// What invoice approval does when an anchor account is needed but unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingAnchorPolicy {
    /// Skip the dependent posting; it is logged and reported in the approval outcome.
    #[default]
    Skip,
    /// Fail the approval and roll back.
    Reject,
}

/// Posting configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostingConfig {
    /// Anchor codes used by every company without an override.
    #[serde(default)]
    pub anchors: AnchorCodes,
    /// Per-company anchor overrides, keyed by company id.
    #[serde(default)]
    pub companies: HashMap<String, AnchorCodes>,
    #[serde(default)]
    pub missing_anchor: MissingAnchorPolicy,
}

impl PostingConfig {
    /// Loads configuration from config files and the environment.
    ///
    /// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`, then
    /// `FREIGHT_LEDGER__*` environment variables.
    pub fn load() -> LedgerResult<Self> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("FREIGHT_LEDGER").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parses configuration from a TOML document.
    pub fn from_toml(source: &str) -> LedgerResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Anchor codes in effect for a company.
    pub fn anchors_for(&self, company_id: &str) -> &AnchorCodes {
        self.companies.get(company_id).unwrap_or(&self.anchors)
    }
}
