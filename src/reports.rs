//! Financial statements compiled from committed ledger entries.
//!
//! Every report reads one snapshot, so it reflects either all or none of any
//! concurrent posting. Balances are kept raw (`debit - credit`) until rendering,
//! where the account type's normal side decides the sign.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ledger::transaction::raw_balances;
use crate::traits::*;
use crate::types::*;

/// One account row of the trial balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceLine {
    pub account_id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    /// Raw `debit - credit`
    pub balance: BigDecimal,
    /// Positive raw balance, else zero
    pub debit: BigDecimal,
    /// Negated negative raw balance, else zero
    pub credit: BigDecimal,
}

/// Trial Balance - snapshot of all account balances at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub as_of_date: NaiveDate,
    /// Every account of the company, by code
    pub lines: Vec<TrialBalanceLine>,
    pub total_debits: BigDecimal,
    pub total_credits: BigDecimal,
    /// `total_debits - total_credits`, reported unrounded
    pub difference: BigDecimal,
    pub is_balanced: bool,
}

/// Account amount on a statement, already sign-flipped for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportLine {
    pub account_id: String,
    pub code: String,
    pub name: String,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitAndLoss {
    /// Start of the period; `None` means since inception
    pub from_date: Option<NaiveDate>,
    pub as_of_date: NaiveDate,
    pub revenue: Vec<ReportLine>,
    pub expenses: Vec<ReportLine>,
    pub total_revenue: BigDecimal,
    pub total_expenses: BigDecimal,
    pub net_profit: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub as_of_date: NaiveDate,
    pub assets: Vec<ReportLine>,
    pub liabilities: Vec<ReportLine>,
    pub equity: Vec<ReportLine>,
    pub total_assets: BigDecimal,
    pub total_liabilities: BigDecimal,
    pub total_equity: BigDecimal,
    /// Inception-to-date profit shown as reserves under equity
    pub current_net_profit: BigDecimal,
    /// `total_assets - (total_liabilities + total_equity + current_net_profit)`
    pub difference: BigDecimal,
    pub is_balanced: bool,
}

pub struct ReportCompiler<S: LedgerStorage> {
    storage: S,
}

impl<S: LedgerStorage> ReportCompiler<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Trial balance including every transaction dated on or before `as_of_date`
    pub async fn trial_balance(
        &self,
        company_id: &str,
        as_of_date: NaiveDate,
    ) -> LedgerResult<TrialBalance> {
        let reader = self.storage.reader().await?;
        let accounts = reader.list_accounts(company_id).await?;
        let balances = raw_balances(&reader, company_id, None, Some(as_of_date)).await?;

        let zero = BigDecimal::from(0);
        let mut lines: Vec<TrialBalanceLine> = accounts
            .into_iter()
            .map(|account| {
                let balance = balances
                    .get(&account.id)
                    .cloned()
                    .unwrap_or_else(|| zero.clone());
                let (debit, credit) = if balance > zero {
                    (balance.clone(), zero.clone())
                } else {
                    (zero.clone(), -balance.clone())
                };
                TrialBalanceLine {
                    account_id: account.id,
                    code: account.code,
                    name: account.name,
                    account_type: account.account_type,
                    balance,
                    debit,
                    credit,
                }
            })
            .collect();
        lines.sort_by(|a, b| a.code.cmp(&b.code));

        let total_debits: BigDecimal = lines.iter().map(|l| &l.debit).sum();
        let total_credits: BigDecimal = lines.iter().map(|l| &l.credit).sum();
        let difference = &total_debits - &total_credits;
        // Columns are sums of stored balances, so any difference is upstream damage
        let is_balanced = difference == BigDecimal::from(0);

        if !is_balanced {
            tracing::warn!(
                company_id,
                %as_of_date,
                %difference,
                "Trial balance does not balance"
            );
        }

        Ok(TrialBalance {
            as_of_date,
            lines,
            total_debits,
            total_credits,
            difference,
            is_balanced,
        })
    }

    /// Revenue and expenses for transactions dated within `from_date..=as_of_date`
    pub async fn profit_and_loss(
        &self,
        company_id: &str,
        from_date: Option<NaiveDate>,
        as_of_date: NaiveDate,
    ) -> LedgerResult<ProfitAndLoss> {
        let reader = self.storage.reader().await?;
        compile_profit_and_loss(&reader, company_id, from_date, as_of_date).await
    }

    pub async fn balance_sheet(
        &self,
        company_id: &str,
        as_of_date: NaiveDate,
    ) -> LedgerResult<BalanceSheet> {
        let reader = self.storage.reader().await?;
        let accounts = reader.list_accounts(company_id).await?;
        let balances = raw_balances(&reader, company_id, None, Some(as_of_date)).await?;
        let profit = compile_profit_and_loss(&reader, company_id, None, as_of_date).await?;

        let assets = section(&accounts, &balances, AccountType::Asset);
        let liabilities = section(&accounts, &balances, AccountType::Liability);
        let equity = section(&accounts, &balances, AccountType::Equity);

        let total_assets = total(&assets);
        let total_liabilities = total(&liabilities);
        let total_equity = total(&equity);
        let current_net_profit = profit.net_profit;

        let claims = &total_liabilities + &total_equity + &current_net_profit;
        let difference = &total_assets - &claims;
        let is_balanced = within_tolerance(&total_assets, &claims);

        if !is_balanced {
            tracing::warn!(
                company_id,
                %as_of_date,
                %difference,
                "Balance sheet does not balance"
            );
        }

        Ok(BalanceSheet {
            as_of_date,
            assets,
            liabilities,
            equity,
            total_assets,
            total_liabilities,
            total_equity,
            current_net_profit,
            difference,
            is_balanced,
        })
    }
}

async fn compile_profit_and_loss<R>(
    reader: &R,
    company_id: &str,
    from_date: Option<NaiveDate>,
    as_of_date: NaiveDate,
) -> LedgerResult<ProfitAndLoss>
where
    R: LedgerReader + ?Sized,
{
    let accounts = reader.list_accounts(company_id).await?;
    let balances = raw_balances(reader, company_id, from_date, Some(as_of_date)).await?;

    let revenue = section(&accounts, &balances, AccountType::Revenue);
    let expenses = section(&accounts, &balances, AccountType::Expense);
    let total_revenue = total(&revenue);
    let total_expenses = total(&expenses);
    let net_profit = &total_revenue - &total_expenses;

    Ok(ProfitAndLoss {
        from_date,
        as_of_date,
        revenue,
        expenses,
        total_revenue,
        total_expenses,
        net_profit,
    })
}

fn section(
    accounts: &[Account],
    balances: &HashMap<String, BigDecimal>,
    account_type: AccountType,
) -> Vec<ReportLine> {
    let mut lines: Vec<ReportLine> = accounts
        .iter()
        .filter(|a| a.account_type == account_type)
        .map(|a| {
            let raw = balances
                .get(&a.id)
                .cloned()
                .unwrap_or_else(|| BigDecimal::from(0));
            ReportLine {
                account_id: a.id.clone(),
                code: a.code.clone(),
                name: a.name.clone(),
                amount: account_type.display_balance(&raw),
            }
        })
        .collect();
    lines.sort_by(|a, b| a.code.cmp(&b.code));
    lines
}

fn total(lines: &[ReportLine]) -> BigDecimal {
    lines.iter().map(|l| &l.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionBuilder;
    use crate::utils::MemoryStorage;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    async fn seeded() -> (MemoryStorage, HashMap<&'static str, String>) {
        let storage = MemoryStorage::new();
        let chart = [
            ("1110", "Cash", AccountType::Asset),
            ("1230", "Trade Debtors", AccountType::Asset),
            ("2210", "Vendors Payable", AccountType::Liability),
            ("3100", "Capital", AccountType::Equity),
            ("4100", "Freight Revenue", AccountType::Revenue),
            ("5100", "Freight Cost", AccountType::Expense),
        ];
        let mut ids = HashMap::new();
        let mut session = storage.begin().await.unwrap();
        for (code, name, account_type) in chart {
            let account = Account::new("c1", NewAccount::new(code, name, account_type));
            ids.insert(code, account.id.clone());
            session.save_account(&account).await.unwrap();
        }

        let postings = [
            TransactionBuilder::new("JV-2025-0001", day(1), "Capital")
                .debit(&ids["1110"], BigDecimal::from(5000), None)
                .credit(&ids["3100"], BigDecimal::from(5000), None),
            TransactionBuilder::new("FIN-2025-0001", day(10), "Invoice")
                .debit(&ids["1230"], BigDecimal::from(1000), None)
                .credit(&ids["4100"], BigDecimal::from(1000), None),
            TransactionBuilder::new("FIN-2025-0001-COST-a", day(10), "Cost")
                .debit(&ids["5100"], BigDecimal::from(600), None)
                .credit(&ids["2210"], BigDecimal::from(600), None),
            TransactionBuilder::new("FIN-2025-0002", day(20), "Invoice")
                .debit(&ids["1230"], BigDecimal::from(400), None)
                .credit(&ids["4100"], BigDecimal::from(400), None),
        ];
        for posting in postings {
            let posting = Transaction::from_new("c1", posting.build().unwrap());
            session.insert_transaction(&posting).await.unwrap();
        }
        session.commit().await.unwrap();
        (storage, ids)
    }

    #[tokio::test]
    async fn trial_balance_columns_agree() {
        let (storage, _) = seeded().await;
        let reports = ReportCompiler::new(storage);

        let tb = reports.trial_balance("c1", day(31)).await.unwrap();
        assert!(tb.is_balanced);
        assert_eq!(tb.total_debits, BigDecimal::from(7000));
        assert_eq!(tb.total_credits, BigDecimal::from(7000));
        assert_eq!(tb.difference, BigDecimal::from(0));

        let codes: Vec<&str> = tb.lines.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["1110", "1230", "2210", "3100", "4100", "5100"]);
        let revenue = &tb.lines[4];
        assert_eq!(revenue.balance, BigDecimal::from(-1400));
        assert_eq!(revenue.credit, BigDecimal::from(1400));
        assert_eq!(revenue.debit, BigDecimal::from(0));
    }

    #[tokio::test]
    async fn as_of_date_excludes_later_postings() {
        let (storage, _) = seeded().await;
        let reports = ReportCompiler::new(storage);

        let tb = reports.trial_balance("c1", day(15)).await.unwrap();
        assert_eq!(tb.total_debits, BigDecimal::from(6600));

        let pl = reports.profit_and_loss("c1", None, day(15)).await.unwrap();
        assert_eq!(pl.total_revenue, BigDecimal::from(1000));
        assert_eq!(pl.net_profit, BigDecimal::from(400));
    }

    #[tokio::test]
    async fn period_profit_and_loss() {
        let (storage, _) = seeded().await;
        let reports = ReportCompiler::new(storage);

        let pl = reports
            .profit_and_loss("c1", Some(day(15)), day(31))
            .await
            .unwrap();
        assert_eq!(pl.total_revenue, BigDecimal::from(400));
        assert_eq!(pl.total_expenses, BigDecimal::from(0));
        assert_eq!(pl.net_profit, BigDecimal::from(400));
    }

    #[tokio::test]
    async fn balance_sheet_carries_current_profit() {
        let (storage, _) = seeded().await;
        let reports = ReportCompiler::new(storage);

        let bs = reports.balance_sheet("c1", day(31)).await.unwrap();
        assert_eq!(bs.total_assets, BigDecimal::from(6400));
        assert_eq!(bs.total_liabilities, BigDecimal::from(600));
        assert_eq!(bs.total_equity, BigDecimal::from(5000));
        assert_eq!(bs.current_net_profit, BigDecimal::from(800));
        assert_eq!(bs.difference, BigDecimal::from(0));
        assert!(bs.is_balanced);
    }

    #[tokio::test]
    async fn corrupted_store_is_surfaced() {
        let (storage, ids) = seeded().await;
        let mut session = storage.begin().await.unwrap();
        let mut broken = Transaction::from_new(
            "c1",
            TransactionBuilder::new("JV-2025-0002", day(5), "Broken")
                .debit(&ids["1110"], BigDecimal::from(50), None)
                .credit(&ids["3100"], BigDecimal::from(50), None)
                .build()
                .unwrap(),
        );
        broken.entries[1].credit = BigDecimal::from(20);
        session.insert_transaction(&broken).await.unwrap();
        session.commit().await.unwrap();

        let reports = ReportCompiler::new(storage);
        let tb = reports.trial_balance("c1", day(31)).await.unwrap();
        assert!(!tb.is_balanced);
        assert_eq!(tb.difference, BigDecimal::from(30));

        let bs = reports.balance_sheet("c1", day(31)).await.unwrap();
        assert!(!bs.is_balanced);
        assert_eq!(bs.difference, BigDecimal::from(30));
    }

    #[tokio::test]
    async fn one_cent_trial_balance_difference_is_not_rounded_away() {
        let (storage, ids) = seeded().await;
        let mut session = storage.begin().await.unwrap();
        let mut off_by_a_cent = Transaction::from_new(
            "c1",
            TransactionBuilder::new("JV-2025-0003", day(6), "Rounding")
                .debit(&ids["1110"], BigDecimal::from(10), None)
                .credit(&ids["3100"], BigDecimal::from(10), None)
                .build()
                .unwrap(),
        );
        off_by_a_cent.entries[0].debit = "10.01".parse().unwrap();
        session.insert_transaction(&off_by_a_cent).await.unwrap();
        session.commit().await.unwrap();

        let tb = ReportCompiler::new(storage)
            .trial_balance("c1", day(31))
            .await
            .unwrap();
        assert!(!tb.is_balanced);
        assert_eq!(tb.difference, "0.01".parse::<BigDecimal>().unwrap());
    }
}
