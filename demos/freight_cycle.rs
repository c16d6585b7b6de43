//! One month of a freight forwarder's books

use freight_ledger::utils::MemoryStorage;
use freight_ledger::{
    AccountType, Actor, Customer, EntryLine, InvoiceKind, Job, JobExpense, Ledger, NewAccount,
    NewInvoice, NewVoucher, PostingConfig, Role, VoucherStatus, VoucherType,
};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;

const COMPANY: &str = "karachi";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🚢 Freight Ledger - Monthly Cycle Example\n");

    let config = PostingConfig::from_toml(
        r#"
        missing_anchor = "skip"

        [anchors]
        revenue = "4100"
        cost = "5100"
        receivable = "1230"
        payable = "2210"
        sales_tax = "2310"
        "#,
    )?;
    let ledger = Ledger::new(MemoryStorage::new(), config);
    let admin = Actor::new("admin", COMPANY, Role::Admin);
    let accounts_clerk = Actor::new("clerk", COMPANY, Role::Accounts);
    let operations = Actor::new("ops", COMPANY, Role::Operations);

    // 1. Chart of accounts
    println!("📊 Setting up Chart of Accounts...");
    let mut ids: HashMap<&str, String> = HashMap::new();
    for (code, name, account_type) in [
        ("1000", "Assets", AccountType::Asset),
        ("2000", "Liabilities", AccountType::Liability),
        ("3100", "Owner Capital", AccountType::Equity),
        ("4100", "Freight Revenue", AccountType::Revenue),
        ("5100", "Freight Cost", AccountType::Expense),
    ] {
        let account = ledger
            .create_account(&admin, NewAccount::new(code, name, account_type))
            .await?;
        ids.insert(code, account.id);
    }
    for (code, name, account_type, parent) in [
        ("1230", "Trade Debtors", AccountType::Asset, "1000"),
        ("2210", "Vendors Payable", AccountType::Liability, "2000"),
        ("2310", "Sales Tax Payable", AccountType::Liability, "2000"),
    ] {
        let account = ledger
            .create_account(&admin, NewAccount::new(code, name, account_type).under(&ids[parent]))
            .await?;
        ids.insert(code, account.id);
    }
    let bank_code = ledger.suggest_next_code(COMPANY, &ids["1000"]).await?;
    let bank = ledger
        .create_account(
            &admin,
            NewAccount::new(&bank_code, "Bank", AccountType::Asset).under(&ids["1000"]),
        )
        .await?;
    println!("  ✓ Bank opened as {}", bank.code);
    ids.insert("bank", bank.id);

    let anchors = ledger.check_anchors(COMPANY).await?;
    println!("  ✓ Posting anchors complete: {}", anchors.is_complete());
    for purpose in &anchors.unconfigured {
        println!("  ⚠ No {} account configured; invoices needing it will not post", purpose);
    }
    println!();

    // 2. Capital
    println!("💰 Recording capital...");
    let receipt = ledger
        .create_voucher(
            &accounts_clerk,
            NewVoucher {
                voucher_type: VoucherType::Receipt,
                date: day(1),
                narration: Some("Capital introduced".to_string()),
                payment_mode: Some("BANK".to_string()),
                entries: vec![
                    EntryLine::debit(&ids["bank"], BigDecimal::from(500_000), None),
                    EntryLine::credit(&ids["3100"], BigDecimal::from(500_000), None),
                ],
                status: VoucherStatus::Posted,
            },
        )
        .await?;
    println!("  ✓ {} posted\n", receipt.voucher_number);

    // 3. Job and invoice
    println!("🧾 Billing shipment SE-2025-0042...");
    let customer = Customer::new(COMPANY, "Indus Textiles");
    ledger.register_customer(&customer).await?;
    let job = Job::new(COMPANY, "SE-2025-0042", &customer.id)
        .with_expense(JobExpense {
            description: "Ocean freight".to_string(),
            expense_name: None,
            cost_account_id: None,
            vendor_id: None,
            cost: BigDecimal::from(180_000),
            price: BigDecimal::from(240_000),
        })
        .with_expense(JobExpense {
            description: "Documentation".to_string(),
            expense_name: None,
            cost_account_id: None,
            vendor_id: None,
            cost: BigDecimal::from(5_000),
            price: BigDecimal::from(12_000),
        });
    ledger.register_job(&job).await?;

    let invoice = ledger
        .create_invoice(&operations, NewInvoice::new(InvoiceKind::Freight, day(8)).job(&job.id))
        .await?;
    println!("  Invoice:     {}", invoice.invoice_number);
    println!("  Grand total: Rs {}", invoice.grand_total);

    let outcome = ledger.approve_invoice(&accounts_clerk, &invoice.id).await?;
    if let Some(primary) = &outcome.primary {
        println!("  ✓ Sale posted as {}", primary.reference);
    }
    for cost in &outcome.costs {
        println!("  ✓ Cost posted as {}", cost.reference);
    }
    println!();

    // 4. Settlements
    println!("🏦 Settling balances...");
    for (voucher_type, debit, credit, value) in [
        (VoucherType::Receipt, &ids["bank"], &ids["1230"], 252_000),
        (VoucherType::Payment, &ids["2210"], &ids["bank"], 185_000),
    ] {
        let voucher = ledger
            .create_voucher(
                &accounts_clerk,
                NewVoucher {
                    voucher_type,
                    date: day(25),
                    narration: None,
                    payment_mode: Some("CHEQUE".to_string()),
                    entries: vec![
                        EntryLine::debit(debit, BigDecimal::from(value), None),
                        EntryLine::credit(credit, BigDecimal::from(value), None),
                    ],
                    status: VoucherStatus::Posted,
                },
            )
            .await?;
        println!("  ✓ {} for Rs {}", voucher.voucher_number, value);
    }
    println!();

    // 5. Statements
    let as_of = day(31);
    println!("📋 Trial Balance as of {}", as_of);
    let trial_balance = ledger.trial_balance(COMPANY, as_of).await?;
    for line in &trial_balance.lines {
        println!(
            "  {:<6} {:<20} {:>12} {:>12}",
            line.code, line.name, line.debit, line.credit
        );
    }
    println!(
        "  {:<27} {:>12} {:>12}\n",
        "Total", trial_balance.total_debits, trial_balance.total_credits
    );

    let profit = ledger.profit_and_loss(COMPANY, None, as_of).await?;
    println!("📈 Net profit: Rs {}", profit.net_profit);

    let balance_sheet = ledger.balance_sheet(COMPANY, as_of).await?;
    println!(
        "📑 Assets Rs {} = Liabilities Rs {} + Equity Rs {} + Profit Rs {}",
        balance_sheet.total_assets,
        balance_sheet.total_liabilities,
        balance_sheet.total_equity,
        balance_sheet.current_net_profit
    );

    let integrity = ledger.validate_integrity(COMPANY, as_of).await?;
    if integrity.is_valid {
        println!("\n✅ Ledger integrity verified");
    } else {
        for issue in &integrity.issues {
            println!("\n❌ {}", issue);
        }
    }

    Ok(())
}

fn day(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap_or_default()
}
