//! Voucher lifecycle against the in-memory store

mod common;

use common::*;
use freight_ledger::{
    EntryLine, LedgerError, LedgerReader, LedgerStorage, NewVoucher, VoucherDeletion,
    VoucherStatus, VoucherType, VoucherUpdate,
};

fn journal(debit_account: &str, credit_account: &str, value: i64, status: VoucherStatus) -> NewVoucher {
    NewVoucher {
        voucher_type: VoucherType::Journal,
        date: date(3, 14),
        narration: Some("Capital introduced".to_string()),
        payment_mode: None,
        entries: vec![
            EntryLine::debit(debit_account, amount(value), None),
            EntryLine::credit(credit_account, amount(value), None),
        ],
        status,
    }
}

#[tokio::test]
async fn posted_journal_voucher_mirrors_a_balanced_transaction() {
    let fx = Fixture::new().await;
    let voucher = fx
        .ledger
        .create_voucher(
            &accountant(),
            journal(&fx.id("1110"), &fx.id("3100"), 500, VoucherStatus::Posted),
        )
        .await
        .unwrap();

    assert_eq!(voucher.voucher_number, "JV-2025-0001");
    assert_eq!(voucher.posted_by_id.as_deref(), Some("acc-1"));

    let transaction = fx
        .ledger
        .transactions()
        .get_transaction(COMPANY, "JV-2025-0001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.entries.len(), 2);
    let net: bigdecimal::BigDecimal = transaction
        .entries
        .iter()
        .map(|e| &e.debit - &e.credit)
        .sum();
    assert_eq!(net, amount(0));

    assert_eq!(
        fx.ledger.account_balance(COMPANY, &fx.id("1110"), None).await.unwrap(),
        amount(500)
    );
}

#[tokio::test]
async fn numbering_is_per_type_and_period() {
    let fx = Fixture::new().await;
    let actor = accountant();

    let first = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 10, VoucherStatus::Posted))
        .await
        .unwrap();
    let second = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 20, VoucherStatus::Draft))
        .await
        .unwrap();

    let mut payment = journal(&fx.id("2210"), &fx.id("1120"), 5, VoucherStatus::Posted);
    payment.voucher_type = VoucherType::Payment;
    payment.payment_mode = Some("CHEQUE".to_string());
    let payment = fx.ledger.create_voucher(&actor, payment).await.unwrap();

    let mut next_year = journal(&fx.id("1110"), &fx.id("3100"), 30, VoucherStatus::Posted);
    next_year.date = chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let next_year = fx.ledger.create_voucher(&actor, next_year).await.unwrap();

    assert_eq!(first.voucher_number, "JV-2025-0001");
    assert_eq!(second.voucher_number, "JV-2025-0002");
    assert_eq!(payment.voucher_number, "PV-2025-0001");
    assert_eq!(next_year.voucher_number, "JV-2026-0001");
}

#[tokio::test]
async fn lifecycle_draft_removed_posted_voided_cancelled_refused() {
    let fx = Fixture::new().await;
    let actor = accountant();

    let draft = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 100, VoucherStatus::Draft))
        .await
        .unwrap();
    assert!(fx
        .ledger
        .transactions()
        .get_transaction(COMPANY, &draft.voucher_number)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        fx.ledger.delete_voucher(&actor, &draft.id).await.unwrap(),
        VoucherDeletion::Removed
    );
    assert!(matches!(
        fx.ledger.vouchers().get(COMPANY, &draft.id).await,
        Err(LedgerError::VoucherNotFound(_))
    ));

    let posted = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 250, VoucherStatus::Posted))
        .await
        .unwrap();
    let VoucherDeletion::Voided(voided) = fx.ledger.delete_voucher(&actor, &posted.id).await.unwrap()
    else {
        panic!("posted voucher should be voided");
    };
    assert_eq!(voided.status, VoucherStatus::Cancelled);
    assert_eq!(voided.entries.len(), 2);

    let reader = fx.storage.reader().await.unwrap();
    assert!(reader
        .get_transaction(COMPANY, &posted.voucher_number)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        reader.count_account_entries(COMPANY, &fx.id("1110")).await.unwrap(),
        0
    );

    let kept = fx.ledger.vouchers().get(COMPANY, &posted.id).await.unwrap();
    assert_eq!(kept.status, VoucherStatus::Cancelled);

    let again = fx.ledger.delete_voucher(&actor, &posted.id).await;
    assert!(matches!(again, Err(LedgerError::Conflict(_))));
}

#[tokio::test]
async fn draft_is_posted_later() {
    let fx = Fixture::new().await;
    let actor = accountant();
    let draft = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 75, VoucherStatus::Draft))
        .await
        .unwrap();

    let posted = fx.ledger.vouchers().post(&admin(), &draft.id).await.unwrap();
    assert_eq!(posted.status, VoucherStatus::Posted);
    assert_eq!(posted.posted_by_id.as_deref(), Some("admin-1"));
    assert_eq!(
        fx.ledger.account_balance(COMPANY, &fx.id("3100"), None).await.unwrap(),
        amount(-75)
    );

    let twice = fx.ledger.vouchers().post(&actor, &draft.id).await;
    assert!(matches!(twice, Err(LedgerError::Conflict(_))));
}

#[tokio::test]
async fn updating_a_posted_voucher_rewrites_its_transaction() {
    let fx = Fixture::new().await;
    let actor = accountant();
    let voucher = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 100, VoucherStatus::Posted))
        .await
        .unwrap();

    let update = VoucherUpdate {
        date: None,
        narration: Some("Corrected capital".to_string()),
        payment_mode: None,
        entries: vec![
            EntryLine::debit(&fx.id("1120"), amount(120), None),
            EntryLine::credit(&fx.id("3100"), amount(120), None),
        ],
    };
    fx.ledger
        .vouchers()
        .update(&actor, &voucher.id, update.clone())
        .await
        .unwrap();

    let transaction = fx
        .ledger
        .transactions()
        .get_transaction(COMPANY, &voucher.voucher_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.description, "Corrected capital");
    assert_eq!(transaction.total_debits(), amount(120));
    assert_eq!(
        fx.ledger.account_balance(COMPANY, &fx.id("1110"), None).await.unwrap(),
        amount(0)
    );

    fx.ledger.delete_voucher(&actor, &voucher.id).await.unwrap();
    let cancelled = fx.ledger.vouchers().update(&actor, &voucher.id, update).await;
    assert!(matches!(cancelled, Err(LedgerError::Conflict(_))));
}

#[tokio::test]
async fn invalid_vouchers_leave_no_trace() {
    let fx = Fixture::new().await;
    let actor = accountant();

    let mut single = journal(&fx.id("1110"), &fx.id("3100"), 100, VoucherStatus::Posted);
    single.entries.truncate(1);
    assert!(matches!(
        fx.ledger.create_voucher(&actor, single).await,
        Err(LedgerError::Validation(_))
    ));

    let mut unbalanced = journal(&fx.id("1110"), &fx.id("3100"), 100, VoucherStatus::Posted);
    unbalanced.entries[1].credit = amount(50);
    assert!(matches!(
        fx.ledger.create_voucher(&actor, unbalanced).await,
        Err(LedgerError::Validation(_))
    ));

    let unknown = journal("no-such-account", &fx.id("3100"), 100, VoucherStatus::Posted);
    assert!(matches!(
        fx.ledger.create_voucher(&actor, unknown).await,
        Err(LedgerError::AccountNotFound(_))
    ));

    assert!(fx.ledger.vouchers().list(COMPANY).await.unwrap().is_empty());
    let next = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 100, VoucherStatus::Posted))
        .await
        .unwrap();
    assert_eq!(next.voucher_number, "JV-2025-0001");
}

#[tokio::test]
async fn only_ledger_roles_touch_vouchers() {
    let fx = Fixture::new().await;
    for actor in [operations(), viewer()] {
        let result = fx
            .ledger
            .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 1, VoucherStatus::Posted))
            .await;
        assert!(matches!(result, Err(LedgerError::Unauthorized(_))));
    }

    let voucher = fx
        .ledger
        .create_voucher(&admin(), journal(&fx.id("1110"), &fx.id("3100"), 1, VoucherStatus::Posted))
        .await
        .unwrap();
    assert!(matches!(
        fx.ledger.delete_voucher(&operations(), &voucher.id).await,
        Err(LedgerError::Unauthorized(_))
    ));

    let other_company = freight_ledger::Actor::new("acc-2", "lahore", freight_ledger::Role::Accounts);
    assert!(matches!(
        fx.ledger.delete_voucher(&other_company, &voucher.id).await,
        Err(LedgerError::VoucherNotFound(_))
    ));
}

#[tokio::test]
async fn voucher_events_are_audited_after_commit() {
    let fx = Fixture::new().await;
    let actor = accountant();
    let voucher = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 5, VoucherStatus::Posted))
        .await
        .unwrap();
    fx.ledger.delete_voucher(&actor, &voucher.id).await.unwrap();

    let events: Vec<_> = fx
        .audit
        .events()
        .into_iter()
        .filter(|e| e.module == "vouchers")
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, "CREATE");
    assert_eq!(events[1].action, "VOID");
    assert_eq!(events[1].entity_id, voucher.id);
}

#[tokio::test]
async fn standalone_postings_share_the_voucher_number_space() {
    let fx = Fixture::new().await;
    let actor = accountant();
    let manual = |reference: &str| {
        freight_ledger::TransactionBuilder::new(reference, date(3, 1), "Imported opening")
            .debit(&fx.id("1110"), amount(10), None)
            .credit(&fx.id("3100"), amount(10), None)
            .build()
            .unwrap()
    };

    fx.ledger.post_transaction(&actor, manual("JV-2025-0001")).await.unwrap();
    let voucher = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 40, VoucherStatus::Posted))
        .await
        .unwrap();
    assert_eq!(voucher.voucher_number, "JV-2025-0002");

    let draft = fx
        .ledger
        .create_voucher(&actor, journal(&fx.id("1110"), &fx.id("3100"), 15, VoucherStatus::Draft))
        .await
        .unwrap();
    assert_eq!(draft.voucher_number, "JV-2025-0003");
    let taken = fx.ledger.post_transaction(&actor, manual("JV-2025-0003")).await;
    assert!(matches!(taken, Err(LedgerError::Conflict(_))));

    let posted = fx.ledger.vouchers().post(&actor, &draft.id).await.unwrap();
    assert_eq!(posted.status, VoucherStatus::Posted);
}
