mod common;

use common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use webhook_ledger::domain::event::Provider;
use webhook_ledger::domain::fee::FeeConfiguration;
use webhook_ledger::domain::money::Balance;
use webhook_ledger::domain::ports::LedgerStore;
use webhook_ledger::domain::webhook_log::LogStatus;
use webhook_ledger::error::ErrorKind;

#[tokio::test]
async fn test_credit_with_provider_fee() {
    let h = Harness::new().await;
    h.set_fee(FeeConfiguration::percentage("FUNDING_PAYSTACK", dec!(10)))
        .await;

    let result = h.engine.process(paystack_credit("R1", 100_000)).await;

    assert!(result.success, "{:?}", result.error);
    assert!(result.wallet_updated);
    assert_eq!(h.balance().await, dec!(900.00));

    let tx = result.transaction.unwrap();
    assert_eq!(tx.amount.value(), dec!(1000.00));
    assert_eq!(tx.fee, dec!(100.00));
    assert_eq!(tx.net_amount(), dec!(900.00));
    assert_eq!(tx.balance_before, Balance::ZERO);
    assert_eq!(tx.balance_after, Balance::new(dec!(900.00)));

    let validation = result.balance_validation.unwrap();
    assert!(validation.before.is_valid);
    assert!(validation.after.is_valid);
    assert_eq!(validation.after.transaction_count, 1);

    let ledger = h.store.transactions().await;
    assert_eq!(ledger.len(), 1);
    let records = h.store.funding_records(h.wallet.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].net_amount, dec!(900.00));
    assert_eq!(records[0].owner_id, "user-1");

    let log = h.log("R1", &Provider::Paystack).await.unwrap();
    assert_eq!(log.status, LogStatus::Processed);
    assert!(log.wallet_updated);
}

#[tokio::test]
async fn test_replay_under_new_reference_is_content_duplicate() {
    let h = Harness::new().await;
    h.set_fee(FeeConfiguration::percentage("FUNDING_PAYSTACK", dec!(10)))
        .await;
    assert!(h.engine.process(paystack_credit("R1", 100_000)).await.success);

    let result = h.engine.process(paystack_credit("R2", 100_000)).await;

    assert!(!result.success);
    assert!(result.processed);
    assert!(!result.wallet_updated);
    assert_eq!(result.error_kind, Some(ErrorKind::Duplicate));
    assert!(result.error.unwrap().contains("content-hash match"));
    assert_eq!(h.balance().await, dec!(900.00));
    assert_eq!(h.store.transactions().await.len(), 1);

    let log = h.log("R2", &Provider::Paystack).await.unwrap();
    assert_eq!(log.status, LogStatus::Duplicate);
}

#[tokio::test]
async fn test_fee_at_or_above_gross_is_rejected() {
    let h = Harness::new().await;
    h.set_fee(FeeConfiguration::fixed("FUNDING_PAYSTACK", dec!(50)))
        .await;

    let result = h.engine.process(paystack_credit("R1", 1_000)).await;

    assert!(!result.success);
    assert!(!result.wallet_updated);
    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    assert!(result.error.unwrap().contains("fee 50.00 exceeds amount 10.00"));
    assert_eq!(h.balance().await, Decimal::ZERO);
    assert!(h.store.transactions().await.is_empty());

    h.set_fee(FeeConfiguration::fixed("FUNDING_PAYSTACK", dec!(10)))
        .await;
    let result = h.engine.process(paystack_credit("R2", 1_000)).await;
    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    assert_eq!(h.balance().await, Decimal::ZERO);
}

#[tokio::test]
async fn test_corrupted_balance_blocks_credit() {
    let h = Harness::new().await;
    assert!(h.engine.process(paystack_credit("R1", 100_000)).await.success);
    let settled = h.balance().await;

    h.store
        .overwrite_balance(h.wallet.id, Balance::new(settled + dec!(50.00)))
        .await
        .unwrap();

    let result = h.engine.process(paystack_credit("R2", 250_000)).await;

    assert!(!result.success);
    assert!(!result.wallet_updated);
    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    let error = result.error.unwrap();
    assert!(error.contains("discrepancy 50.00"), "{}", error);
    assert_eq!(h.balance().await, settled + dec!(50.00));
    assert_eq!(h.store.transactions().await.len(), 1);

    let log = h.log("R2", &Provider::Paystack).await.unwrap();
    assert_eq!(log.status, LogStatus::Rejected);
}

#[tokio::test]
async fn test_balance_equals_sum_of_net_credits() {
    let h = Harness::new().await;
    h.set_fee(FeeConfiguration::percentage("FUNDING_PAYSTACK", dec!(1.5)))
        .await;

    let mut expected = Decimal::ZERO;
    for (i, kobo) in [123_45_i64, 1_000_00, 7_77, 50_000_00, 1].iter().enumerate() {
        let result = h
            .engine
            .process(paystack_credit(&format!("R{}", i), *kobo))
            .await;
        assert!(result.success, "{:?}", result.error);
        let tx = result.transaction.unwrap();
        assert!(tx.fee >= Decimal::ZERO && tx.fee < tx.amount.value());
        expected += tx.net_amount();
    }

    assert_eq!(h.balance().await, expected);
    let computed: Decimal = h
        .store
        .completed_for_wallet(h.wallet.id)
        .await
        .unwrap()
        .iter()
        .map(|tx| tx.balance_effect().unwrap())
        .sum();
    assert_eq!(computed, expected);
}

#[tokio::test]
async fn test_paystack_default_fee_is_capped() {
    let h = Harness::new().await;

    let result = h.engine.process(paystack_credit("R1", 500_000_00)).await;

    let tx = result.transaction.unwrap();
    assert_eq!(tx.fee, dec!(2000));
    assert_eq!(h.balance().await, dec!(498000.00));
}

#[tokio::test]
async fn test_safehaven_is_never_charged() {
    let h = Harness::new().await;
    h.set_fee(FeeConfiguration::fixed("FUNDING", dec!(25))).await;
    h.set_fee(FeeConfiguration::fixed("FUNDING_SAFEHAVEN", dec!(25)))
        .await;

    let result = h
        .engine
        .process(safehaven_request(&safehaven_payload("SH-1", 2500.0, ACCOUNT)))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.transaction.unwrap().fee, Decimal::ZERO);
    assert_eq!(h.balance().await, dec!(2500));
}

#[tokio::test]
async fn test_provider_fee_rules_do_not_leak() {
    let h = Harness::new().await;
    h.set_fee(FeeConfiguration::fixed("FUNDING_PAYSTACK", dec!(99)))
        .await;

    let result = h
        .engine
        .process(monnify_request(&monnify_payload("M1", "1000.00", ACCOUNT)))
        .await;

    // Monnify falls through to its built-in 1 %.
    assert_eq!(result.transaction.unwrap().fee, dec!(10.00));
    assert_eq!(h.balance().await, dec!(990.00));
}

#[tokio::test]
async fn test_non_credit_events_never_move_money() {
    let h = Harness::new().await;

    let pending = bloc_payload("transaction.pending", "BL-1", 500_00, ACCOUNT);
    let result = h.engine.process(bloc_request(&pending)).await;
    assert!(result.success);
    assert!(!result.wallet_updated);

    let mut failed = paystack_payload("PS-F", 500_00, ACCOUNT);
    failed["event"] = "transfer.failed".into();
    failed["data"]["status"] = "failed".into();
    let result = h.engine.process(paystack_request(&failed)).await;
    assert!(result.success);
    assert!(!result.wallet_updated);

    assert_eq!(h.balance().await, Decimal::ZERO);
    assert!(h.store.transactions().await.is_empty());
    let log = h.log("BL-1", &Provider::Bloc).await.unwrap();
    assert_eq!(log.status, LogStatus::Ignored);
}

#[tokio::test]
async fn test_unknown_account_is_rejected_and_logged() {
    let h = Harness::new().await;

    let payload = paystack_payload("R1", 100_000, "0000000000");
    let result = h.engine.process(paystack_request(&payload)).await;

    assert!(!result.success);
    assert!(result.processed);
    assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    let log = h.log("R1", &Provider::Paystack).await.unwrap();
    assert_eq!(log.status, LogStatus::Rejected);
    assert!(log.error.unwrap().contains("0000000000"));
}

#[tokio::test]
async fn test_storage_fault_leaves_no_partial_effect() {
    let h = Harness::with_ledger(test_config(), |store| -> Arc<dyn LedgerStore> {
        Arc::new(FlakyLedger {
            inner: store,
            fail_commits: AtomicBool::new(true),
        })
    })
    .await;

    let result = h.engine.process(paystack_credit("R1", 100_000)).await;

    assert!(!result.success);
    assert!(!result.processed);
    assert!(!result.wallet_updated);
    assert_eq!(result.error_kind, Some(ErrorKind::Infrastructure));
    assert_eq!(h.balance().await, Decimal::ZERO);
    assert!(h.store.transactions().await.is_empty());
    assert!(h.store.funding_records(h.wallet.id).await.unwrap().is_empty());
    let log = h.log("R1", &Provider::Paystack).await.unwrap();
    assert_eq!(log.status, LogStatus::Failed);
    assert!(!log.wallet_updated);
}

#[tokio::test]
async fn test_redelivery_after_storage_fault_applies_once() {
    let flaky: Arc<Mutex<Option<Arc<FlakyLedger>>>> = Arc::new(Mutex::new(None));
    let handle = flaky.clone();
    let h = Harness::with_ledger(test_config(), move |store| -> Arc<dyn LedgerStore> {
        let ledger = Arc::new(FlakyLedger {
            inner: store,
            fail_commits: AtomicBool::new(true),
        });
        *handle.lock().unwrap() = Some(ledger.clone());
        ledger
    })
    .await;

    let first = h.engine.process(paystack_credit("R1", 100_000)).await;
    assert_eq!(first.error_kind, Some(ErrorKind::Infrastructure));

    let ledger = flaky.lock().unwrap().clone().unwrap();
    ledger.fail_commits.store(false, Ordering::SeqCst);

    let second = h.engine.process(paystack_credit("R1", 100_000)).await;
    assert!(second.success, "{:?}", second.error);
    assert_eq!(h.balance().await, dec!(985.00));

    let log = h.log("R1", &Provider::Paystack).await.unwrap();
    assert_eq!(log.status, LogStatus::Processed);
    assert_eq!(log.delivery_count, 2);
    assert_eq!(log.error, None);
}

#[tokio::test]
async fn test_version_conflict_is_retried_until_commit_lands() {
    let conflicting: Arc<Mutex<Option<Arc<ConflictingLedger>>>> = Arc::new(Mutex::new(None));
    let handle = conflicting.clone();
    let h = Harness::with_ledger(test_config(), move |store| -> Arc<dyn LedgerStore> {
        let ledger = Arc::new(ConflictingLedger::new(store, 2));
        *handle.lock().unwrap() = Some(ledger.clone());
        ledger
    })
    .await;

    let result = h.engine.process(paystack_credit("R1", 100_000)).await;

    assert!(result.success, "{:?}", result.error);
    let ledger = conflicting.lock().unwrap().clone().unwrap();
    assert_eq!(ledger.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(h.balance().await, dec!(985.00));
    assert_eq!(h.wallet_state().await.version, 1);
    assert_eq!(h.store.transactions().await.len(), 1);
    assert_eq!(h.store.funding_records(h.wallet.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_version_conflict_gives_up_after_max_attempts() {
    let conflicting: Arc<Mutex<Option<Arc<ConflictingLedger>>>> = Arc::new(Mutex::new(None));
    let handle = conflicting.clone();
    let h = Harness::with_ledger(test_config(), move |store| -> Arc<dyn LedgerStore> {
        let ledger = Arc::new(ConflictingLedger::new(store, 3));
        *handle.lock().unwrap() = Some(ledger.clone());
        ledger
    })
    .await;

    let result = h.engine.process(paystack_credit("R1", 100_000)).await;

    assert!(!result.success);
    assert!(!result.wallet_updated);
    assert_eq!(result.error_kind, Some(ErrorKind::Infrastructure));
    let ledger = conflicting.lock().unwrap().clone().unwrap();
    assert_eq!(ledger.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(h.balance().await, Decimal::ZERO);
    assert_eq!(h.wallet_state().await.version, 0);
    assert!(h.store.transactions().await.is_empty());

    // The conflicts are spent; a redelivery now commits.
    let again = h.engine.process(paystack_credit("R1", 100_000)).await;
    assert!(again.success, "{:?}", again.error);
    assert_eq!(h.balance().await, dec!(985.00));
}

#[tokio::test]
async fn test_post_commit_mismatch_is_reported_not_reversed() {
    let h = Harness::with_ledger(test_config(), |store| -> Arc<dyn LedgerStore> {
        Arc::new(SkewedLedger {
            inner: store,
            hidden: Mutex::new(HashSet::new()),
        })
    })
    .await;
    h.set_fee(FeeConfiguration::percentage("FUNDING_PAYSTACK", dec!(10)))
        .await;

    let result = h.engine.process(paystack_credit("R1", 100_000)).await;

    assert!(!result.success);
    assert!(result.warning);
    assert!(result.wallet_updated);
    assert_eq!(result.error_kind, Some(ErrorKind::IntegrityAnomaly));
    assert!(result.message.contains("manual reconciliation"));
    assert!(result.transaction.is_some());
    let validation = result.balance_validation.unwrap();
    assert!(validation.before.is_valid);
    assert!(!validation.after.is_valid);
    assert_eq!(validation.after.discrepancy, dec!(900.00));

    // Committed, not rolled back.
    assert_eq!(h.balance().await, dec!(900.00));
    assert_eq!(h.store.transactions().await.len(), 1);

    let log = h.log("R1", &Provider::Paystack).await.unwrap();
    assert_eq!(log.status, LogStatus::Anomaly);
    assert!(log.wallet_updated);
    assert!(log.warning.is_some());
}
