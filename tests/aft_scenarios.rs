//! End-to-end AFT scenarios: register, lock, transfer, replay, reject,
//! redeem. Runs against the file-backed store so durability is part of
//! every assertion path.

use aft_core::config::{RedemptionConfig, TransferConfig};
use aft_core::core_types::REGISTRATION_KEY_LEN;
use aft_core::negotiator::TransferNegotiator;
use aft_core::redemption::{TicketCategory, TicketRedeemer, TicketStatus};
use aft_core::storage::FileStore;
use aft_core::{
    Bank, FundAmounts, InMemoryBank, LockRequestResult, RegistrationPollResult, TransferCode,
    TransferRequest, TransferStatus, TransferType,
};
use tempfile::TempDir;

const KEY: [u8; REGISTRATION_KEY_LEN] = [0x5A; REGISTRATION_KEY_LEN];

fn engine_in(dir: &TempDir) -> TransferNegotiator {
    let store = FileStore::open(dir.path()).unwrap();
    TransferNegotiator::new(TransferConfig::default(), false, Box::new(store)).unwrap()
}

fn transfer(txn_id: &str, cents: u64) -> TransferRequest {
    let mut req = TransferRequest::new(
        TransferCode::FullTransferOnly,
        TransferType::InHouseToMachine,
        FundAmounts::cashable_only(cents),
        txn_id,
    );
    req.asset_number = 1001;
    req.registration_key = KEY;
    req
}

/// Register asset 1001, take the lock, move 500 cents in.
#[test]
fn register_lock_and_transfer() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    let mut bank = InMemoryBank::new();

    let result = engine.register(1001, KEY, 42).unwrap();
    assert!(matches!(result, RegistrationPollResult::Accepted(ref s) if s.is_registered()));

    // timeout 3000 hundredths = 30s
    assert_eq!(engine.request_lock(3000).unwrap(), LockRequestResult::Locked);

    let outcome = engine.process(&mut bank, &transfer("TX1", 500)).unwrap();
    assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);
    assert_eq!(bank.balances().cashable(), 500);
    assert_eq!(
        engine.history().get_by_index(0).unwrap().transaction_id,
        "TX1"
    );
}

/// Resubmitting TX1 replays the stored outcome with no second credit.
#[test]
fn replay_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    let mut bank = InMemoryBank::new();
    engine.register(1001, KEY, 42).unwrap();

    let req = transfer("TX1", 500);
    let first = engine.process(&mut bank, &req).unwrap();
    let second = engine.process(&mut bank, &req).unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.amounts, second.amounts);
    assert_eq!(first.transaction_index, second.transaction_index);
    assert_eq!(first.timestamp, second.timestamp);
    assert_eq!(bank.balances().cashable(), 500);
    assert_eq!(engine.history().len(), 1);
}

/// TX2 over the game limit rejects and changes nothing.
#[test]
fn over_limit_rejected() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    let mut bank = InMemoryBank::new();
    engine.register(1001, KEY, 42).unwrap();

    let outcome = engine
        .process(&mut bank, &transfer("TX2", 10_000_000))
        .unwrap();
    assert_eq!(outcome.status, TransferStatus::TransferAmountExceedsGameLimit);
    assert!(bank.balances().is_zero());
}

/// Transfers, registration and meters all survive a process restart.
#[test]
fn durable_across_restart() {
    let dir = TempDir::new().unwrap();
    let mut bank = InMemoryBank::new();
    {
        let mut engine = engine_in(&dir);
        engine.register(1001, KEY, 42).unwrap();
        engine.process(&mut bank, &transfer("TX1", 500)).unwrap();
    }

    let mut engine = engine_in(&dir);
    assert!(engine.registration().is_registered());
    assert_eq!(engine.registration().asset_number, 1001);
    assert_eq!(
        engine
            .history()
            .find_by_transaction_id("TX1")
            .unwrap()
            .status,
        TransferStatus::FullTransferSuccessful
    );
    assert_eq!(
        engine.meters().get(TransferType::InHouseToMachine).cashable(),
        500
    );

    // And the replay guarantee holds across the restart too.
    let outcome = engine.process(&mut bank, &transfer("TX1", 500)).unwrap();
    assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);
    assert_eq!(bank.balances().cashable(), 500);
}

/// A wrong registration key is rejected before any funds check.
#[test]
fn key_mismatch_rejected() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    let mut bank = InMemoryBank::new();
    engine.register(1001, KEY, 42).unwrap();

    let mut req = transfer("TX1", 500);
    req.registration_key = [0x11; REGISTRATION_KEY_LEN];
    let outcome = engine.process(&mut bank, &req).unwrap();
    assert_eq!(outcome.status, TransferStatus::RegistrationKeyDoesNotMatch);
    assert!(bank.balances().is_zero());
}

/// Cancel a pending ticket redemption before host confirmation; a later
/// interrogation reports the canceled cycle, never a redemption.
#[test]
fn canceled_redemption_never_redeems() {
    let dir = TempDir::new().unwrap();
    let mut store = FileStore::open(dir.path()).unwrap();
    let mut bank = InMemoryBank::new();
    let mut redeemer = TicketRedeemer::new(RedemptionConfig::default());

    let status = redeemer.insert_ticket(&mut store, "00123456789").unwrap();
    assert_eq!(status, TicketStatus::WaitingForHostValidation);

    redeemer.cancel(&mut store).unwrap();
    assert_eq!(
        redeemer.interrogate("00123456789"),
        TicketStatus::RedemptionCanceledByMachine
    );

    // Late host confirmation after the cancel credits nothing
    let status = redeemer
        .host_authorize(&mut store, &mut bank, "00123456789", 2500, TicketCategory::Cashable)
        .unwrap();
    assert_eq!(status, TicketStatus::NoValidationInformationAvailable);
    assert!(bank.balances().is_zero());

    // The canceled cycle is durable
    let recovered = TicketRedeemer::recover(&store, RedemptionConfig::default()).unwrap();
    assert_eq!(
        recovered.interrogate("00123456789"),
        TicketStatus::RedemptionCanceledByMachine
    );
}

/// Full-or-nothing: a full-only request either moves exactly what was
/// asked or nothing at all.
#[test]
fn full_or_nothing() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in(&dir);
    let mut bank = InMemoryBank::with_balances(FundAmounts::cashable_only(300), 0);
    engine.register(1001, KEY, 42).unwrap();

    let mut req = transfer("TX1", 500);
    req.transfer_type = TransferType::InHouseToHost;
    let outcome = engine.process(&mut bank, &req).unwrap();
    assert_eq!(
        outcome.status,
        TransferStatus::NoWonCreditsAvailableForCashOut
    );
    assert_eq!(bank.balances().cashable(), 300);
}
