//! Transfer negotiator
//!
//! The central AFT engine. Validates each transfer poll against
//! registration/lock state and the bank, decides accept/partial/reject,
//! applies funds, and records the outcome in the history ring.
//!
//! # Replay discipline
//!
//! The transaction id is the host's idempotency key. An equal resubmission
//! returns the stored outcome unchanged; a divergent payload under the same
//! id is `TransactionIdNotUnique`. Funds are applied at most once per id.
//!
//! # Crash safety
//!
//! Accepted transfers follow persist-before-call: the outcome is appended
//! `Pending` and committed, funds are applied at the bank, then the entry
//! is resolved to its terminal status. A crash in the gap leaves a durable
//! `Pending` entry that the host reconciles by interrogation or cancel;
//! the core never re-applies and never silently discards it.

use crate::amounts::{CumulativeMeters, FundAmounts};
use crate::bank::Bank;
use crate::codes::{ReceiptStatus, TransferCode, TransferDirection, TransferStatus};
use crate::config::TransferConfig;
use crate::core_types::{AssetNumber, LockTimeout, TransactionIndex};
use crate::error::AftError;
use crate::history::HistoryLog;
use crate::lock::{LockContext, LockManager, LockRequestResult, LockStatus, TransferConditions};
use crate::outcome::TransferOutcome;
use crate::registration::{RegistrationManager, RegistrationPollResult, RegistrationState};
use crate::request::TransferRequest;
use crate::storage::{blocks, read_record, write_record, StateStore};
use tracing::{debug, info, warn};

/// Data for the fixed-length game-lock-and-status response.
#[derive(Debug, Clone)]
pub struct GameLockStatusReport {
    pub asset_number: AssetNumber,
    pub lock_status: LockStatus,
    pub available_transfers: TransferConditions,
    pub history_capacity: u8,
    pub balances: FundAmounts,
    pub transfer_limit: u64,
    pub restricted_expiration: u32,
    pub restricted_pool_id: u16,
}

/// The AFT core engine. Owns registration, lock, history, meters and the
/// durable store; the bank is passed per poll because other subsystems
/// (game play, hand pay) share it between polls.
pub struct TransferNegotiator {
    config: TransferConfig,
    registration: RegistrationManager,
    lock: LockManager,
    history: HistoryLog,
    meters: CumulativeMeters,
    store: Box<dyn StateStore>,
}

impl TransferNegotiator {
    /// Build the engine, recovering all persisted state from the store.
    pub fn new(
        config: TransferConfig,
        require_operator_ack: bool,
        store: Box<dyn StateStore>,
    ) -> Result<Self, AftError> {
        let registration = RegistrationManager::recover(store.as_ref(), require_operator_ack)?;
        let lock = LockManager::recover(store.as_ref(), config.lock_pending_phase)?;
        let history = HistoryLog::recover(store.as_ref(), config.history_capacity)?;
        let meters: CumulativeMeters =
            read_record(store.as_ref(), blocks::METERS, 0)?.unwrap_or_default();

        let mut negotiator = Self {
            config,
            registration,
            lock,
            history,
            meters,
            store,
        };
        negotiator.refresh_conditions();
        Ok(negotiator)
    }

    pub fn registration(&self) -> &RegistrationState {
        self.registration.state()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn meters(&self) -> &CumulativeMeters {
        &self.meters
    }

    pub fn lock_status(&self) -> LockStatus {
        self.lock.status()
    }

    /// True while any transfer is unresolved; gates unregister.
    pub fn transfer_in_flight(&self) -> bool {
        !self.history.pending_transaction_ids().is_empty()
    }

    /// Tear down, handing back the store (restart and test flows).
    pub fn into_store(self) -> Box<dyn StateStore> {
        self.store
    }

    // ========================================================
    // REGISTRATION POLLS
    // ========================================================

    pub fn initialize_registration(&mut self) -> Result<RegistrationState, AftError> {
        let state = self.registration.initialize(self.store.as_mut())?;
        self.refresh_conditions();
        Ok(state)
    }

    pub fn register(
        &mut self,
        asset_number: AssetNumber,
        key: crate::core_types::RegistrationKey,
        pos_id: u32,
    ) -> Result<RegistrationPollResult, AftError> {
        let result = self
            .registration
            .register(self.store.as_mut(), asset_number, key, pos_id)?;
        self.refresh_conditions();
        Ok(result)
    }

    pub fn unregister(&mut self) -> Result<RegistrationPollResult, AftError> {
        let in_flight = self.transfer_in_flight();
        let result = self.registration.unregister(self.store.as_mut(), in_flight)?;
        self.refresh_conditions();
        Ok(result)
    }

    // ========================================================
    // LOCK POLLS
    // ========================================================

    pub fn request_lock(&mut self, timeout: LockTimeout) -> Result<LockRequestResult, AftError> {
        self.lock.request_lock(self.store.as_mut(), timeout)
    }

    pub fn acknowledge_lock(&mut self) -> Result<LockStatus, AftError> {
        self.lock.acknowledge(self.store.as_mut())
    }

    pub fn cancel_lock(&mut self) -> Result<LockStatus, AftError> {
        self.lock.cancel(self.store.as_mut())
    }

    /// Evaluate the lock deadline; returns true when a timeout fired.
    pub fn poll_lock_expiry(&mut self) -> Result<bool, AftError> {
        self.lock.poll_expiry(self.store.as_mut())
    }

    /// Data set for the game-lock-and-status response.
    pub fn game_lock_status(&mut self, bank: &dyn Bank) -> Result<GameLockStatusReport, AftError> {
        self.lock.poll_expiry(self.store.as_mut())?;
        Ok(GameLockStatusReport {
            asset_number: self.registration.state().asset_number,
            lock_status: self.lock.status(),
            available_transfers: self.lock.conditions(),
            history_capacity: self.config.history_capacity.min(0xFF) as u8,
            balances: bank.balances(),
            transfer_limit: self.config.transfer_limit,
            restricted_expiration: bank.restricted_expiration(),
            restricted_pool_id: bank.restricted_pool_id().unwrap_or(0),
        })
    }

    // ========================================================
    // TRANSFER POLLS
    // ========================================================

    /// Process one AFT transfer poll to completion.
    ///
    /// Every return is a protocol-level outcome; `Err` is reserved for the
    /// fatal taxonomy (storage corruption, meter overflow, ring full of
    /// pending entries).
    pub fn process(
        &mut self,
        bank: &mut dyn Bank,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, AftError> {
        self.lock.poll_expiry(self.store.as_mut())?;

        match request.transfer_code {
            TransferCode::InterrogationRequestStatusOnly | TransferCode::InterrogationRequest => {
                return Ok(self.interrogate(request));
            }
            TransferCode::CancelTransferRequest => return self.cancel_transfer(request),
            TransferCode::FullTransferOnly | TransferCode::PartialTransferAllowed => {}
        }

        // Step 1: duplicate check
        if let Some(stored) = self.history.find_by_transaction_id(&request.transaction_id) {
            if stored.is_duplicate_of(request) {
                debug!(txn_id = %request.transaction_id, "duplicate request, replaying outcome");
                return Ok(stored.clone());
            }
            warn!(txn_id = %request.transaction_id, "transaction id reused with divergent payload");
            return Ok(TransferOutcome::rejection(
                request,
                TransferStatus::TransactionIdNotUnique,
            ));
        }

        // Steps 2-3: eligibility and funds, fixed precedence
        if let Some(status) = self.eligibility_reject(bank, request) {
            debug!(txn_id = %request.transaction_id, status = %status, "transfer rejected");
            return self.reject(request, status);
        }

        // Step 4: partial negotiation
        let actual = match self.negotiate_amounts(bank, request) {
            Ok(actual) => actual,
            Err(status) => {
                debug!(txn_id = %request.transaction_id, status = %status, "transfer rejected");
                return self.reject(request, status);
            }
        };
        debug_assert!(actual.fits_within(&request.amounts));

        // Steps 5-7: persist pending, apply, resolve
        self.apply(bank, request, actual)
    }

    /// Record a rejection in the ring and return the stored outcome.
    ///
    /// Rejections are history entries like every other outcome: a host
    /// retry of the same transaction id must replay the identical
    /// rejection even after the machine state that caused it has changed.
    fn reject(
        &mut self,
        request: &TransferRequest,
        status: TransferStatus,
    ) -> Result<TransferOutcome, AftError> {
        let outcome = TransferOutcome::rejection(request, status);
        self.history.append(self.store.as_mut(), outcome)?;
        Ok(self
            .history
            .find_by_transaction_id(&request.transaction_id)
            .expect("just appended")
            .clone())
    }

    /// Step 2 and 3 checks. `None` means eligible.
    fn eligibility_reject(
        &self,
        bank: &dyn Bank,
        request: &TransferRequest,
    ) -> Option<TransferStatus> {
        if !request.amounts_consistent_with_type() {
            return Some(TransferStatus::NotAValidTransferFunction);
        }
        let total = match request.amounts.total() {
            None | Some(0) => {
                return Some(TransferStatus::NotAValidTransferAmountOrExpiration)
            }
            Some(total) => total,
        };

        // One outstanding transfer at a time.
        if self.transfer_in_flight() {
            return Some(TransferStatus::NotCompatibleWithCurrentTransfer);
        }

        let registration = self.registration.state();
        let key_supplied = request.registration_key != crate::core_types::ZERO_REGISTRATION_KEY;
        let requires_registration = request.transfer_type.is_debit() || key_supplied;
        if requires_registration && !registration.is_registered() {
            return Some(TransferStatus::GamingMachineNotRegistered);
        }
        if registration.is_registered() && !registration.key_matches(&request.registration_key) {
            return Some(TransferStatus::RegistrationKeyDoesNotMatch);
        }
        if request.flags.accept_only_if_locked() && !self.lock.is_locked() {
            return Some(TransferStatus::GamingMachineNotLocked);
        }
        if request.asset_number != 0
            && registration.is_registered()
            && request.asset_number != registration.asset_number
        {
            return Some(TransferStatus::AssetNumberZeroOrDoesNotMatch);
        }
        if request.transfer_type.is_debit() && registration.pos_id == 0 {
            return Some(TransferStatus::NoPosId);
        }

        let direction = request.transfer_type.direction();
        if direction == TransferDirection::ToTicket {
            if !self.config.ticket_device_available {
                return Some(TransferStatus::TransferToTicketDeviceNotAvailable);
            }
            if request.expiration == 0 {
                return Some(TransferStatus::ExpirationNotValidForTransferToTicket);
            }
        }
        if request.amounts.restricted() > 0 && request.expiration == 0 {
            return Some(TransferStatus::NotAValidTransferAmountOrExpiration);
        }
        if request.flags.receipt_requested() && request.transfer_type.is_bonus() {
            return Some(TransferStatus::TransactionReceiptNotAllowedForTransferType);
        }

        // Step 3: funds checks
        match direction {
            TransferDirection::ToMachine | TransferDirection::ToTicket => {
                if self.config.denomination == 0 {
                    return Some(TransferStatus::NoGamingMachineDenominationSet);
                }
                if request.transfer_code == TransferCode::FullTransferOnly {
                    // Full-only limit/multiple violations reject outright;
                    // partial-allowed requests negotiate down instead.
                    if total > self.config.transfer_limit {
                        return Some(TransferStatus::TransferAmountExceedsGameLimit);
                    }
                    if !request.amounts.is_even_multiple_of(self.config.denomination) {
                        return Some(TransferStatus::TransferAmountNotEvenMultiple);
                    }
                }
                if request.amounts.restricted() > 0 {
                    if let Some(held_pool) = bank.restricted_pool_id() {
                        if held_pool != request.pool_id {
                            return Some(
                                TransferStatus::UnableToAcceptTransferDueToExistingRestrictedAmounts,
                            );
                        }
                    }
                }
            }
            TransferDirection::ToHost => {
                if request.transfer_code == TransferCode::FullTransferOnly
                    && !request.amounts.fits_within(&bank.balances())
                {
                    return Some(TransferStatus::NoWonCreditsAvailableForCashOut);
                }
            }
        }

        None
    }

    /// Step 4: decide the amounts actually moved.
    fn negotiate_amounts(
        &self,
        bank: &dyn Bank,
        request: &TransferRequest,
    ) -> Result<FundAmounts, TransferStatus> {
        let cap = match request.transfer_type.direction() {
            TransferDirection::ToHost => bank.balances(),
            TransferDirection::ToMachine | TransferDirection::ToTicket => {
                self.limit_cap(&request.amounts)
            }
        };

        match request.transfer_code {
            TransferCode::FullTransferOnly => {
                // Specific causes rejected in eligibility; anything else
                // that still prevents the full amount is all-or-nothing.
                if request.amounts.fits_within(&cap) {
                    Ok(request.amounts)
                } else {
                    Err(TransferStatus::GamingMachineUnableToPerformPartial)
                }
            }
            TransferCode::PartialTransferAllowed => {
                let clamped = request
                    .amounts
                    .clamped_to(&cap)
                    .rounded_down_to(self.config.denomination);
                if clamped.is_zero() {
                    Err(match request.transfer_type.direction() {
                        TransferDirection::ToHost => {
                            TransferStatus::NoWonCreditsAvailableForCashOut
                        }
                        _ => TransferStatus::GamingMachineUnableToPerformPartial,
                    })
                } else {
                    Ok(clamped)
                }
            }
            _ => unreachable!("interrogation and cancel handled before negotiation"),
        }
    }

    /// Per-category cap keeping the combined amount within the machine
    /// transfer limit: cashable first, then restricted, then nonrestricted.
    fn limit_cap(&self, requested: &FundAmounts) -> FundAmounts {
        let mut remaining = self.config.transfer_limit;
        let cashable = requested.cashable().min(remaining);
        remaining -= cashable;
        let restricted = requested.restricted().min(remaining);
        remaining -= restricted;
        let nonrestricted = requested.nonrestricted().min(remaining);
        FundAmounts::new(cashable, restricted, nonrestricted)
    }

    /// Steps 5-7: persist pending, apply at the bank, resolve terminal.
    fn apply(
        &mut self,
        bank: &mut dyn Bank,
        request: &TransferRequest,
        actual: FundAmounts,
    ) -> Result<TransferOutcome, AftError> {
        let full = actual == request.amounts;
        let receipt_status = if request.flags.receipt_requested() {
            ReceiptStatus::ReceiptPending
        } else {
            ReceiptStatus::NoReceiptRequested
        };

        let mut outcome = TransferOutcome::rejection(request, TransferStatus::UnexpectedError);
        outcome.status = TransferStatus::TransferPending;
        outcome.receipt_status = receipt_status;
        outcome.amounts = actual;
        self.history.append(self.store.as_mut(), outcome.clone())?;

        // Ticket transfers stay pending until the printer confirms; funds
        // never enter the bank.
        if request.transfer_type.direction() == TransferDirection::ToTicket {
            info!(txn_id = %request.transaction_id, amounts = %actual, "ticket transfer pending print");
            return Ok(self
                .history
                .find_by_transaction_id(&request.transaction_id)
                .expect("just appended")
                .clone());
        }

        let applied = match request.transfer_type.direction() {
            TransferDirection::ToMachine => {
                bank.credit(&actual, request.pool_id, request.expiration)
            }
            TransferDirection::ToHost => bank.try_debit(&actual),
            TransferDirection::ToTicket => unreachable!(),
        };

        let status = if !applied {
            // Bank refused after eligibility passed (balance raced with
            // game play, or overflow). Nothing moved.
            warn!(txn_id = %request.transaction_id, "bank refused apply");
            match request.transfer_type.direction() {
                TransferDirection::ToHost => TransferStatus::NoWonCreditsAvailableForCashOut,
                _ => TransferStatus::GamingMachineUnableToPerformPartial,
            }
        } else {
            self.meters
                .bump(request.transfer_type, &actual)
                .map_err(AftError::MeterOverflow)?;
            write_record(self.store.as_mut(), blocks::METERS, 0, &self.meters)?;
            if full {
                TransferStatus::FullTransferSuccessful
            } else {
                TransferStatus::PartialTransferSuccessful
            }
        };

        self.resolve(request, status)
    }

    /// Resolve the pending entry, stamping final amounts and meters.
    fn resolve(
        &mut self,
        request: &TransferRequest,
        status: TransferStatus,
    ) -> Result<TransferOutcome, AftError> {
        self.history
            .resolve_pending(self.store.as_mut(), &request.transaction_id, status)?;
        let stored = self
            .history
            .find_by_transaction_id(&request.transaction_id)
            .expect("resolved entry exists");
        let mut outcome = stored.clone();
        if status.is_success() {
            outcome.cumulative = *self.meters.get(request.transfer_type);
            self.history
                .set_cumulative(self.store.as_mut(), &request.transaction_id, outcome.cumulative)?;
        } else {
            // Rejected after pending: nothing moved.
            outcome.amounts = FundAmounts::ZERO;
            self.history
                .zero_amounts(self.store.as_mut(), &request.transaction_id)?;
        }
        info!(txn_id = %request.transaction_id, status = %status, amounts = %outcome.amounts, "transfer resolved");
        Ok(outcome)
    }

    /// Interrogation polls echo stored outcomes and never mutate state.
    fn interrogate(&self, request: &TransferRequest) -> TransferOutcome {
        let stored = if request.transfer_code == TransferCode::InterrogationRequestStatusOnly {
            if request.transaction_id.is_empty() {
                self.history.last()
            } else {
                self.history.find_by_transaction_id(&request.transaction_id)
            }
        } else {
            // Transaction index rides in the pool id field low byte for
            // interrogation polls; the wire layer fills it in.
            self.history.get_by_index(request.pool_id as TransactionIndex)
        };

        match stored {
            Some(outcome) => outcome.clone(),
            None => TransferOutcome::rejection(
                request,
                TransferStatus::NoTransferInformationAvailable,
            ),
        }
    }

    /// Cancel poll. Only a pending transfer can be canceled; a terminal
    /// one replays its stored outcome (funds already applied or refused).
    fn cancel_transfer(&mut self, request: &TransferRequest) -> Result<TransferOutcome, AftError> {
        let Some(stored) = self.history.find_by_transaction_id(&request.transaction_id) else {
            return Ok(TransferOutcome::rejection(
                request,
                TransferStatus::TransactionIdNotValid,
            ));
        };
        if !stored.is_pending() {
            debug!(txn_id = %request.transaction_id, status = %stored.status, "cancel after terminal state, replaying");
            return Ok(stored.clone());
        }
        self.history.resolve_pending(
            self.store.as_mut(),
            &request.transaction_id,
            TransferStatus::TransferCanceledByHost,
        )?;
        self.history
            .zero_amounts(self.store.as_mut(), &request.transaction_id)?;
        info!(txn_id = %request.transaction_id, "pending transfer canceled by host");
        Ok(self
            .history
            .find_by_transaction_id(&request.transaction_id)
            .expect("entry exists")
            .clone())
    }

    /// Printer confirmation for a pending ticket transfer.
    pub fn complete_ticket_transfer(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<TransferOutcome>, AftError> {
        let Some(stored) = self.history.find_by_transaction_id(transaction_id) else {
            return Ok(None);
        };
        if !stored.is_pending() {
            return Ok(Some(stored.clone()));
        }
        let transfer_type = stored.transfer_type;
        let actual = stored.amounts;
        let full = actual == stored.requested_amounts;

        self.meters
            .bump(transfer_type, &actual)
            .map_err(AftError::MeterOverflow)?;
        write_record(self.store.as_mut(), blocks::METERS, 0, &self.meters)?;
        let status = if full {
            TransferStatus::FullTransferSuccessful
        } else {
            TransferStatus::PartialTransferSuccessful
        };
        self.history
            .resolve_pending(self.store.as_mut(), transaction_id, status)?;
        self.history.set_cumulative(
            self.store.as_mut(),
            transaction_id,
            *self.meters.get(transfer_type),
        )?;
        info!(txn_id = %transaction_id, "ticket transfer completed");
        Ok(self
            .history
            .find_by_transaction_id(transaction_id)
            .cloned())
    }

    // ========================================================
    // RECEIPT COMPLETION (printer collaborator callbacks)
    // ========================================================

    /// Printer reports the receipt is on its way out.
    pub fn receipt_printing(&mut self, transaction_id: &str) -> Result<(), AftError> {
        self.history.set_receipt_status(
            self.store.as_mut(),
            transaction_id,
            ReceiptStatus::ReceiptPrintingInProgress,
        )
    }

    /// Printer reports the receipt printed.
    pub fn receipt_printed(&mut self, transaction_id: &str) -> Result<(), AftError> {
        self.history.set_receipt_status(
            self.store.as_mut(),
            transaction_id,
            ReceiptStatus::ReceiptPrinted,
        )
    }

    /// Printer failure. The already-applied funds transfer stands; only
    /// the receipt is reported unprintable.
    pub fn receipt_failed(&mut self, transaction_id: &str) -> Result<TransferStatus, AftError> {
        warn!(txn_id = %transaction_id, "receipt print failed; funds transfer stands");
        self.history.set_receipt_status(
            self.store.as_mut(),
            transaction_id,
            ReceiptStatus::NoReceiptRequested,
        )?;
        Ok(TransferStatus::UnableToPrintTransactionReceipt)
    }

    fn refresh_conditions(&mut self) {
        let ctx = LockContext {
            registered: self.registration.is_registered(),
            ticket_device_available: self.config.ticket_device_available,
            win_pending_cashout: false,
            bonus_award_allowed: self.registration.is_registered(),
        };
        self.lock.recompute_conditions(&ctx);
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::InMemoryBank;
    use crate::codes::TransferType;
    use crate::flags::TransferFlags;
    use crate::storage::MemoryStore;

    fn engine(config: TransferConfig) -> TransferNegotiator {
        TransferNegotiator::new(config, false, Box::new(MemoryStore::new())).unwrap()
    }

    fn request(txn_id: &str, cents: u64) -> TransferRequest {
        TransferRequest::new(
            TransferCode::FullTransferOnly,
            TransferType::InHouseToMachine,
            FundAmounts::cashable_only(cents),
            txn_id,
        )
    }

    #[test]
    fn test_full_transfer_success() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();

        let outcome = engine.process(&mut bank, &request("TX1", 500)).unwrap();
        assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);
        assert_eq!(outcome.amounts, FundAmounts::cashable_only(500));
        assert_eq!(bank.balances().cashable(), 500);
        assert_eq!(
            engine.history().get_by_index(0).unwrap().transaction_id,
            "TX1"
        );
        assert_eq!(
            engine.meters().get(TransferType::InHouseToMachine).cashable(),
            500
        );
    }

    #[test]
    fn test_duplicate_replays_without_double_apply() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();
        let req = request("TX1", 500);

        let first = engine.process(&mut bank, &req).unwrap();
        let second = engine.process(&mut bank, &req).unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.amounts, second.amounts);
        assert_eq!(first.cumulative, second.cumulative);
        // Applied exactly once
        assert_eq!(bank.balances().cashable(), 500);
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_reused_id_with_divergent_payload() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();

        engine.process(&mut bank, &request("TX1", 500)).unwrap();
        let outcome = engine.process(&mut bank, &request("TX1", 600)).unwrap();

        assert_eq!(outcome.status, TransferStatus::TransactionIdNotUnique);
        assert_eq!(bank.balances().cashable(), 500);
    }

    #[test]
    fn test_full_only_exceeding_limit_rejected() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();

        let outcome = engine
            .process(&mut bank, &request("TX2", 10_000_000))
            .unwrap();
        assert_eq!(outcome.status, TransferStatus::TransferAmountExceedsGameLimit);
        assert_eq!(outcome.amounts, FundAmounts::ZERO);
        assert!(bank.balances().is_zero());
        // Rejections occupy the ring like every other outcome.
        assert_eq!(engine.history().len(), 1);
        assert_eq!(
            engine
                .history()
                .find_by_transaction_id("TX2")
                .unwrap()
                .status,
            TransferStatus::TransferAmountExceedsGameLimit
        );
    }

    #[test]
    fn test_partial_clamps_to_limit() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();

        let mut req = request("TX1", 150_000);
        req.transfer_code = TransferCode::PartialTransferAllowed;
        let outcome = engine.process(&mut bank, &req).unwrap();

        assert_eq!(outcome.status, TransferStatus::PartialTransferSuccessful);
        assert_eq!(outcome.amounts, FundAmounts::cashable_only(100_000));
        assert_eq!(outcome.requested_amounts, FundAmounts::cashable_only(150_000));
        assert_eq!(bank.balances().cashable(), 100_000);
    }

    #[test]
    fn test_full_only_not_even_multiple() {
        let mut config = TransferConfig::default();
        config.denomination = 25;
        let mut engine = engine(config);
        let mut bank = InMemoryBank::new();

        let outcome = engine.process(&mut bank, &request("TX1", 510)).unwrap();
        assert_eq!(outcome.status, TransferStatus::TransferAmountNotEvenMultiple);
        assert!(bank.balances().is_zero());

        // Whole credits go through.
        let outcome = engine.process(&mut bank, &request("TX2", 500)).unwrap();
        assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);
        assert_eq!(bank.balances().cashable(), 500);
    }

    #[test]
    fn test_full_only_unsatisfiable_rejects_whole() {
        let mut engine = engine(TransferConfig::default());
        // Meters one credit short of overflow: the bank cannot take the
        // full amount, and full-only never takes less.
        let mut bank =
            InMemoryBank::with_balances(FundAmounts::cashable_only(u64::MAX - 100), 0);

        let outcome = engine.process(&mut bank, &request("TX1", 500)).unwrap();
        assert_eq!(
            outcome.status,
            TransferStatus::GamingMachineUnableToPerformPartial
        );
        assert_eq!(outcome.amounts, FundAmounts::ZERO);
        assert_eq!(bank.balances().cashable(), u64::MAX - 100);
    }

    #[test]
    fn test_debit_without_pos_id() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();
        let key = [0xAB; crate::core_types::REGISTRATION_KEY_LEN];
        engine.register(1001, key, 0).unwrap();

        let mut req = request("TX1", 500);
        req.transfer_type = TransferType::DebitToMachine;
        req.registration_key = key;
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(outcome.status, TransferStatus::NoPosId);
        assert!(bank.balances().is_zero());
    }

    #[test]
    fn test_debit_requires_registration() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();

        let mut req = request("TX1", 500);
        req.transfer_type = TransferType::DebitToMachine;
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(outcome.status, TransferStatus::GamingMachineNotRegistered);
    }

    #[test]
    fn test_lock_only_flag_enforced() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();

        let mut req = request("TX1", 500);
        req.flags = TransferFlags::from_bits(TransferFlags::ACCEPT_ONLY_IF_LOCKED);
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(outcome.status, TransferStatus::GamingMachineNotLocked);

        // A fresh id after the lock is granted goes through.
        assert_eq!(engine.request_lock(3000).unwrap(), LockRequestResult::Locked);
        let mut retry = request("TX2", 500);
        retry.flags = req.flags;
        let outcome = engine.process(&mut bank, &retry).unwrap();
        assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);
    }

    #[test]
    fn test_rejected_id_replays_after_state_change() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();

        let mut req = request("TX1", 500);
        req.flags = TransferFlags::from_bits(TransferFlags::ACCEPT_ONLY_IF_LOCKED);
        let first = engine.process(&mut bank, &req).unwrap();
        assert_eq!(first.status, TransferStatus::GamingMachineNotLocked);

        // The lock is granted, but a retry of the same transaction id must
        // replay the stored rejection, not re-evaluate against new state.
        assert_eq!(engine.request_lock(3000).unwrap(), LockRequestResult::Locked);
        let second = engine.process(&mut bank, &req).unwrap();
        assert_eq!(second.status, TransferStatus::GamingMachineNotLocked);
        assert_eq!(second, first);
        assert!(bank.balances().is_zero());
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_cashout_to_host() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::with_balances(FundAmounts::cashable_only(1000), 0);

        let mut req = request("TX1", 400);
        req.transfer_type = TransferType::InHouseToHost;
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);
        assert_eq!(bank.balances().cashable(), 600);

        // Full-only over the remaining balance
        let mut req = request("TX2", 700);
        req.transfer_type = TransferType::InHouseToHost;
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(
            outcome.status,
            TransferStatus::NoWonCreditsAvailableForCashOut
        );

        // Partial cashout clamps to what is there
        let mut req = request("TX3", 700);
        req.transfer_code = TransferCode::PartialTransferAllowed;
        req.transfer_type = TransferType::InHouseToHost;
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(outcome.status, TransferStatus::PartialTransferSuccessful);
        assert_eq!(outcome.amounts, FundAmounts::cashable_only(600));
        assert!(bank.balances().is_zero());
    }

    #[test]
    fn test_restricted_pool_mismatch() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::with_balances(FundAmounts::new(0, 500, 0), 7);

        let mut req = request("TX1", 0);
        req.amounts = FundAmounts::new(0, 300, 0);
        req.pool_id = 9;
        req.expiration = 20270101;
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(
            outcome.status,
            TransferStatus::UnableToAcceptTransferDueToExistingRestrictedAmounts
        );

        // Matching pool under a fresh id is accepted.
        let mut req = request("TX2", 0);
        req.amounts = FundAmounts::new(0, 300, 0);
        req.pool_id = 7;
        req.expiration = 20270101;
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);
        assert_eq!(bank.balances().restricted(), 800);
    }

    #[test]
    fn test_status_report_carries_restricted_expiration() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();

        let mut req = request("TX1", 0);
        req.amounts = FundAmounts::new(0, 300, 0);
        req.pool_id = 7;
        req.expiration = 20270101;
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);

        let report = engine.game_lock_status(&bank).unwrap();
        assert_eq!(report.restricted_pool_id, 7);
        assert_eq!(report.restricted_expiration, 20270101);
        assert_eq!(report.balances.restricted(), 300);
    }

    #[test]
    fn test_ticket_transfer_pending_until_printed() {
        let mut config = TransferConfig::default();
        config.ticket_device_available = true;
        let mut engine = engine(config);
        let mut bank = InMemoryBank::new();

        let mut req = request("TX1", 500);
        req.transfer_type = TransferType::InHouseToTicket;
        req.expiration = 20270101;
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(outcome.status, TransferStatus::TransferPending);
        assert!(engine.transfer_in_flight());
        // Ticket funds never touch the bank
        assert!(bank.balances().is_zero());

        let resolved = engine.complete_ticket_transfer("TX1").unwrap().unwrap();
        assert_eq!(resolved.status, TransferStatus::FullTransferSuccessful);
        assert!(!engine.transfer_in_flight());
        assert_eq!(
            engine.meters().get(TransferType::InHouseToTicket).cashable(),
            500
        );
    }

    #[test]
    fn test_cancel_pending_transfer() {
        let mut config = TransferConfig::default();
        config.ticket_device_available = true;
        let mut engine = engine(config);
        let mut bank = InMemoryBank::new();

        let mut req = request("TX1", 500);
        req.transfer_type = TransferType::InHouseToTicket;
        req.expiration = 20270101;
        engine.process(&mut bank, &req).unwrap();

        let mut cancel = req.clone();
        cancel.transfer_code = TransferCode::CancelTransferRequest;
        let outcome = engine.process(&mut bank, &cancel).unwrap();
        assert_eq!(outcome.status, TransferStatus::TransferCanceledByHost);
        assert_eq!(outcome.amounts, FundAmounts::ZERO);
        assert_eq!(
            engine.meters().get(TransferType::InHouseToTicket).cashable(),
            0
        );
    }

    #[test]
    fn test_cancel_after_terminal_replays_outcome() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();
        engine.process(&mut bank, &request("TX1", 500)).unwrap();

        let mut cancel = request("TX1", 500);
        cancel.transfer_code = TransferCode::CancelTransferRequest;
        let outcome = engine.process(&mut bank, &cancel).unwrap();
        // Funds already applied; cancel has no effect
        assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);
        assert_eq!(bank.balances().cashable(), 500);
    }

    #[test]
    fn test_interrogation_never_mutates() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();
        engine.process(&mut bank, &request("TX1", 500)).unwrap();

        let mut probe = request("", 0);
        probe.transfer_code = TransferCode::InterrogationRequestStatusOnly;
        probe.amounts = FundAmounts::ZERO;
        let outcome = engine.process(&mut bank, &probe).unwrap();
        assert_eq!(outcome.transaction_id, "TX1");
        assert_eq!(outcome.status, TransferStatus::FullTransferSuccessful);
        assert_eq!(engine.history().len(), 1);

        let mut probe = request("TX-UNKNOWN", 0);
        probe.transfer_code = TransferCode::InterrogationRequestStatusOnly;
        let outcome = engine.process(&mut bank, &probe).unwrap();
        assert_eq!(
            outcome.status,
            TransferStatus::NoTransferInformationAvailable
        );
    }

    #[test]
    fn test_concurrent_pending_blocks_new_transfer() {
        let mut config = TransferConfig::default();
        config.ticket_device_available = true;
        let mut engine = engine(config);
        let mut bank = InMemoryBank::new();

        let mut req = request("TX1", 500);
        req.transfer_type = TransferType::InHouseToTicket;
        req.expiration = 20270101;
        engine.process(&mut bank, &req).unwrap();

        let outcome = engine.process(&mut bank, &request("TX2", 100)).unwrap();
        assert_eq!(
            outcome.status,
            TransferStatus::NotCompatibleWithCurrentTransfer
        );
    }

    #[test]
    fn test_receipt_lifecycle() {
        let mut engine = engine(TransferConfig::default());
        let mut bank = InMemoryBank::new();

        let mut req = request("TX1", 500);
        req.flags = TransferFlags::from_bits(TransferFlags::TRANSACTION_RECEIPT_REQUESTED);
        let outcome = engine.process(&mut bank, &req).unwrap();
        assert_eq!(outcome.receipt_status, ReceiptStatus::ReceiptPending);

        engine.receipt_printing("TX1").unwrap();
        engine.receipt_printed("TX1").unwrap();
        assert_eq!(
            engine
                .history()
                .find_by_transaction_id("TX1")
                .unwrap()
                .receipt_status,
            ReceiptStatus::ReceiptPrinted
        );
    }

    #[test]
    fn test_state_survives_restart() {
        let mut bank = InMemoryBank::new();
        let mut engine = TransferNegotiator::new(
            TransferConfig::default(),
            false,
            Box::new(MemoryStore::new()),
        )
        .unwrap();
        engine
            .register(1001, [0xAB; crate::core_types::REGISTRATION_KEY_LEN], 42)
            .unwrap();
        engine.process(&mut bank, &request("TX1", 500)).unwrap();

        let snapshot = engine.into_store();
        let recovered =
            TransferNegotiator::new(TransferConfig::default(), false, snapshot).unwrap();
        assert!(recovered.registration().is_registered());
        assert_eq!(recovered.registration().asset_number, 1001);
        assert_eq!(
            recovered
                .history()
                .find_by_transaction_id("TX1")
                .unwrap()
                .status,
            TransferStatus::FullTransferSuccessful
        );
        assert_eq!(
            recovered.meters().get(TransferType::InHouseToMachine).cashable(),
            500
        );
    }
}
