//! Ticket redemption path
//!
//! Barcode-driven funds-in, the sibling of the AFT transfer flow. Two
//! phases: the machine validates the inserted ticket locally and reports
//! it to the host, then the host confirms (or rejects) in a follow-up
//! poll carrying the same barcode. The host gets a bounded window; a
//! silent host times the cycle out to `TicketRejectedDueToTimeout`.
//!
//! Dedup is barcode-keyed: a barcode that already redeemed replays its
//! stored outcome, never a second credit.

use crate::amounts::FundAmounts;
use crate::bank::Bank;
use crate::config::RedemptionConfig;
use crate::core_types::Cents;
use crate::error::AftError;
use crate::storage::{blocks, read_record, write_record, StateStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ============================================================
// STATUS VOCABULARY (fixed code table; do not renumber)
// ============================================================

/// Machine ticket-redemption status. Closed vocabulary, matched
/// exhaustively when composing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TicketStatus {
    CashableTicketRedeemed = 0x00,
    RestrictedTicketRedeemed = 0x01,
    NonrestrictedTicketRedeemed = 0x02,
    /// Ticket reported to the host, waiting for the authorization poll
    WaitingForHostValidation = 0x20,
    TicketRedemptionPending = 0x40,
    TicketRejectedByHost = 0x80,
    ValidationNumberDoesNotMatch = 0x81,
    NotAValidRedemptionFunction = 0x82,
    NotAValidRedemptionAmount = 0x83,
    TicketAmountExceedsLimit = 0x84,
    TicketAlreadyRedeemed = 0x85,
    TicketExpired = 0x86,
    RedemptionCanceledByMachine = 0x87,
    TicketRejectedDueToTimeout = 0x88,
    TicketRejectedDueToCommLinkDown = 0x89,
    TicketRedemptionDisabled = 0x8A,
    TicketRejectedDueToValidatorFailure = 0x8B,
    NotCompatibleWithCurrentRedemptionCycle = 0xC0,
    NoValidationInformationAvailable = 0xFF,
}

impl TicketStatus {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::CashableTicketRedeemed),
            0x01 => Some(Self::RestrictedTicketRedeemed),
            0x02 => Some(Self::NonrestrictedTicketRedeemed),
            0x20 => Some(Self::WaitingForHostValidation),
            0x40 => Some(Self::TicketRedemptionPending),
            0x80 => Some(Self::TicketRejectedByHost),
            0x81 => Some(Self::ValidationNumberDoesNotMatch),
            0x82 => Some(Self::NotAValidRedemptionFunction),
            0x83 => Some(Self::NotAValidRedemptionAmount),
            0x84 => Some(Self::TicketAmountExceedsLimit),
            0x85 => Some(Self::TicketAlreadyRedeemed),
            0x86 => Some(Self::TicketExpired),
            0x87 => Some(Self::RedemptionCanceledByMachine),
            0x88 => Some(Self::TicketRejectedDueToTimeout),
            0x89 => Some(Self::TicketRejectedDueToCommLinkDown),
            0x8A => Some(Self::TicketRedemptionDisabled),
            0x8B => Some(Self::TicketRejectedDueToValidatorFailure),
            0xC0 => Some(Self::NotCompatibleWithCurrentRedemptionCycle),
            0xFF => Some(Self::NoValidationInformationAvailable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CashableTicketRedeemed => "CASHABLE_TICKET_REDEEMED",
            Self::RestrictedTicketRedeemed => "RESTRICTED_TICKET_REDEEMED",
            Self::NonrestrictedTicketRedeemed => "NONRESTRICTED_TICKET_REDEEMED",
            Self::WaitingForHostValidation => "WAITING_FOR_HOST_VALIDATION",
            Self::TicketRedemptionPending => "TICKET_REDEMPTION_PENDING",
            Self::TicketRejectedByHost => "TICKET_REJECTED_BY_HOST",
            Self::ValidationNumberDoesNotMatch => "VALIDATION_NUMBER_DOES_NOT_MATCH",
            Self::NotAValidRedemptionFunction => "NOT_A_VALID_REDEMPTION_FUNCTION",
            Self::NotAValidRedemptionAmount => "NOT_A_VALID_REDEMPTION_AMOUNT",
            Self::TicketAmountExceedsLimit => "TICKET_AMOUNT_EXCEEDS_LIMIT",
            Self::TicketAlreadyRedeemed => "TICKET_ALREADY_REDEEMED",
            Self::TicketExpired => "TICKET_EXPIRED",
            Self::RedemptionCanceledByMachine => "REDEMPTION_CANCELED_BY_MACHINE",
            Self::TicketRejectedDueToTimeout => "TICKET_REJECTED_DUE_TO_TIMEOUT",
            Self::TicketRejectedDueToCommLinkDown => "TICKET_REJECTED_COMM_LINK_DOWN",
            Self::TicketRedemptionDisabled => "TICKET_REDEMPTION_DISABLED",
            Self::TicketRejectedDueToValidatorFailure => "TICKET_REJECTED_VALIDATOR_FAILURE",
            Self::NotCompatibleWithCurrentRedemptionCycle => {
                "NOT_COMPATIBLE_WITH_CURRENT_REDEMPTION_CYCLE"
            }
            Self::NoValidationInformationAvailable => "NO_VALIDATION_INFORMATION_AVAILABLE",
        }
    }

    /// In-flight; the cycle is still open.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::WaitingForHostValidation | Self::TicketRedemptionPending
        )
    }

    pub fn is_redeemed(&self) -> bool {
        matches!(
            self,
            Self::CashableTicketRedeemed
                | Self::RestrictedTicketRedeemed
                | Self::NonrestrictedTicketRedeemed
        )
    }

    pub fn is_reject(&self) -> bool {
        self.code() >= 0x80 && *self != Self::NoValidationInformationAvailable
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fund category the host authorizes a ticket into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketCategory {
    Cashable,
    Restricted,
    Nonrestricted,
}

impl TicketCategory {
    fn redeemed_status(&self) -> TicketStatus {
        match self {
            Self::Cashable => TicketStatus::CashableTicketRedeemed,
            Self::Restricted => TicketStatus::RestrictedTicketRedeemed,
            Self::Nonrestricted => TicketStatus::NonrestrictedTicketRedeemed,
        }
    }

    fn amounts(&self, cents: Cents) -> FundAmounts {
        match self {
            Self::Cashable => FundAmounts::new(cents, 0, 0),
            Self::Restricted => FundAmounts::new(0, cents, 0),
            Self::Nonrestricted => FundAmounts::new(0, 0, cents),
        }
    }
}

// ============================================================
// OUTCOME RECORD
// ============================================================

/// One redemption cycle's record, durable in the redemption ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionOutcome {
    pub barcode: String,
    pub status: TicketStatus,
    /// Amount credited; zero until the host authorizes
    pub amount: Cents,
    pub timestamp: DateTime<Utc>,
}

/// Persisted ring; small and rewritten wholesale on each mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RedemptionRing {
    outcomes: VecDeque<RedemptionOutcome>,
}

// ============================================================
// REDEEMER
// ============================================================

/// The ticket redemption state machine.
///
/// One cycle at a time: `Idle -> WaitingForHostValidation` on ticket
/// insert, then host authorize/reject, machine cancel, or timeout closes
/// the cycle. The deadline is evaluated lazily on the next call into the
/// redeemer, never from a background thread.
pub struct TicketRedeemer {
    config: RedemptionConfig,
    ring: RedemptionRing,
    /// Barcode of the open cycle, with its host-response deadline
    active: Option<(String, Instant)>,
}

impl TicketRedeemer {
    pub fn new(config: RedemptionConfig) -> Self {
        Self {
            config,
            ring: RedemptionRing::default(),
            active: None,
        }
    }

    /// Rebuild from the store. A cycle that was open at power loss comes
    /// back open with a fresh host-response window.
    pub fn recover(store: &dyn StateStore, config: RedemptionConfig) -> Result<Self, AftError> {
        let ring: RedemptionRing =
            read_record(store, blocks::REDEMPTION, 0)?.unwrap_or_default();
        let deadline = Instant::now() + Duration::from_millis(config.host_response_timeout_ms);
        let active = ring
            .outcomes
            .iter()
            .find(|o| o.status.is_pending())
            .map(|o| (o.barcode.clone(), deadline));
        if let Some((barcode, _)) = &active {
            warn!(barcode = %barcode, "redemption cycle recovered still open");
        }
        Ok(Self {
            config,
            ring,
            active,
        })
    }

    pub fn cycle_open(&self) -> bool {
        self.active.is_some()
    }

    /// Ticket inserted and locally validated by the validator device.
    ///
    /// Opens a cycle and reports the barcode to the host. Rejects are
    /// values; only storage failures escalate.
    pub fn insert_ticket(
        &mut self,
        store: &mut dyn StateStore,
        barcode: &str,
    ) -> Result<TicketStatus, AftError> {
        self.poll_timeout(store)?;

        if barcode.is_empty() || !barcode.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(TicketStatus::NotAValidRedemptionFunction);
        }
        if self.active.is_some() {
            return Ok(TicketStatus::NotCompatibleWithCurrentRedemptionCycle);
        }
        if let Some(stored) = self.find(barcode) {
            debug!(barcode = %barcode, status = %stored.status, "duplicate barcode");
            return Ok(if stored.status.is_redeemed() {
                TicketStatus::TicketAlreadyRedeemed
            } else {
                stored.status
            });
        }

        self.push(
            store,
            RedemptionOutcome {
                barcode: barcode.to_string(),
                status: TicketStatus::WaitingForHostValidation,
                amount: 0,
                timestamp: Utc::now(),
            },
        )?;
        let deadline =
            Instant::now() + Duration::from_millis(self.config.host_response_timeout_ms);
        self.active = Some((barcode.to_string(), deadline));
        info!(barcode = %barcode, "redemption cycle opened");
        Ok(TicketStatus::WaitingForHostValidation)
    }

    /// Host authorizes the open cycle. Credits the bank and closes the
    /// cycle; a barcode mismatch rejects without closing it.
    pub fn host_authorize(
        &mut self,
        store: &mut dyn StateStore,
        bank: &mut dyn Bank,
        barcode: &str,
        amount: Cents,
        category: TicketCategory,
    ) -> Result<TicketStatus, AftError> {
        if self.poll_timeout(store)? {
            return Ok(TicketStatus::TicketRejectedDueToTimeout);
        }
        let Some((active_barcode, _)) = &self.active else {
            return Ok(TicketStatus::NoValidationInformationAvailable);
        };
        if active_barcode != barcode {
            warn!(expected = %active_barcode, got = %barcode, "authorization barcode mismatch");
            return Ok(TicketStatus::ValidationNumberDoesNotMatch);
        }
        if amount == 0 {
            return self.close(store, TicketStatus::NotAValidRedemptionAmount, 0);
        }
        if !bank.credit(&category.amounts(amount), 0, 0) {
            return self.close(store, TicketStatus::TicketRejectedDueToValidatorFailure, 0);
        }
        let status = category.redeemed_status();
        info!(barcode = %barcode, amount, status = %status, "ticket redeemed");
        self.close(store, status, amount)
    }

    /// Host rejects the open cycle with a named reason.
    pub fn host_reject(
        &mut self,
        store: &mut dyn StateStore,
        barcode: &str,
        status: TicketStatus,
    ) -> Result<TicketStatus, AftError> {
        debug_assert!(status.is_reject());
        if self.poll_timeout(store)? {
            return Ok(TicketStatus::TicketRejectedDueToTimeout);
        }
        let Some((active_barcode, _)) = &self.active else {
            return Ok(TicketStatus::NoValidationInformationAvailable);
        };
        if active_barcode != barcode {
            return Ok(TicketStatus::ValidationNumberDoesNotMatch);
        }
        info!(barcode = %barcode, status = %status, "ticket rejected by host");
        self.close(store, status, 0)
    }

    /// Machine-side cancel of the open cycle (ticket returned to patron).
    pub fn cancel(&mut self, store: &mut dyn StateStore) -> Result<TicketStatus, AftError> {
        if self.active.is_none() {
            return Ok(TicketStatus::NoValidationInformationAvailable);
        }
        info!("redemption cycle canceled by machine");
        self.close(store, TicketStatus::RedemptionCanceledByMachine, 0)
    }

    /// Lazy deadline check; true when the open cycle just timed out.
    pub fn poll_timeout(&mut self, store: &mut dyn StateStore) -> Result<bool, AftError> {
        let Some((_, deadline)) = &self.active else {
            return Ok(false);
        };
        if Instant::now() < *deadline {
            return Ok(false);
        }
        warn!("host response window elapsed; rejecting ticket");
        self.close(store, TicketStatus::TicketRejectedDueToTimeout, 0)?;
        Ok(true)
    }

    /// Stored outcome for a barcode, if still in the ring.
    pub fn interrogate(&self, barcode: &str) -> TicketStatus {
        self.find(barcode)
            .map(|o| o.status)
            .unwrap_or(TicketStatus::NoValidationInformationAvailable)
    }

    pub fn last(&self) -> Option<&RedemptionOutcome> {
        self.ring.outcomes.back()
    }

    fn find(&self, barcode: &str) -> Option<&RedemptionOutcome> {
        self.ring.outcomes.iter().rev().find(|o| o.barcode == barcode)
    }

    fn close(
        &mut self,
        store: &mut dyn StateStore,
        status: TicketStatus,
        amount: Cents,
    ) -> Result<TicketStatus, AftError> {
        if let Some((barcode, _)) = self.active.take() {
            if let Some(entry) = self
                .ring
                .outcomes
                .iter_mut()
                .rev()
                .find(|o| o.barcode == barcode)
            {
                entry.status = status;
                entry.amount = amount;
            }
            self.persist(store)?;
        }
        Ok(status)
    }

    fn push(
        &mut self,
        store: &mut dyn StateStore,
        outcome: RedemptionOutcome,
    ) -> Result<(), AftError> {
        while self.ring.outcomes.len() >= self.config.history_capacity {
            self.ring.outcomes.pop_front();
        }
        self.ring.outcomes.push_back(outcome);
        self.persist(store)
    }

    fn persist(&self, store: &mut dyn StateStore) -> Result<(), AftError> {
        write_record(store, blocks::REDEMPTION, 0, &self.ring)?;
        store.commit()
    }
}

// ============================================================
// TESTS
// ============================================================
