//! AFT lock manager
//!
//! The exclusive transfer lock negotiated ahead of lock-gated transfers.
//! Single-writer rule: only the poll-processing context calls mutating
//! methods; the timeout deadline is evaluated lazily at the top of each
//! mutating entry point rather than by a background timer.

use crate::core_types::LockTimeout;
use crate::error::AftError;
use crate::storage::{blocks, read_record, write_record, StateStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Lock status, values from the SAS game-lock-and-status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LockStatus {
    Locked = 0x00,
    LockPending = 0x40,
    NotLocked = 0xFF,
}

impl LockStatus {
    #[inline]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::LockPending => "LOCK_PENDING",
            Self::NotLocked => "NOT_LOCKED",
        }
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Available-transfer condition bits for the game-lock-and-status
/// response. Recomputed on every lock or context change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConditions(u8);

impl TransferConditions {
    pub const TRANSFER_TO_MACHINE_OK: u8 = 0b0000_0001;
    pub const TRANSFER_FROM_MACHINE_OK: u8 = 0b0000_0010;
    pub const TRANSFER_TO_PRINTER_OK: u8 = 0b0000_0100;
    pub const WIN_AMOUNT_PENDING_CASHOUT: u8 = 0b0000_1000;
    pub const BONUS_AWARD_TO_MACHINE_OK: u8 = 0b0001_0000;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[inline(always)]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// Machine context the condition bitset is derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockContext {
    pub registered: bool,
    pub ticket_device_available: bool,
    pub win_pending_cashout: bool,
    pub bonus_award_allowed: bool,
}

/// Result of a lock-request poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRequestResult {
    /// Lock granted immediately
    Locked,
    /// Lock request accepted, awaiting acknowledgement
    Pending,
    /// A lock is already held or pending; request refused
    Busy,
}

/// Persisted lock state. The deadline is not persisted; a recovered
/// lock re-arms its timeout from the recovery instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    status: LockStatus,
    timeout: LockTimeout,
}

/// Owns the exclusive transfer-lock lifecycle.
pub struct LockManager {
    status: LockStatus,
    timeout: LockTimeout,
    deadline: Option<Instant>,
    /// Whether lock requests pass through `LockPending` before `Locked`
    pending_phase: bool,
    conditions: TransferConditions,
}

impl LockManager {
    pub fn new(pending_phase: bool) -> Self {
        Self {
            status: LockStatus::NotLocked,
            timeout: 0,
            deadline: None,
            pending_phase,
            conditions: TransferConditions::default(),
        }
    }

    /// Reload persisted lock state after a restart, re-arming the deadline.
    pub fn recover(store: &dyn StateStore, pending_phase: bool) -> Result<Self, AftError> {
        let mut manager = Self::new(pending_phase);
        let record: Option<LockRecord> = read_record(store, blocks::LOCK, 0)?;
        if let Some(record) = record {
            manager.status = record.status;
            manager.timeout = record.timeout;
            if record.status != LockStatus::NotLocked {
                manager.deadline = Some(Instant::now() + hundredths(record.timeout));
            }
        }
        Ok(manager)
    }

    #[inline]
    pub fn status(&self) -> LockStatus {
        self.status
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.status == LockStatus::Locked
    }

    pub fn conditions(&self) -> TransferConditions {
        self.conditions
    }

    /// Recompute the available-transfer bitset from machine context.
    pub fn recompute_conditions(&mut self, ctx: &LockContext) {
        let mut bits = 0u8;
        if ctx.registered {
            bits |= TransferConditions::TRANSFER_TO_MACHINE_OK;
            bits |= TransferConditions::TRANSFER_FROM_MACHINE_OK;
        }
        if ctx.ticket_device_available {
            bits |= TransferConditions::TRANSFER_TO_PRINTER_OK;
        }
        if ctx.win_pending_cashout {
            bits |= TransferConditions::WIN_AMOUNT_PENDING_CASHOUT;
        }
        if ctx.bonus_award_allowed {
            bits |= TransferConditions::BONUS_AWARD_TO_MACHINE_OK;
        }
        self.conditions = TransferConditions::from_bits(bits);
    }

    /// Evaluate the deadline. Returns true when the timeout fired on this
    /// call (the caller surfaces it; a fired timeout is never silent).
    pub fn poll_expiry(&mut self, store: &mut dyn StateStore) -> Result<bool, AftError> {
        let Some(deadline) = self.deadline else {
            return Ok(false);
        };
        if self.status == LockStatus::NotLocked || Instant::now() < deadline {
            return Ok(false);
        }
        info!(timeout = self.timeout, "lock timed out");
        self.status = LockStatus::NotLocked;
        self.deadline = None;
        self.persist(store)?;
        Ok(true)
    }

    /// Lock-request poll. One owner at a time; a second request while
    /// held or pending is refused as busy.
    pub fn request_lock(
        &mut self,
        store: &mut dyn StateStore,
        timeout: LockTimeout,
    ) -> Result<LockRequestResult, AftError> {
        self.poll_expiry(store)?;
        if self.status != LockStatus::NotLocked {
            debug!(status = %self.status, "lock request while lock held or pending");
            return Ok(LockRequestResult::Busy);
        }

        self.timeout = timeout;
        self.deadline = Some(Instant::now() + hundredths(timeout));
        if self.pending_phase {
            self.status = LockStatus::LockPending;
            self.persist(store)?;
            info!(timeout, "lock pending");
            Ok(LockRequestResult::Pending)
        } else {
            self.status = LockStatus::Locked;
            self.persist(store)?;
            info!(timeout, "lock granted");
            Ok(LockRequestResult::Locked)
        }
    }

    /// Machine-side acknowledgement completing a pending lock.
    pub fn acknowledge(&mut self, store: &mut dyn StateStore) -> Result<LockStatus, AftError> {
        if self.poll_expiry(store)? {
            return Ok(self.status);
        }
        if self.status == LockStatus::LockPending {
            self.status = LockStatus::Locked;
            self.persist(store)?;
            info!("lock acknowledged");
        }
        Ok(self.status)
    }

    /// Cancel poll: releases a held or pending lock. Idempotent; canceling
    /// an unlocked machine is a no-op.
    pub fn cancel(&mut self, store: &mut dyn StateStore) -> Result<LockStatus, AftError> {
        if self.status != LockStatus::NotLocked {
            self.status = LockStatus::NotLocked;
            self.deadline = None;
            self.persist(store)?;
            info!("lock canceled");
        }
        Ok(self.status)
    }

    /// Interrogate poll: status echoed, no transition.
    pub fn interrogate(&self) -> LockStatus {
        self.status
    }

    fn persist(&self, store: &mut dyn StateStore) -> Result<(), AftError> {
        write_record(
            store,
            blocks::LOCK,
            0,
            &LockRecord {
                status: self.status,
                timeout: self.timeout,
            },
        )?;
        store.commit()
    }
}

fn hundredths(timeout: LockTimeout) -> Duration {
    Duration::from_millis(timeout as u64 * 10)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_immediate_lock_without_pending_phase() {
        let mut store = MemoryStore::new();
        let mut lock = LockManager::new(false);

        let result = lock.request_lock(&mut store, 3000).unwrap();
        assert_eq!(result, LockRequestResult::Locked);
        assert!(lock.is_locked());
    }

    #[test]
    fn test_pending_phase_then_ack() {
        let mut store = MemoryStore::new();
        let mut lock = LockManager::new(true);

        let result = lock.request_lock(&mut store, 3000).unwrap();
        assert_eq!(result, LockRequestResult::Pending);
        assert_eq!(lock.status(), LockStatus::LockPending);
        assert!(!lock.is_locked());

        assert_eq!(lock.acknowledge(&mut store).unwrap(), LockStatus::Locked);
        assert!(lock.is_locked());
    }

    #[test]
    fn test_second_request_rejected_while_held() {
        let mut store = MemoryStore::new();
        let mut lock = LockManager::new(false);
        lock.request_lock(&mut store, 3000).unwrap();

        let result = lock.request_lock(&mut store, 3000).unwrap();
        assert_eq!(result, LockRequestResult::Busy);
        assert!(lock.is_locked());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut store = MemoryStore::new();
        let mut lock = LockManager::new(false);

        assert_eq!(lock.cancel(&mut store).unwrap(), LockStatus::NotLocked);

        lock.request_lock(&mut store, 3000).unwrap();
        assert_eq!(lock.cancel(&mut store).unwrap(), LockStatus::NotLocked);
        assert_eq!(lock.cancel(&mut store).unwrap(), LockStatus::NotLocked);
    }

    #[test]
    fn test_timeout_fires_on_next_poll() {
        let mut store = MemoryStore::new();
        let mut lock = LockManager::new(false);
        // 1 hundredth = 10ms
        lock.request_lock(&mut store, 1).unwrap();
        std::thread::sleep(Duration::from_millis(25));

        assert!(lock.poll_expiry(&mut store).unwrap());
        assert_eq!(lock.status(), LockStatus::NotLocked);
        // Second poll reports nothing new
        assert!(!lock.poll_expiry(&mut store).unwrap());
    }

    #[test]
    fn test_interrogate_does_not_transition() {
        let mut store = MemoryStore::new();
        let mut lock = LockManager::new(true);
        lock.request_lock(&mut store, 3000).unwrap();

        assert_eq!(lock.interrogate(), LockStatus::LockPending);
        assert_eq!(lock.status(), LockStatus::LockPending);
    }

    #[test]
    fn test_conditions_recompute() {
        let mut lock = LockManager::new(false);
        lock.recompute_conditions(&LockContext {
            registered: true,
            ticket_device_available: true,
            win_pending_cashout: false,
            bonus_award_allowed: false,
        });
        let conditions = lock.conditions();
        assert!(conditions.contains(TransferConditions::TRANSFER_TO_MACHINE_OK));
        assert!(conditions.contains(TransferConditions::TRANSFER_FROM_MACHINE_OK));
        assert!(conditions.contains(TransferConditions::TRANSFER_TO_PRINTER_OK));
        assert!(!conditions.contains(TransferConditions::WIN_AMOUNT_PENDING_CASHOUT));

        lock.recompute_conditions(&LockContext::default());
        assert_eq!(lock.conditions().bits(), 0);
    }

    #[test]
    fn test_recover_rearms_lock() {
        let mut store = MemoryStore::new();
        let mut lock = LockManager::new(false);
        lock.request_lock(&mut store, 3000).unwrap();

        let recovered = LockManager::recover(&store, false).unwrap();
        assert!(recovered.is_locked());
    }
}
