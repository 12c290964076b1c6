//! AFT registration manager
//!
//! Owns the machine's registration lifecycle and the 20-byte registration
//! key. State is persisted before any poll response is returned and
//! survives power loss; the negotiator consults it for every transfer that
//! requires a registered machine.

use crate::core_types::{AssetNumber, RegistrationKey, ZERO_REGISTRATION_KEY};
use crate::error::AftError;
use crate::storage::{blocks, read_record, write_record, StateStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Registration lifecycle, values from the SAS registration poll table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RegistrationStatus {
    /// Registered with the host
    Registered = 0x00,
    /// Controls cleared, ready for a fresh registration
    RegistrationReady = 0x01,
    /// Register accepted, awaiting operator acknowledgement
    RegistrationPending = 0x40,
    /// Not registered (initial, or after unregister)
    NotRegistered = 0x80,
}

impl RegistrationStatus {
    #[inline]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::RegistrationReady => "REGISTRATION_READY",
            Self::RegistrationPending => "REGISTRATION_PENDING",
            Self::NotRegistered => "NOT_REGISTERED",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a registration poll was refused. A reject is a protocol value (it
/// becomes part of the response), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationReject {
    /// Supplied non-zero key does not match the held key
    KeyMismatch,
    /// Unregister refused while a transfer is in flight
    NotCompatibleWithCurrentTransfer,
}

/// Result of one registration poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationPollResult {
    Accepted(RegistrationState),
    Rejected(RegistrationReject),
}

impl RegistrationPollResult {
    #[cfg(test)]
    fn accepted(&self) -> &RegistrationState {
        match self {
            Self::Accepted(state) => state,
            Self::Rejected(reject) => panic!("rejected: {reject:?}"),
        }
    }
}

/// Persisted registration state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationState {
    pub status: RegistrationStatus,
    pub asset_number: AssetNumber,
    pub registration_key: RegistrationKey,
    pub pos_id: u32,
}

impl Default for RegistrationState {
    fn default() -> Self {
        Self {
            status: RegistrationStatus::NotRegistered,
            asset_number: 0,
            registration_key: ZERO_REGISTRATION_KEY,
            pos_id: 0,
        }
    }
}

impl RegistrationState {
    #[inline]
    pub fn is_registered(&self) -> bool {
        self.status == RegistrationStatus::Registered
    }

    /// Key check for transfer eligibility: an all-zero request key is
    /// "not supplied" and always passes.
    pub fn key_matches(&self, supplied: &RegistrationKey) -> bool {
        *supplied == ZERO_REGISTRATION_KEY || *supplied == self.registration_key
    }
}

/// Owns and persists `RegistrationState`; mutated only by the
/// registration poll path.
pub struct RegistrationManager {
    state: RegistrationState,
    require_operator_ack: bool,
}

impl RegistrationManager {
    pub fn new(require_operator_ack: bool) -> Self {
        Self {
            state: RegistrationState::default(),
            require_operator_ack,
        }
    }

    /// Reload persisted state after a restart.
    pub fn recover(store: &dyn StateStore, require_operator_ack: bool) -> Result<Self, AftError> {
        let state = read_record(store, blocks::REGISTRATION, 0)?.unwrap_or_default();
        Ok(Self {
            state,
            require_operator_ack,
        })
    }

    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        self.state.is_registered()
    }

    /// Initialize-registration poll: clear held controls, ready for a
    /// fresh register.
    pub fn initialize(&mut self, store: &mut dyn StateStore) -> Result<RegistrationState, AftError> {
        self.state = RegistrationState {
            status: RegistrationStatus::RegistrationReady,
            ..RegistrationState::default()
        };
        self.persist(store)?;
        info!("registration initialized");
        Ok(self.state.clone())
    }

    /// Register poll.
    ///
    /// An all-zero key clears any held key back to `RegistrationReady`.
    /// A non-zero key against a differently-keyed registration is a
    /// `KeyMismatch`. Re-registering with the matching key is the operator
    /// acknowledgement that completes `RegistrationPending`.
    pub fn register(
        &mut self,
        store: &mut dyn StateStore,
        asset_number: AssetNumber,
        key: RegistrationKey,
        pos_id: u32,
    ) -> Result<RegistrationPollResult, AftError> {
        if key == ZERO_REGISTRATION_KEY {
            self.state = RegistrationState {
                status: RegistrationStatus::RegistrationReady,
                asset_number,
                registration_key: ZERO_REGISTRATION_KEY,
                pos_id,
            };
            self.persist(store)?;
            info!(asset_number, "registration cleared by zero key");
            return Ok(RegistrationPollResult::Accepted(self.state.clone()));
        }

        let held = self.state.registration_key;
        if held != ZERO_REGISTRATION_KEY && held != key {
            warn!(
                asset_number,
                held = %hex::encode(held),
                supplied = %hex::encode(key),
                "registration key mismatch"
            );
            return Ok(RegistrationPollResult::Rejected(
                RegistrationReject::KeyMismatch,
            ));
        }

        let acking_pending =
            self.state.status == RegistrationStatus::RegistrationPending && held == key;
        let status = if self.require_operator_ack && !acking_pending {
            RegistrationStatus::RegistrationPending
        } else {
            RegistrationStatus::Registered
        };

        self.state = RegistrationState {
            status,
            asset_number,
            registration_key: key,
            pos_id,
        };
        self.persist(store)?;
        info!(asset_number, pos_id, status = %status, "machine registered");
        Ok(RegistrationPollResult::Accepted(self.state.clone()))
    }

    /// Unregister poll. Refused while a transfer is in flight.
    pub fn unregister(
        &mut self,
        store: &mut dyn StateStore,
        transfer_in_flight: bool,
    ) -> Result<RegistrationPollResult, AftError> {
        if transfer_in_flight {
            return Ok(RegistrationPollResult::Rejected(
                RegistrationReject::NotCompatibleWithCurrentTransfer,
            ));
        }
        self.state = RegistrationState::default();
        self.persist(store)?;
        info!("machine unregistered");
        Ok(RegistrationPollResult::Accepted(self.state.clone()))
    }

    /// Read-current-registration poll: status echoed, no transition.
    pub fn read_current(&self) -> &RegistrationState {
        &self.state
    }

    fn persist(&self, store: &mut dyn StateStore) -> Result<(), AftError> {
        write_record(store, blocks::REGISTRATION, 0, &self.state)?;
        store.commit()
    }
}

// ============================================================
// TESTS
// ============================================================
