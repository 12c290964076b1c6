//! Transfer request
//!
//! Immutable description of one AFT transfer poll. Built once per poll,
//! consumed by the negotiator, discarded after the outcome is produced.

use crate::amounts::FundAmounts;
use crate::codes::{TransferCode, TransferType};
use crate::core_types::{AssetNumber, LockTimeout, PoolId, RegistrationKey, ZERO_REGISTRATION_KEY};
use crate::flags::TransferFlags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host-supplied custom ticket data, present when the
/// `USE_CUSTOM_TICKET_DATA` flag is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTicketData {
    pub location: String,
    pub address_1: String,
    pub address_2: String,
    pub restricted_title: String,
    pub debit_title: String,
}

/// One AFT transfer poll from the host.
///
/// The transaction id is the host's idempotency key: resubmitting an equal
/// request must replay the stored outcome, a differing payload under the
/// same id is rejected (`TransactionIdNotUnique`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub transfer_code: TransferCode,
    pub transfer_type: TransferType,
    /// Requested amounts per fund category, minor currency units
    pub amounts: FundAmounts,
    pub flags: TransferFlags,
    /// Zero means "not supplied"; non-zero must match the registration
    pub asset_number: AssetNumber,
    pub registration_key: RegistrationKey,
    /// Host-supplied idempotency key, unique per outstanding transfer
    pub transaction_id: String,
    /// Restricted-fund expiration, raw BCD MMDDYYYY or 0000NNNN days
    pub expiration: u32,
    /// Restricted-fund pool
    pub pool_id: PoolId,
    /// Hundredths of a second, for lock-related acceptance
    pub lock_timeout: LockTimeout,
    /// Patron debit card / account number, debit transfer types only
    pub debit_account: String,
    /// Present when `flags.use_custom_ticket_data()` is set
    pub custom_ticket_data: Option<CustomTicketData>,
}

impl TransferRequest {
    pub fn new(
        transfer_code: TransferCode,
        transfer_type: TransferType,
        amounts: FundAmounts,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            transfer_code,
            transfer_type,
            amounts,
            flags: TransferFlags::empty(),
            asset_number: 0,
            registration_key: ZERO_REGISTRATION_KEY,
            transaction_id: transaction_id.into(),
            expiration: 0,
            pool_id: 0,
            lock_timeout: 0,
            debit_account: String::new(),
            custom_ticket_data: None,
        }
    }

    pub fn with_flags(mut self, flags: TransferFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_asset_number(mut self, asset_number: AssetNumber) -> Self {
        self.asset_number = asset_number;
        self
    }

    pub fn with_registration_key(mut self, key: RegistrationKey) -> Self {
        self.registration_key = key;
        self
    }

    pub fn with_expiration(mut self, expiration: u32, pool_id: PoolId) -> Self {
        self.expiration = expiration;
        self.pool_id = pool_id;
        self
    }

    pub fn with_debit_account(mut self, account: impl Into<String>) -> Self {
        self.debit_account = account.into();
        self
    }

    /// The structural validity check that precedes all eligibility checks:
    /// a request whose amount fields are inconsistent with its transfer
    /// type is not a valid transfer function at all.
    pub fn amounts_consistent_with_type(&self) -> bool {
        match self.transfer_type {
            // Bonus wins arrive as cashable (coin out) or cashable+restricted
            // (jackpot); a nonrestricted component is not a win record shape.
            TransferType::BonusCoinOutToMachine => {
                self.amounts.restricted() == 0 && self.amounts.nonrestricted() == 0
            }
            TransferType::BonusJackpotToMachine => self.amounts.nonrestricted() == 0,
            // Debit transfers move cashable funds off a patron card only.
            TransferType::DebitToMachine | TransferType::DebitToTicket => {
                self.amounts.restricted() == 0 && self.amounts.nonrestricted() == 0
            }
            _ => true,
        }
    }
}

impl fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer[{}] {} {} {}",
            self.transaction_id, self.transfer_code, self.transfer_type, self.amounts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let req = TransferRequest::new(
            TransferCode::FullTransferOnly,
            TransferType::InHouseToMachine,
            FundAmounts::cashable_only(500),
            "TX1",
        );
        assert_eq!(req.asset_number, 0);
        assert_eq!(req.registration_key, ZERO_REGISTRATION_KEY);
        assert_eq!(req.transaction_id, "TX1");
        assert!(req.custom_ticket_data.is_none());
    }

    #[test]
    fn test_amounts_consistent_with_type() {
        let coin_out = TransferRequest::new(
            TransferCode::FullTransferOnly,
            TransferType::BonusCoinOutToMachine,
            FundAmounts::cashable_only(100),
            "TX1",
        );
        assert!(coin_out.amounts_consistent_with_type());

        let bad_coin_out = TransferRequest::new(
            TransferCode::FullTransferOnly,
            TransferType::BonusCoinOutToMachine,
            FundAmounts::new(100, 50, 0),
            "TX2",
        );
        assert!(!bad_coin_out.amounts_consistent_with_type());

        // Jackpot allows cashable + restricted
        let jackpot = TransferRequest::new(
            TransferCode::FullTransferOnly,
            TransferType::BonusJackpotToMachine,
            FundAmounts::new(100, 50, 0),
            "TX3",
        );
        assert!(jackpot.amounts_consistent_with_type());

        let bad_debit = TransferRequest::new(
            TransferCode::FullTransferOnly,
            TransferType::DebitToMachine,
            FundAmounts::new(100, 0, 5),
            "TX4",
        );
        assert!(!bad_debit.amounts_consistent_with_type());
    }
}
