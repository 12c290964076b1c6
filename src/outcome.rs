//! Transfer outcome
//!
//! The response-and-history record for one transfer. Written to the history
//! ring exactly once; the only in-place change afterwards is the
//! `Pending -> terminal` transition plus receipt-status advancement.

use crate::amounts::{FundAmounts, MeterSet};
use crate::codes::{ReceiptStatus, TransferCode, TransferStatus, TransferType};
use crate::core_types::{AssetNumber, PoolId, RegistrationKey, TransactionIndex};
use crate::flags::TransferFlags;
use crate::request::TransferRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One transfer outcome: the AFT transfer response, and the records the
/// history ring stores for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer_code: TransferCode,
    pub transfer_type: TransferType,
    pub status: TransferStatus,
    pub receipt_status: ReceiptStatus,
    /// Amounts actually moved; component-wise <= the request amounts
    pub amounts: FundAmounts,
    pub flags: TransferFlags,
    pub asset_number: AssetNumber,
    pub registration_key: RegistrationKey,
    pub transaction_id: String,
    /// Wall clock at the time the outcome was produced
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Cumulative meters for this transfer type, after apply
    pub cumulative: MeterSet,
    pub expiration: u32,
    pub pool_id: PoolId,
    /// Position in the bounded history ring at append time
    pub transaction_index: TransactionIndex,
    /// Stored so a host retry can be compared against what was asked
    pub requested_amounts: FundAmounts,
    /// Patron debit card / account number, debit transfer types only
    pub debit_account: String,
    /// Echo of the host-supplied custom ticket data, if any
    pub custom_ticket_data: Option<crate::request::CustomTicketData>,
}

impl TransferOutcome {
    /// Build an outcome that echoes `request` with the given status and
    /// zero transferred amounts. Apply/meters are filled in by the
    /// negotiator for successful paths.
    pub fn rejection(request: &TransferRequest, status: TransferStatus) -> Self {
        Self {
            transfer_code: request.transfer_code,
            transfer_type: request.transfer_type,
            status,
            receipt_status: ReceiptStatus::NoReceiptRequested,
            amounts: FundAmounts::ZERO,
            flags: request.flags,
            asset_number: request.asset_number,
            registration_key: request.registration_key,
            transaction_id: request.transaction_id.clone(),
            timestamp: chrono::Utc::now(),
            cumulative: MeterSet::default(),
            expiration: request.expiration,
            pool_id: request.pool_id,
            transaction_index: 0,
            requested_amounts: request.amounts,
            debit_account: request.debit_account.clone(),
            custom_ticket_data: request.custom_ticket_data.clone(),
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// The duplicate comparison from the dedup step.
    ///
    /// Deliberately excludes status, receipt status, timestamp, cumulative
    /// meters and transferred amounts: a host retry after a partial apply
    /// still matches the stored request and receives the stored outcome.
    pub fn is_duplicate_of(&self, request: &TransferRequest) -> bool {
        self.transfer_code == request.transfer_code
            && self.transfer_type == request.transfer_type
            && self.requested_amounts == request.amounts
            && self.flags == request.flags
            && self.asset_number == request.asset_number
            && self.registration_key == request.registration_key
            && self.expiration == request.expiration
            && self.pool_id == request.pool_id
            && self.debit_account == request.debit_account
            && self.custom_ticket_data == request.custom_ticket_data
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Outcome[{}] {} {} {}",
            self.transaction_id, self.transfer_type, self.status, self.amounts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amounts::FundAmounts;

    fn request() -> TransferRequest {
        TransferRequest::new(
            TransferCode::FullTransferOnly,
            TransferType::InHouseToMachine,
            FundAmounts::cashable_only(500),
            "TX1",
        )
        .with_asset_number(1001)
    }

    #[test]
    fn test_rejection_echoes_request() {
        let req = request();
        let outcome = TransferOutcome::rejection(&req, TransferStatus::GamingMachineNotLocked);
        assert_eq!(outcome.status, TransferStatus::GamingMachineNotLocked);
        assert_eq!(outcome.amounts, FundAmounts::ZERO);
        assert_eq!(outcome.transaction_id, "TX1");
        assert_eq!(outcome.asset_number, 1001);
    }

    #[test]
    fn test_duplicate_matches_equal_request() {
        let req = request();
        let outcome = TransferOutcome::rejection(&req, TransferStatus::GamingMachineNotLocked);
        assert!(outcome.is_duplicate_of(&req));
    }

    #[test]
    fn test_duplicate_rejects_divergent_payload() {
        let req = request();
        let outcome = TransferOutcome::rejection(&req, TransferStatus::GamingMachineNotLocked);

        let mut other = request();
        other.amounts = FundAmounts::cashable_only(600);
        assert!(!outcome.is_duplicate_of(&other));

        let mut other = request();
        other.asset_number = 2002;
        assert!(!outcome.is_duplicate_of(&other));
    }

    #[test]
    fn test_duplicate_ignores_status_and_meters() {
        let req = request();
        let mut outcome = TransferOutcome::rejection(&req, TransferStatus::GamingMachineNotLocked);
        // A replayed partial apply has different status/amounts/meters but
        // must still count as the same transaction.
        outcome.status = TransferStatus::PartialTransferSuccessful;
        outcome.amounts = FundAmounts::cashable_only(300);
        outcome.cumulative.bump(&outcome.amounts).unwrap();
        assert!(outcome.is_duplicate_of(&req));
    }
}
