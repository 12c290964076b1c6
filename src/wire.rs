//! Fixed binary response layouts
//!
//! Every amount on the wire is packed BCD, most significant digit first.
//! Response lengths are fixed by the protocol table, not computed: the
//! game-lock-and-status response is 0x23 bytes and the registration
//! response is 0x1D bytes, with field order and widths part of the wire
//! contract. Multi-byte binary fields (asset number, POS id, pool id)
//! are least significant byte first.

use crate::core_types::{RegistrationKey, REGISTRATION_KEY_LEN};
use crate::negotiator::GameLockStatusReport;
use crate::registration::RegistrationState;
use thiserror::Error;

pub const GAME_LOCK_STATUS_RESPONSE_LEN: usize = 0x23;
pub const REGISTRATION_RESPONSE_LEN: usize = 0x1D;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("Value {0} does not fit in {1} BCD bytes")]
    ValueTooLarge(u64, usize),
    #[error("Invalid BCD nibble in byte {0:#04x}")]
    InvalidBcd(u8),
}

// ============================================================
// BCD
// ============================================================

/// Pack `value` into `N` BCD bytes, most significant digit first.
pub fn bcd_encode<const N: usize>(value: u64) -> Result<[u8; N], WireError> {
    let mut out = [0u8; N];
    let mut rest = value;
    for byte in out.iter_mut().rev() {
        let low = (rest % 10) as u8;
        rest /= 10;
        let high = (rest % 10) as u8;
        rest /= 10;
        *byte = (high << 4) | low;
    }
    if rest != 0 {
        return Err(WireError::ValueTooLarge(value, N));
    }
    Ok(out)
}

/// Unpack BCD bytes, most significant digit first.
pub fn bcd_decode(bytes: &[u8]) -> Result<u64, WireError> {
    let mut value: u64 = 0;
    for &byte in bytes {
        let high = byte >> 4;
        let low = byte & 0x0F;
        if high > 9 || low > 9 {
            return Err(WireError::InvalidBcd(byte));
        }
        value = value * 100 + (high as u64) * 10 + low as u64;
    }
    Ok(value)
}

// ============================================================
// FIXED RESPONSES
// ============================================================

/// The 0x23-byte game-lock-and-status response.
///
/// Layout: asset number (4, LSB first), game lock status (1), available
/// transfers (1), host cashout status (1), AFT status (1), max buffer
/// index (1), current cashable (5 BCD), current restricted (5 BCD),
/// current nonrestricted (5 BCD), transfer limit (5 BCD), restricted
/// expiration (4 BCD), restricted pool id (2, LSB first).
pub fn encode_game_lock_status(
    report: &GameLockStatusReport,
) -> Result<[u8; GAME_LOCK_STATUS_RESPONSE_LEN], WireError> {
    let mut out = [0u8; GAME_LOCK_STATUS_RESPONSE_LEN];
    out[0..4].copy_from_slice(&report.asset_number.to_le_bytes());
    out[4] = report.lock_status.code();
    out[5] = report.available_transfers.bits();
    out[6] = 0; // host cashout status; cashout modes live outside this core
    out[7] = 0; // AFT status flags
    out[8] = report.history_capacity;
    out[9..14].copy_from_slice(&bcd_encode::<5>(report.balances.cashable())?);
    out[14..19].copy_from_slice(&bcd_encode::<5>(report.balances.restricted())?);
    out[19..24].copy_from_slice(&bcd_encode::<5>(report.balances.nonrestricted())?);
    out[24..29].copy_from_slice(&bcd_encode::<5>(report.transfer_limit)?);
    out[29..33].copy_from_slice(&bcd_encode::<4>(report.restricted_expiration as u64)?);
    out[33..35].copy_from_slice(&report.restricted_pool_id.to_le_bytes());
    Ok(out)
}

/// The 0x1D-byte registration response.
///
/// Layout: registration status (1), asset number (4, LSB first),
/// registration key (20), POS id (4, LSB first).
pub fn encode_registration_status(
    state: &RegistrationState,
) -> [u8; REGISTRATION_RESPONSE_LEN] {
    let mut out = [0u8; REGISTRATION_RESPONSE_LEN];
    out[0] = state.status.code();
    out[1..5].copy_from_slice(&state.asset_number.to_le_bytes());
    out[5..25].copy_from_slice(&state.registration_key);
    out[25..29].copy_from_slice(&state.pos_id.to_le_bytes());
    out
}

/// Parse a wire registration key field.
pub fn decode_registration_key(bytes: &[u8]) -> Option<RegistrationKey> {
    if bytes.len() != REGISTRATION_KEY_LEN {
        return None;
    }
    let mut key = [0u8; REGISTRATION_KEY_LEN];
    key.copy_from_slice(bytes);
    Some(key)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amounts::FundAmounts;
    use crate::lock::{LockStatus, TransferConditions};
    use crate::registration::RegistrationStatus;

    #[test]
    fn test_bcd_encode() {
        assert_eq!(bcd_encode::<5>(0).unwrap(), [0, 0, 0, 0, 0]);
        assert_eq!(bcd_encode::<5>(500).unwrap(), [0x00, 0x00, 0x00, 0x05, 0x00]);
        assert_eq!(
            bcd_encode::<5>(9_999_999_999).unwrap(),
            [0x99, 0x99, 0x99, 0x99, 0x99]
        );
        assert_eq!(
            bcd_encode::<5>(10_000_000_000),
            Err(WireError::ValueTooLarge(10_000_000_000, 5))
        );
    }

    #[test]
    fn test_bcd_decode() {
        assert_eq!(bcd_decode(&[0x00, 0x00, 0x00, 0x05, 0x00]).unwrap(), 500);
        assert_eq!(bcd_decode(&[0x12, 0x34]).unwrap(), 1234);
        assert_eq!(bcd_decode(&[0x1A]), Err(WireError::InvalidBcd(0x1A)));
    }

    #[test]
    fn test_bcd_round_trip() {
        for value in [0u64, 1, 99, 12345, 9_999_999_999] {
            let encoded = bcd_encode::<5>(value).unwrap();
            assert_eq!(bcd_decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn test_game_lock_status_layout() {
        let report = GameLockStatusReport {
            asset_number: 1001,
            lock_status: LockStatus::Locked,
            available_transfers: TransferConditions::from_bits(0x07),
            history_capacity: 127,
            balances: FundAmounts::new(500, 0, 0),
            transfer_limit: 100_000,
            restricted_expiration: 0,
            restricted_pool_id: 7,
        };
        let bytes = encode_game_lock_status(&report).unwrap();

        assert_eq!(bytes.len(), 0x23);
        assert_eq!(&bytes[0..4], &1001u32.to_le_bytes());
        assert_eq!(bytes[4], LockStatus::Locked.code());
        assert_eq!(bytes[5], 0x07);
        assert_eq!(bytes[8], 127);
        assert_eq!(bcd_decode(&bytes[9..14]).unwrap(), 500);
        assert_eq!(bcd_decode(&bytes[24..29]).unwrap(), 100_000);
        assert_eq!(&bytes[33..35], &7u16.to_le_bytes());
    }

    #[test]
    fn test_registration_response_layout() {
        let state = RegistrationState {
            status: RegistrationStatus::Registered,
            asset_number: 1001,
            registration_key: [0xAB; REGISTRATION_KEY_LEN],
            pos_id: 42,
        };
        let bytes = encode_registration_status(&state);

        assert_eq!(bytes.len(), 0x1D);
        assert_eq!(bytes[0], RegistrationStatus::Registered.code());
        assert_eq!(&bytes[1..5], &1001u32.to_le_bytes());
        assert_eq!(&bytes[5..25], &[0xAB; 20]);
        assert_eq!(&bytes[25..29], &42u32.to_le_bytes());
    }

    #[test]
    fn test_decode_registration_key() {
        assert!(decode_registration_key(&[0u8; 19]).is_none());
        assert_eq!(
            decode_registration_key(&[0x11; 20]),
            Some([0x11; REGISTRATION_KEY_LEN])
        );
    }
}
