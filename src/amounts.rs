//! Fund amounts and cumulative meters
//!
//! The three AFT fund categories travel together through every request,
//! outcome and meter. `FundAmounts` is the enforced value type for them:
//! fields are private, every mutation is checked and returns Result, and
//! overflow is an error rather than a wrap.

use crate::codes::TransferType;
use crate::core_types::Cents;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three AFT fund categories carried by one transfer.
///
/// # Invariants (enforced by private fields):
/// - No component ever wraps (checked arithmetic only)
/// - `total()` is None only on corruption (component sum overflow)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundAmounts {
    cashable: Cents,
    restricted: Cents,
    nonrestricted: Cents,
}

impl FundAmounts {
    pub const ZERO: FundAmounts = FundAmounts {
        cashable: 0,
        restricted: 0,
        nonrestricted: 0,
    };

    pub fn new(cashable: Cents, restricted: Cents, nonrestricted: Cents) -> Self {
        Self {
            cashable,
            restricted,
            nonrestricted,
        }
    }

    pub fn cashable_only(amount: Cents) -> Self {
        Self::new(amount, 0, 0)
    }

    #[inline(always)]
    pub const fn cashable(&self) -> Cents {
        self.cashable
    }

    #[inline(always)]
    pub const fn restricted(&self) -> Cents {
        self.restricted
    }

    #[inline(always)]
    pub const fn nonrestricted(&self) -> Cents {
        self.nonrestricted
    }

    /// Sum of all three categories.
    /// Returns None on overflow (indicates data corruption).
    pub const fn total(&self) -> Option<Cents> {
        match self.cashable.checked_add(self.restricted) {
            Some(partial) => partial.checked_add(self.nonrestricted),
            None => None,
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.cashable == 0 && self.restricted == 0 && self.nonrestricted == 0
    }

    /// Component-wise `<=`, the "no over-transfer" comparison: an outcome
    /// never exceeds its request in any single category.
    pub fn fits_within(&self, other: &FundAmounts) -> bool {
        self.cashable <= other.cashable
            && self.restricted <= other.restricted
            && self.nonrestricted <= other.nonrestricted
    }

    /// Component-wise checked addition.
    pub fn checked_add(&self, other: &FundAmounts) -> Option<FundAmounts> {
        Some(FundAmounts {
            cashable: self.cashable.checked_add(other.cashable)?,
            restricted: self.restricted.checked_add(other.restricted)?,
            nonrestricted: self.nonrestricted.checked_add(other.nonrestricted)?,
        })
    }

    /// Clamp every component to `cap` of the same category.
    ///
    /// Used by partial negotiation: the maximal satisfiable amount is the
    /// request clamped to what the bank/limit allows.
    pub fn clamped_to(&self, cap: &FundAmounts) -> FundAmounts {
        FundAmounts {
            cashable: self.cashable.min(cap.cashable),
            restricted: self.restricted.min(cap.restricted),
            nonrestricted: self.nonrestricted.min(cap.nonrestricted),
        }
    }

    /// Round every component down to a multiple of `denomination`.
    ///
    /// Partial negotiation path: the clamped amount must still be
    /// machine-acceptable in whole credits.
    pub fn rounded_down_to(&self, denomination: Cents) -> FundAmounts {
        if denomination == 0 {
            return *self;
        }
        FundAmounts {
            cashable: self.cashable - self.cashable % denomination,
            restricted: self.restricted - self.restricted % denomination,
            nonrestricted: self.nonrestricted - self.nonrestricted % denomination,
        }
    }

    /// True when every non-zero component is a multiple of `denomination`.
    pub fn is_even_multiple_of(&self, denomination: Cents) -> bool {
        if denomination == 0 {
            return false;
        }
        self.cashable % denomination == 0
            && self.restricted % denomination == 0
            && self.nonrestricted % denomination == 0
    }
}

impl fmt::Display for FundAmounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cashable={} restricted={} nonrestricted={}",
            self.cashable, self.restricted, self.nonrestricted
        )
    }
}

// ============================================================
// CUMULATIVE METERS
// ============================================================

/// Per-category cumulative transfer meters for one transfer type.
///
/// # Invariants:
/// - Meters only ever increase (`bump` is the only mutation)
/// - Overflow is an error, never a wrap-to-zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterSet {
    cashable: Cents,
    restricted: Cents,
    nonrestricted: Cents,
}

impl MeterSet {
    #[inline(always)]
    pub const fn cashable(&self) -> Cents {
        self.cashable
    }

    #[inline(always)]
    pub const fn restricted(&self) -> Cents {
        self.restricted
    }

    #[inline(always)]
    pub const fn nonrestricted(&self) -> Cents {
        self.nonrestricted
    }

    /// Add one completed transfer's amounts. Monotonic by construction.
    pub fn bump(&mut self, amounts: &FundAmounts) -> Result<(), &'static str> {
        let cashable = self
            .cashable
            .checked_add(amounts.cashable())
            .ok_or("Cashable meter overflow")?;
        let restricted = self
            .restricted
            .checked_add(amounts.restricted())
            .ok_or("Restricted meter overflow")?;
        let nonrestricted = self
            .nonrestricted
            .checked_add(amounts.nonrestricted())
            .ok_or("Nonrestricted meter overflow")?;
        // All three checked before any is written
        self.cashable = cashable;
        self.restricted = restricted;
        self.nonrestricted = nonrestricted;
        Ok(())
    }

    pub fn as_amounts(&self) -> FundAmounts {
        FundAmounts::new(self.cashable, self.restricted, self.nonrestricted)
    }
}

/// Cumulative meters for every transfer type, keyed by type code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeMeters {
    in_house_to_machine: MeterSet,
    bonus_coin_out_to_machine: MeterSet,
    bonus_jackpot_to_machine: MeterSet,
    in_house_to_ticket: MeterSet,
    debit_to_machine: MeterSet,
    debit_to_ticket: MeterSet,
    in_house_to_host: MeterSet,
    win_to_host: MeterSet,
}

impl CumulativeMeters {
    pub fn get(&self, transfer_type: TransferType) -> &MeterSet {
        match transfer_type {
            TransferType::InHouseToMachine => &self.in_house_to_machine,
            TransferType::BonusCoinOutToMachine => &self.bonus_coin_out_to_machine,
            TransferType::BonusJackpotToMachine => &self.bonus_jackpot_to_machine,
            TransferType::InHouseToTicket => &self.in_house_to_ticket,
            TransferType::DebitToMachine => &self.debit_to_machine,
            TransferType::DebitToTicket => &self.debit_to_ticket,
            TransferType::InHouseToHost => &self.in_house_to_host,
            TransferType::WinToHost => &self.win_to_host,
        }
    }

    /// Bump the meter set for one completed transfer.
    pub fn bump(
        &mut self,
        transfer_type: TransferType,
        amounts: &FundAmounts,
    ) -> Result<(), &'static str> {
        let set = match transfer_type {
            TransferType::InHouseToMachine => &mut self.in_house_to_machine,
            TransferType::BonusCoinOutToMachine => &mut self.bonus_coin_out_to_machine,
            TransferType::BonusJackpotToMachine => &mut self.bonus_jackpot_to_machine,
            TransferType::InHouseToTicket => &mut self.in_house_to_ticket,
            TransferType::DebitToMachine => &mut self.debit_to_machine,
            TransferType::DebitToTicket => &mut self.debit_to_ticket,
            TransferType::InHouseToHost => &mut self.in_house_to_host,
            TransferType::WinToHost => &mut self.win_to_host,
        };
        set.bump(amounts)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total() {
        let amounts = FundAmounts::new(100, 50, 25);
        assert_eq!(amounts.total(), Some(175));
        assert!(FundAmounts::ZERO.is_zero());
    }

    #[test]
    fn test_total_overflow() {
        let amounts = FundAmounts::new(u64::MAX, 1, 0);
        assert_eq!(amounts.total(), None);
    }

    #[test]
    fn test_fits_within() {
        let request = FundAmounts::new(500, 100, 0);
        assert!(FundAmounts::new(500, 100, 0).fits_within(&request));
        assert!(FundAmounts::new(300, 0, 0).fits_within(&request));
        assert!(!FundAmounts::new(501, 0, 0).fits_within(&request));
        assert!(!FundAmounts::new(0, 0, 1).fits_within(&request));
    }

    #[test]
    fn test_clamped_to() {
        let request = FundAmounts::new(1000, 500, 200);
        let cap = FundAmounts::new(600, 1000, 0);
        let clamped = request.clamped_to(&cap);
        assert_eq!(clamped, FundAmounts::new(600, 500, 0));
        assert!(clamped.fits_within(&request));
    }

    #[test]
    fn test_even_multiple() {
        let amounts = FundAmounts::new(500, 250, 0);
        assert!(amounts.is_even_multiple_of(25));
        assert!(!amounts.is_even_multiple_of(300));
        assert!(!amounts.is_even_multiple_of(0));
    }

    #[test]
    fn test_meter_bump_monotonic() {
        let mut meters = MeterSet::default();
        meters.bump(&FundAmounts::new(100, 50, 0)).unwrap();
        meters.bump(&FundAmounts::new(25, 0, 10)).unwrap();
        assert_eq!(meters.cashable(), 125);
        assert_eq!(meters.restricted(), 50);
        assert_eq!(meters.nonrestricted(), 10);
    }

    #[test]
    fn test_meter_bump_overflow_is_atomic() {
        let mut meters = MeterSet::default();
        meters.bump(&FundAmounts::new(10, u64::MAX, 0)).unwrap();
        // Restricted would overflow; nothing must change.
        assert!(meters.bump(&FundAmounts::new(5, 1, 0)).is_err());
        assert_eq!(meters.cashable(), 10);
        assert_eq!(meters.restricted(), u64::MAX);
    }

    #[test]
    fn test_cumulative_meters_per_type() {
        let mut meters = CumulativeMeters::default();
        meters
            .bump(TransferType::InHouseToMachine, &FundAmounts::cashable_only(500))
            .unwrap();
        meters
            .bump(TransferType::InHouseToHost, &FundAmounts::cashable_only(200))
            .unwrap();

        assert_eq!(meters.get(TransferType::InHouseToMachine).cashable(), 500);
        assert_eq!(meters.get(TransferType::InHouseToHost).cashable(), 200);
        assert_eq!(meters.get(TransferType::WinToHost).cashable(), 0);
    }
}
