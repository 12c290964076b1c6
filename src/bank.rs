//! Bank collaborator
//!
//! The credit-meter seam between the AFT core and the rest of the machine.
//! Game play and hand-pay touch the same meters, so the core never holds
//! its own lock over them: it relies on the bank's single atomic
//! debit/credit with a boolean success result.

use crate::amounts::FundAmounts;
use crate::core_types::{Cents, PoolId};

/// Atomic balance operations over the machine's credit meters.
///
/// Implementations must be atomic per call: a `false` return means
/// nothing changed.
pub trait Bank {
    /// Remove funds. Fails (no partial effect) if any category is short.
    fn try_debit(&mut self, amounts: &FundAmounts) -> bool;

    /// Add funds. Restricted credits carry their pool id and expiration
    /// (raw BCD MMDDYYYY or 0000NNNN days). Fails on overflow with no
    /// partial effect.
    fn credit(&mut self, amounts: &FundAmounts, pool_id: PoolId, expiration: u32) -> bool;

    /// Current balances per category.
    fn balances(&self) -> FundAmounts;

    /// Pool id of held restricted credits, if any are present.
    fn restricted_pool_id(&self) -> Option<PoolId>;

    /// Expiration of held restricted credits, zero when none are held.
    fn restricted_expiration(&self) -> u32;
}

/// Reference bank backed by plain meters. Used by tests and demos; real
/// machines adapt their credit subsystem behind the [`Bank`] trait.
#[derive(Debug, Default)]
pub struct InMemoryBank {
    cashable: Cents,
    restricted: Cents,
    nonrestricted: Cents,
    restricted_pool: Option<PoolId>,
    restricted_expiration: u32,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(amounts: FundAmounts, pool_id: PoolId) -> Self {
        let mut bank = Self::new();
        assert!(bank.credit(&amounts, pool_id, 0));
        bank
    }
}

impl Bank for InMemoryBank {
    fn try_debit(&mut self, amounts: &FundAmounts) -> bool {
        if self.cashable < amounts.cashable()
            || self.restricted < amounts.restricted()
            || self.nonrestricted < amounts.nonrestricted()
        {
            return false;
        }
        self.cashable -= amounts.cashable();
        self.restricted -= amounts.restricted();
        self.nonrestricted -= amounts.nonrestricted();
        if self.restricted == 0 {
            self.restricted_pool = None;
            self.restricted_expiration = 0;
        }
        true
    }

    fn credit(&mut self, amounts: &FundAmounts, pool_id: PoolId, expiration: u32) -> bool {
        let Some(cashable) = self.cashable.checked_add(amounts.cashable()) else {
            return false;
        };
        let Some(restricted) = self.restricted.checked_add(amounts.restricted()) else {
            return false;
        };
        let Some(nonrestricted) = self.nonrestricted.checked_add(amounts.nonrestricted()) else {
            return false;
        };
        self.cashable = cashable;
        self.restricted = restricted;
        self.nonrestricted = nonrestricted;
        if amounts.restricted() > 0 {
            self.restricted_pool = Some(pool_id);
            self.restricted_expiration = expiration;
        }
        true
    }

    fn balances(&self) -> FundAmounts {
        FundAmounts::new(self.cashable, self.restricted, self.nonrestricted)
    }

    fn restricted_pool_id(&self) -> Option<PoolId> {
        self.restricted_pool
    }

    fn restricted_expiration(&self) -> u32 {
        self.restricted_expiration
    }
}
