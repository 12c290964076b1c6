//! Transfer flags
//!
//! The flag byte from the AFT transfer poll. Hand-rolled bitset with named
//! accessors so the negotiator reads `flags.receipt_requested()` rather than
//! masking constants inline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One byte of transfer flags from the AFT transfer poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferFlags(u8);

impl TransferFlags {
    /// Host cashout enable control
    pub const HOST_CASHOUT_ENABLE: u8 = 0b0000_0001;
    /// Host cashout enable mode (hard/soft)
    pub const HOST_CASHOUT_MODE: u8 = 0b0000_0010;
    /// Cashout from gaming machine request
    pub const CASHOUT_FROM_MACHINE: u8 = 0b0000_0100;
    /// Use custom (host-supplied) ticket data
    pub const USE_CUSTOM_TICKET_DATA: u8 = 0b0000_1000;
    /// Accept the transfer only if the machine lock is held
    pub const ACCEPT_ONLY_IF_LOCKED: u8 = 0b0001_0000;
    /// Print a transaction receipt for this transfer
    pub const TRANSACTION_RECEIPT_REQUESTED: u8 = 0b0010_0000;

    const KNOWN: u8 = Self::HOST_CASHOUT_ENABLE
        | Self::HOST_CASHOUT_MODE
        | Self::CASHOUT_FROM_MACHINE
        | Self::USE_CUSTOM_TICKET_DATA
        | Self::ACCEPT_ONLY_IF_LOCKED
        | Self::TRANSACTION_RECEIPT_REQUESTED;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from the raw flag byte. Unknown bits are preserved so a
    /// response echoes exactly what the host sent.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[inline(always)]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Bits this implementation does not recognize.
    pub const fn unknown_bits(&self) -> u8 {
        self.0 & !Self::KNOWN
    }

    pub const fn with(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }

    #[inline]
    pub const fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    #[inline]
    pub const fn host_cashout_enable(&self) -> bool {
        self.contains(Self::HOST_CASHOUT_ENABLE)
    }

    #[inline]
    pub const fn use_custom_ticket_data(&self) -> bool {
        self.contains(Self::USE_CUSTOM_TICKET_DATA)
    }

    #[inline]
    pub const fn accept_only_if_locked(&self) -> bool {
        self.contains(Self::ACCEPT_ONLY_IF_LOCKED)
    }

    #[inline]
    pub const fn receipt_requested(&self) -> bool {
        self.contains(Self::TRANSACTION_RECEIPT_REQUESTED)
    }
}

impl fmt::Display for TransferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010b}", self.0)
    }
}
