//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// Asset number - identifies one gaming machine to the host.
///
/// # Constraints:
/// - Assigned by the property, carried in registration and every AFT poll
/// - Zero means "not supplied" in a transfer request (then no match check)
pub type AssetNumber = u32;

/// Amount in minor currency units (cents). All protocol amounts are
/// non-negative integers; on the wire they travel as 5-byte BCD.
pub type Cents = u64;

/// Restricted-fund pool identifier (groups funds sharing an expiration).
pub type PoolId = u16;

/// Position of an outcome in the bounded history ring.
///
/// Index 0 addresses the most recent entry; higher values walk backwards.
pub type TransactionIndex = u8;

/// Lock timeout in hundredths of a second, as carried by the lock poll.
pub type LockTimeout = u16;

/// Length of the AFT registration key, fixed by the protocol.
pub const REGISTRATION_KEY_LEN: usize = 20;

/// 20-byte registration key exchanged during machine registration.
pub type RegistrationKey = [u8; REGISTRATION_KEY_LEN];

/// An all-zero registration key. Supplying it on a register poll clears
/// any held key instead of matching against it.
pub const ZERO_REGISTRATION_KEY: RegistrationKey = [0u8; REGISTRATION_KEY_LEN];
