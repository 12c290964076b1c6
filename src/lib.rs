//! aft-core - Advanced Funds Transfer engine
//!
//! The AFT / ticket-redemption core of an EGM platform: registration,
//! exclusive transfer lock, transfer negotiation with duplicate/replay
//! protection, durable transfer history, receipt composition, and the
//! ticket redemption path. The serial poll dispatcher, printer driver
//! and bank live outside as collaborators.
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (AssetNumber, Cents, etc.)
//! - [`codes`] - Transfer codes, types and the fixed status tables
//! - [`amounts`] - Enforced fund amounts and cumulative meters
//! - [`flags`] - Transfer request flag bits
//! - [`request`] / [`outcome`] - Poll payloads in and out
//! - [`storage`] - Transactional key-addressed store (memory and file)
//! - [`history`] - Durable bounded transfer history ring
//! - [`registration`] - Host registration state machine
//! - [`lock`] - Exclusive transfer lock with timeout
//! - [`bank`] - Credit/meter collaborator seam
//! - [`negotiator`] - The transfer negotiation engine
//! - [`receipt`] - Transaction receipt composition and printer seam
//! - [`redemption`] - Ticket redemption state machine
//! - [`wire`] - BCD and fixed binary response layouts
//! - [`config`] / [`logging`] / [`error`] - Ambient plumbing

// Core types - must be first!
pub mod core_types;

pub mod amounts;
pub mod bank;
pub mod codes;
pub mod config;
pub mod error;
pub mod flags;
pub mod history;
pub mod lock;
pub mod logging;
pub mod negotiator;
pub mod outcome;
pub mod receipt;
pub mod redemption;
pub mod registration;
pub mod request;
pub mod storage;
pub mod wire;

// Convenient re-exports at crate root
pub use amounts::{CumulativeMeters, FundAmounts, MeterSet};
pub use bank::{Bank, InMemoryBank};
pub use codes::{ReceiptStatus, TransferCode, TransferDirection, TransferStatus, TransferType};
pub use config::AftConfig;
pub use core_types::{AssetNumber, Cents, PoolId, RegistrationKey, TransactionIndex};
pub use error::AftError;
pub use flags::TransferFlags;
pub use history::HistoryLog;
pub use lock::{LockManager, LockRequestResult, LockStatus, TransferConditions};
pub use negotiator::{GameLockStatusReport, TransferNegotiator};
pub use outcome::TransferOutcome;
pub use receipt::{Receipt, ReceiptComposer, ReceiptPrinter, ReceiptService};
pub use redemption::{TicketCategory, TicketRedeemer, TicketStatus};
pub use registration::{RegistrationManager, RegistrationPollResult, RegistrationState, RegistrationStatus};
pub use request::TransferRequest;
pub use storage::{FileStore, MemoryStore, StateStore};
