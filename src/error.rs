//! AFT core error types
//!
//! Protocol rejects are NOT errors: they travel back to the host as a
//! `TransferStatus` inside a normal response. This enum covers only the
//! fatal/data-integrity taxonomy, where the core must stop guessing and
//! surface the condition for operator or audit attention.

use thiserror::Error;

/// Fatal AFT core errors.
#[derive(Error, Debug)]
pub enum AftError {
    // === Persistent store ===
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("stored record failed checksum (block {block}, element {element})")]
    CorruptRecord { block: u32, element: u32 },

    #[error("serialization error: {0}")]
    Codec(#[from] bincode::Error),

    // === History integrity ===
    #[error("history ring full with all slots pending")]
    HistoryFull,

    #[error("duplicate transaction id with divergent payload: {0}")]
    DuplicatePayloadMismatch(String),

    // === Meters ===
    #[error("cumulative meter update failed: {0}")]
    MeterOverflow(&'static str),

    // === Configuration ===
    #[error("config error: {0}")]
    Config(String),
}

impl AftError {
    /// Stable error code for audit logs.
    pub fn code(&self) -> &'static str {
        match self {
            AftError::Storage(_) => "STORAGE",
            AftError::CorruptRecord { .. } => "CORRUPT_RECORD",
            AftError::Codec(_) => "CODEC",
            AftError::HistoryFull => "HISTORY_FULL",
            AftError::DuplicatePayloadMismatch(_) => "DUPLICATE_PAYLOAD_MISMATCH",
            AftError::MeterOverflow(_) => "METER_OVERFLOW",
            AftError::Config(_) => "CONFIG",
        }
    }
}
