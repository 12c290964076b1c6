use crate::core_types::Cents;
use crate::error::AftError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AftConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub redemption: RedemptionConfig,
    #[serde(default)]
    pub receipt: ReceiptConfig,
}

impl Default for AftConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            transfer: TransferConfig::default(),
            registration: RegistrationConfig::default(),
            redemption: RedemptionConfig::default(),
            receipt: ReceiptConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "aft.log".to_string(),
            rotation: "daily".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    /// Per-transfer limit for host-to-machine amounts, minor units
    pub transfer_limit: Cents,
    /// Machine denomination; transfer amounts must be even multiples
    pub denomination: Cents,
    /// Max buffer index of the history ring
    pub history_capacity: usize,
    /// Whether lock requests pass through the pending phase
    pub lock_pending_phase: bool,
    /// Whether the ticket printer is present and in service
    pub ticket_device_available: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            transfer_limit: 1_000_00, // $1000.00
            denomination: 1,
            history_capacity: 127,
            lock_pending_phase: false,
            ticket_device_available: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistrationConfig {
    /// Hold new registrations in RegistrationPending until re-acked
    pub require_operator_ack: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            require_operator_ack: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RedemptionConfig {
    /// Bounded window for the host validation response, milliseconds
    pub host_response_timeout_ms: u64,
    /// Max buffer index of the redemption dedup ring
    pub history_capacity: usize,
}

impl Default for RedemptionConfig {
    fn default() -> Self {
        Self {
            host_response_timeout_ms: 30_000,
            history_capacity: 32,
        }
    }
}

/// Property text printed on transaction receipts.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReceiptConfig {
    pub location: String,
    pub address_1: String,
    pub address_2: String,
    pub restricted_title: String,
    pub debit_title: String,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            address_1: String::new(),
            address_2: String::new(),
            restricted_title: "PROMO CREDITS".to_string(),
            debit_title: "DEBIT CARD WITHDRAWAL".to_string(),
        }
    }
}

impl AftConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AftError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| AftError::Config(format!("read {}: {e}", path.as_ref().display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| AftError::Config(format!("parse {}: {e}", path.as_ref().display())))
    }
}
