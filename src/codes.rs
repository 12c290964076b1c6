//! SAS AFT code tables
//!
//! The closed vocabularies of the AFT long polls: transfer codes, transfer
//! types, transfer statuses and receipt statuses. Values come from the
//! published SAS protocol tables and must never be renumbered.
//!
//! Every enum carries `code()` / `from_code()` / `as_str()` so the wire
//! layer and the logs share one source of truth.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================
// TRANSFER CODE (what the host is asking for)
// ============================================================

/// Transfer code from the AFT transfer poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferCode {
    /// Transfer request, full transfer only (all-or-nothing)
    FullTransferOnly = 0x00,
    /// Transfer request, partial transfers allowed
    PartialTransferAllowed = 0x01,
    /// Cancel the pending transfer request
    CancelTransferRequest = 0x80,
    /// Interrogate, status of current transfer only (never starts one)
    InterrogationRequestStatusOnly = 0xFE,
    /// Interrogate, by transaction index into history
    InterrogationRequest = 0xFF,
}

impl TransferCode {
    #[inline]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(TransferCode::FullTransferOnly),
            0x01 => Some(TransferCode::PartialTransferAllowed),
            0x80 => Some(TransferCode::CancelTransferRequest),
            0xFE => Some(TransferCode::InterrogationRequestStatusOnly),
            0xFF => Some(TransferCode::InterrogationRequest),
            _ => None,
        }
    }

    /// True for the two codes that start a new transfer.
    #[inline]
    pub fn is_transfer_request(&self) -> bool {
        matches!(
            self,
            TransferCode::FullTransferOnly | TransferCode::PartialTransferAllowed
        )
    }

    /// True for the two interrogation codes (never mutate state).
    #[inline]
    pub fn is_interrogation(&self) -> bool {
        matches!(
            self,
            TransferCode::InterrogationRequestStatusOnly | TransferCode::InterrogationRequest
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferCode::FullTransferOnly => "FULL_TRANSFER_ONLY",
            TransferCode::PartialTransferAllowed => "PARTIAL_TRANSFER_ALLOWED",
            TransferCode::CancelTransferRequest => "CANCEL_TRANSFER_REQUEST",
            TransferCode::InterrogationRequestStatusOnly => "INTERROGATE_STATUS_ONLY",
            TransferCode::InterrogationRequest => "INTERROGATE",
        }
    }
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<u8> for TransferCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        TransferCode::from_code(value).ok_or(value)
    }
}

// ============================================================
// TRANSFER TYPE (direction x fund category)
// ============================================================

/// Direction of a transfer relative to the gaming machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Host credits the gaming machine
    ToMachine,
    /// Gaming machine pays out to the host
    ToHost,
    /// Host funds are issued as a printed ticket
    ToTicket,
}

/// Transfer type from the AFT transfer poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferType {
    /// In-house transfer from host to gaming machine
    InHouseToMachine = 0x00,
    /// Bonus coin-out win from host to gaming machine
    BonusCoinOutToMachine = 0x10,
    /// Bonus jackpot win from host to gaming machine
    BonusJackpotToMachine = 0x11,
    /// In-house transfer from host to printed ticket
    InHouseToTicket = 0x20,
    /// Debit (patron card) transfer from host to gaming machine
    DebitToMachine = 0x40,
    /// Debit (patron card) transfer from host to printed ticket
    DebitToTicket = 0x60,
    /// In-house transfer from gaming machine to host
    InHouseToHost = 0x80,
    /// Win amount transfer from gaming machine to host
    WinToHost = 0x90,
}

impl TransferType {
    #[inline]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(TransferType::InHouseToMachine),
            0x10 => Some(TransferType::BonusCoinOutToMachine),
            0x11 => Some(TransferType::BonusJackpotToMachine),
            0x20 => Some(TransferType::InHouseToTicket),
            0x40 => Some(TransferType::DebitToMachine),
            0x60 => Some(TransferType::DebitToTicket),
            0x80 => Some(TransferType::InHouseToHost),
            0x90 => Some(TransferType::WinToHost),
            _ => None,
        }
    }

    pub fn direction(&self) -> TransferDirection {
        match self {
            TransferType::InHouseToMachine
            | TransferType::BonusCoinOutToMachine
            | TransferType::BonusJackpotToMachine
            | TransferType::DebitToMachine => TransferDirection::ToMachine,
            TransferType::InHouseToTicket | TransferType::DebitToTicket => {
                TransferDirection::ToTicket
            }
            TransferType::InHouseToHost | TransferType::WinToHost => TransferDirection::ToHost,
        }
    }

    /// Debit types ride a patron card and require a point-of-sale id.
    #[inline]
    pub fn is_debit(&self) -> bool {
        matches!(self, TransferType::DebitToMachine | TransferType::DebitToTicket)
    }

    /// Bonus win types are only valid against a recorded win.
    #[inline]
    pub fn is_bonus(&self) -> bool {
        matches!(
            self,
            TransferType::BonusCoinOutToMachine | TransferType::BonusJackpotToMachine
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::InHouseToMachine => "IN_HOUSE_TO_MACHINE",
            TransferType::BonusCoinOutToMachine => "BONUS_COIN_OUT_TO_MACHINE",
            TransferType::BonusJackpotToMachine => "BONUS_JACKPOT_TO_MACHINE",
            TransferType::InHouseToTicket => "IN_HOUSE_TO_TICKET",
            TransferType::DebitToMachine => "DEBIT_TO_MACHINE",
            TransferType::DebitToTicket => "DEBIT_TO_TICKET",
            TransferType::InHouseToHost => "IN_HOUSE_TO_HOST",
            TransferType::WinToHost => "WIN_TO_HOST",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<u8> for TransferType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        TransferType::from_code(value).ok_or(value)
    }
}

// ============================================================
// TRANSFER STATUS (the closed outcome vocabulary)
// ============================================================

/// Transfer status reported in the AFT transfer response.
///
/// Success, pending and the full reject table. The reject precedence the
/// negotiator applies is fixed (see `negotiator`); this enum is pure data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferStatus {
    FullTransferSuccessful = 0x00,
    PartialTransferSuccessful = 0x01,
    TransferPending = 0x40,
    TransferCanceledByHost = 0x80,
    TransactionIdNotUnique = 0x81,
    NotAValidTransferFunction = 0x82,
    NotAValidTransferAmountOrExpiration = 0x83,
    TransferAmountExceedsGameLimit = 0x84,
    TransferAmountNotEvenMultiple = 0x85,
    GamingMachineUnableToPerformPartial = 0x86,
    GamingMachineUnableToPerformTransfers = 0x87,
    GamingMachineNotRegistered = 0x88,
    RegistrationKeyDoesNotMatch = 0x89,
    NoPosId = 0x8A,
    NoWonCreditsAvailableForCashOut = 0x8B,
    NoGamingMachineDenominationSet = 0x8C,
    ExpirationNotValidForTransferToTicket = 0x8D,
    TransferToTicketDeviceNotAvailable = 0x8E,
    UnableToAcceptTransferDueToExistingRestrictedAmounts = 0x8F,
    UnableToPrintTransactionReceipt = 0x90,
    InsufficientDataToPrintTransactionReceipt = 0x91,
    TransactionReceiptNotAllowedForTransferType = 0x92,
    AssetNumberZeroOrDoesNotMatch = 0x93,
    GamingMachineNotLocked = 0x94,
    TransactionIdNotValid = 0x95,
    UnexpectedError = 0x9F,
    NotCompatibleWithCurrentTransfer = 0xC0,
    UnsupportedTransferCode = 0xC1,
    NoTransferInformationAvailable = 0xFF,
}

impl TransferStatus {
    #[inline]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::FullTransferSuccessful),
            0x01 => Some(Self::PartialTransferSuccessful),
            0x40 => Some(Self::TransferPending),
            0x80 => Some(Self::TransferCanceledByHost),
            0x81 => Some(Self::TransactionIdNotUnique),
            0x82 => Some(Self::NotAValidTransferFunction),
            0x83 => Some(Self::NotAValidTransferAmountOrExpiration),
            0x84 => Some(Self::TransferAmountExceedsGameLimit),
            0x85 => Some(Self::TransferAmountNotEvenMultiple),
            0x86 => Some(Self::GamingMachineUnableToPerformPartial),
            0x87 => Some(Self::GamingMachineUnableToPerformTransfers),
            0x88 => Some(Self::GamingMachineNotRegistered),
            0x89 => Some(Self::RegistrationKeyDoesNotMatch),
            0x8A => Some(Self::NoPosId),
            0x8B => Some(Self::NoWonCreditsAvailableForCashOut),
            0x8C => Some(Self::NoGamingMachineDenominationSet),
            0x8D => Some(Self::ExpirationNotValidForTransferToTicket),
            0x8E => Some(Self::TransferToTicketDeviceNotAvailable),
            0x8F => Some(Self::UnableToAcceptTransferDueToExistingRestrictedAmounts),
            0x90 => Some(Self::UnableToPrintTransactionReceipt),
            0x91 => Some(Self::InsufficientDataToPrintTransactionReceipt),
            0x92 => Some(Self::TransactionReceiptNotAllowedForTransferType),
            0x93 => Some(Self::AssetNumberZeroOrDoesNotMatch),
            0x94 => Some(Self::GamingMachineNotLocked),
            0x95 => Some(Self::TransactionIdNotValid),
            0x9F => Some(Self::UnexpectedError),
            0xC0 => Some(Self::NotCompatibleWithCurrentTransfer),
            0xC1 => Some(Self::UnsupportedTransferCode),
            0xFF => Some(Self::NoTransferInformationAvailable),
            _ => None,
        }
    }

    /// Funds moved (fully or partially).
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::FullTransferSuccessful | Self::PartialTransferSuccessful
        )
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::TransferPending)
    }

    /// Terminal without funds movement (0x80..=0xC1 reject band).
    #[inline]
    pub fn is_reject(&self) -> bool {
        !self.is_success() && !self.is_pending() && *self != Self::NoTransferInformationAvailable
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullTransferSuccessful => "FULL_TRANSFER_SUCCESSFUL",
            Self::PartialTransferSuccessful => "PARTIAL_TRANSFER_SUCCESSFUL",
            Self::TransferPending => "TRANSFER_PENDING",
            Self::TransferCanceledByHost => "TRANSFER_CANCELED_BY_HOST",
            Self::TransactionIdNotUnique => "TRANSACTION_ID_NOT_UNIQUE",
            Self::NotAValidTransferFunction => "NOT_A_VALID_TRANSFER_FUNCTION",
            Self::NotAValidTransferAmountOrExpiration => "NOT_A_VALID_AMOUNT_OR_EXPIRATION",
            Self::TransferAmountExceedsGameLimit => "AMOUNT_EXCEEDS_GAME_LIMIT",
            Self::TransferAmountNotEvenMultiple => "AMOUNT_NOT_EVEN_MULTIPLE",
            Self::GamingMachineUnableToPerformPartial => "UNABLE_TO_PERFORM_PARTIAL",
            Self::GamingMachineUnableToPerformTransfers => "UNABLE_TO_PERFORM_TRANSFERS",
            Self::GamingMachineNotRegistered => "NOT_REGISTERED",
            Self::RegistrationKeyDoesNotMatch => "REGISTRATION_KEY_MISMATCH",
            Self::NoPosId => "NO_POS_ID",
            Self::NoWonCreditsAvailableForCashOut => "NO_WON_CREDITS",
            Self::NoGamingMachineDenominationSet => "NO_DENOMINATION_SET",
            Self::ExpirationNotValidForTransferToTicket => "EXPIRATION_NOT_VALID_FOR_TICKET",
            Self::TransferToTicketDeviceNotAvailable => "TICKET_DEVICE_NOT_AVAILABLE",
            Self::UnableToAcceptTransferDueToExistingRestrictedAmounts => {
                "EXISTING_RESTRICTED_AMOUNTS"
            }
            Self::UnableToPrintTransactionReceipt => "UNABLE_TO_PRINT_RECEIPT",
            Self::InsufficientDataToPrintTransactionReceipt => "INSUFFICIENT_RECEIPT_DATA",
            Self::TransactionReceiptNotAllowedForTransferType => "RECEIPT_NOT_ALLOWED",
            Self::AssetNumberZeroOrDoesNotMatch => "ASSET_NUMBER_MISMATCH",
            Self::GamingMachineNotLocked => "NOT_LOCKED",
            Self::TransactionIdNotValid => "TRANSACTION_ID_NOT_VALID",
            Self::UnexpectedError => "UNEXPECTED_ERROR",
            Self::NotCompatibleWithCurrentTransfer => "NOT_COMPATIBLE_WITH_CURRENT_TRANSFER",
            Self::UnsupportedTransferCode => "UNSUPPORTED_TRANSFER_CODE",
            Self::NoTransferInformationAvailable => "NO_TRANSFER_INFORMATION",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<u8> for TransferStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        TransferStatus::from_code(value).ok_or(value)
    }
}

// ============================================================
// RECEIPT STATUS
// ============================================================

/// Receipt status reported in the AFT transfer response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReceiptStatus {
    ReceiptPrinted = 0x00,
    ReceiptPrintingInProgress = 0x20,
    ReceiptPending = 0x40,
    NoReceiptRequested = 0xFF,
}

impl ReceiptStatus {
    #[inline]
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::ReceiptPrinted),
            0x20 => Some(Self::ReceiptPrintingInProgress),
            0x40 => Some(Self::ReceiptPending),
            0xFF => Some(Self::NoReceiptRequested),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceiptPrinted => "RECEIPT_PRINTED",
            Self::ReceiptPrintingInProgress => "RECEIPT_PRINTING",
            Self::ReceiptPending => "RECEIPT_PENDING",
            Self::NoReceiptRequested => "NO_RECEIPT_REQUESTED",
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================
// TESTS
// ============================================================
