//! Transaction receipt composition
//!
//! Builds the printable receipt for a completed transfer and drives the
//! printer collaborator. Printing is asynchronous to the poll cycle: the
//! outcome's receipt status starts `ReceiptPending`, moves to
//! `ReceiptPrintingInProgress` when the job starts, and lands on
//! `ReceiptPrinted`. A printer failure never unwinds the funds transfer.

use crate::codes::TransferDirection;
use crate::config::ReceiptConfig;
use crate::core_types::Cents;
use crate::outcome::TransferOutcome;
use tracing::debug;

/// One label/value row on the printed receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLine {
    pub label: &'static str,
    pub value: String,
}

/// A fully composed receipt, ready for the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub title: String,
    pub location: String,
    pub address_1: String,
    pub address_2: String,
    pub lines: Vec<ReceiptLine>,
}

/// Printer job progress as seen from the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintProgress {
    InProgress,
    Done,
    Failed,
}

/// The physical (or emulated) receipt printer.
///
/// `start` queues the job; `poll` is called once per poll cycle until the
/// job leaves `InProgress`.
pub trait ReceiptPrinter {
    fn start(&mut self, receipt: &Receipt) -> bool;
    fn poll(&mut self) -> PrintProgress;
}

/// Builds receipts from transfer outcomes and the configured venue text.
pub struct ReceiptComposer {
    config: ReceiptConfig,
}

impl ReceiptComposer {
    pub fn new(config: ReceiptConfig) -> Self {
        Self { config }
    }

    /// Compose the receipt for a completed transfer.
    ///
    /// Venue text comes from config unless the request carried custom
    /// ticket data; the title follows the transfer type.
    pub fn compose(&self, outcome: &TransferOutcome) -> Receipt {
        let (location, address_1, address_2) = match &outcome.custom_ticket_data {
            Some(custom) if outcome.flags.use_custom_ticket_data() => (
                custom.location.clone(),
                custom.address_1.clone(),
                custom.address_2.clone(),
            ),
            _ => (
                self.config.location.clone(),
                self.config.address_1.clone(),
                self.config.address_2.clone(),
            ),
        };

        let mut lines = vec![
            ReceiptLine {
                label: "ASSET",
                value: format!("{:08}", outcome.asset_number),
            },
            ReceiptLine {
                label: "TRANSACTION",
                value: outcome.transaction_id.clone(),
            },
            ReceiptLine {
                label: "SEQ",
                value: format!("{:03}", outcome.transaction_index),
            },
            ReceiptLine {
                label: "DATE/TIME",
                value: outcome.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            },
        ];
        if outcome.transfer_type.is_debit() && !outcome.debit_account.is_empty() {
            lines.push(ReceiptLine {
                label: "CARD",
                value: mask_account(&outcome.debit_account),
            });
        }
        if outcome.amounts.cashable() > 0 {
            lines.push(ReceiptLine {
                label: "CASHABLE",
                value: format_cents(outcome.amounts.cashable()),
            });
        }
        if outcome.amounts.restricted() > 0 {
            lines.push(ReceiptLine {
                label: "RESTRICTED",
                value: format_cents(outcome.amounts.restricted()),
            });
            lines.push(ReceiptLine {
                label: "EXPIRES",
                value: format_expiration(outcome.expiration),
            });
        }
        if outcome.amounts.nonrestricted() > 0 {
            lines.push(ReceiptLine {
                label: "NONRESTRICTED",
                value: format_cents(outcome.amounts.nonrestricted()),
            });
        }
        lines.push(ReceiptLine {
            label: "TOTAL",
            value: format_cents(outcome.amounts.total().unwrap_or(0)),
        });

        Receipt {
            title: self.title_for(outcome),
            location,
            address_1,
            address_2,
            lines,
        }
    }

    fn title_for(&self, outcome: &TransferOutcome) -> String {
        if outcome.transfer_type.is_debit() {
            return match &outcome.custom_ticket_data {
                Some(custom)
                    if outcome.flags.use_custom_ticket_data()
                        && !custom.debit_title.is_empty() =>
                {
                    custom.debit_title.clone()
                }
                _ => self.config.debit_title.clone(),
            };
        }
        if outcome.amounts.restricted() > 0 {
            return match &outcome.custom_ticket_data {
                Some(custom)
                    if outcome.flags.use_custom_ticket_data()
                        && !custom.restricted_title.is_empty() =>
                {
                    custom.restricted_title.clone()
                }
                _ => self.config.restricted_title.clone(),
            };
        }
        match outcome.transfer_type.direction() {
            TransferDirection::ToHost => "TRANSFER TO ACCOUNT".to_string(),
            _ => "TRANSFER FROM ACCOUNT".to_string(),
        }
    }
}

/// Cents to "$d.cc".
pub fn format_cents(cents: Cents) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

/// Everything but the last four digits masked, as printed on debit
/// receipts.
pub fn mask_account(account: &str) -> String {
    let tail_at = account.len().saturating_sub(4);
    match account.get(tail_at..) {
        Some(tail) => format!("XXXX{tail}"),
        None => "XXXX".to_string(),
    }
}

/// Expiration as printed: MMDDYYYY packed decimal to "MM/DD/YYYY",
/// small values as "N DAYS".
pub fn format_expiration(expiration: u32) -> String {
    if expiration == 0 {
        return "NONE".to_string();
    }
    if expiration < 10000 {
        return format!("{expiration} DAYS");
    }
    let month = expiration / 1_000_000;
    let day = (expiration / 10_000) % 100;
    let year = expiration % 10_000;
    format!("{month:02}/{day:02}/{year:04}")
}

/// Tracks the single in-flight print job for the poll loop.
///
/// The loop calls `start` right after a receipt-requesting transfer
/// completes, then `poll` once per cycle; the returned progress is fed to
/// the negotiator's receipt callbacks.
pub struct ReceiptService<P: ReceiptPrinter> {
    composer: ReceiptComposer,
    printer: P,
    active: Option<String>,
}

impl<P: ReceiptPrinter> ReceiptService<P> {
    pub fn new(config: ReceiptConfig, printer: P) -> Self {
        Self {
            composer: ReceiptComposer::new(config),
            printer,
            active: None,
        }
    }

    pub fn active_transaction(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Queue the receipt for a completed transfer. Returns false when the
    /// printer refuses the job (out of paper, offline).
    pub fn start(&mut self, outcome: &TransferOutcome) -> bool {
        let receipt = self.composer.compose(outcome);
        if self.printer.start(&receipt) {
            debug!(txn_id = %outcome.transaction_id, "receipt job started");
            self.active = Some(outcome.transaction_id.clone());
            true
        } else {
            false
        }
    }

    /// Advance the active job. `Done`/`Failed` clear it; the caller
    /// reports the result through the negotiator's receipt callbacks.
    pub fn poll(&mut self) -> Option<(String, PrintProgress)> {
        let txn_id = self.active.clone()?;
        let progress = self.printer.poll();
        if progress != PrintProgress::InProgress {
            self.active = None;
        }
        Some((txn_id, progress))
    }
}

// ============================================================
// TESTS
// ============================================================
