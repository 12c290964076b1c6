//! Transfer history log
//!
//! Bounded ring of the most recent transfer outcomes, durable across power
//! loss, with an O(1) transaction-id index for the dedup/replay check. The
//! host may resend a poll after a comm failure; the stored outcome is the
//! only legal answer, so entries are append-once. The single exception is
//! resolving a `Pending` entry and advancing its receipt status.
//!
//! Each live entry occupies one store slot. Appends reuse the slot of the
//! evicted entry (never a pending one), so every record on disk is live and
//! a pending entry's durable copy can never be overwritten by ring laps.

use crate::codes::{ReceiptStatus, TransferStatus};
use crate::core_types::TransactionIndex;
use crate::error::AftError;
use crate::outcome::TransferOutcome;
use crate::storage::{blocks, read_record, write_record, StateStore};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Persisted per-slot record: the monotonic sequence plus the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotRecord {
    seq: u64,
    outcome: TransferOutcome,
}

/// Persisted ring metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryMeta {
    next_seq: u64,
    capacity: u32,
}

/// Bounded, durable, index-addressable log of transfer outcomes.
pub struct HistoryLog {
    capacity: usize,
    /// Live entries keyed by monotonic sequence (oldest first)
    entries: BTreeMap<u64, TransferOutcome>,
    /// Transaction id -> sequence, for O(1) duplicate lookup
    by_txn_id: FxHashMap<String, u64>,
    /// Sequence -> occupied store slot
    slot_by_seq: FxHashMap<u64, u32>,
    /// Store slots not currently holding a live entry
    free_slots: Vec<u32>,
    next_seq: u64,
}

impl HistoryLog {
    /// Fresh log. `capacity` is the protocol's max buffer index.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            capacity,
            entries: BTreeMap::new(),
            by_txn_id: FxHashMap::default(),
            slot_by_seq: FxHashMap::default(),
            free_slots: (0..capacity as u32).rev().collect(),
            next_seq: 0,
        }
    }

    /// Rebuild the log from the store after a restart.
    ///
    /// Pending entries come back as pending; they stay that way until the
    /// host interrogates/cancels or the caller times them out. Nothing is
    /// re-applied and nothing is discarded here.
    pub fn recover(store: &dyn StateStore, capacity: usize) -> Result<Self, AftError> {
        let mut log = Self::new(capacity);
        let meta: Option<HistoryMeta> = read_record(store, blocks::HISTORY_META, 0)?;
        let Some(meta) = meta else {
            return Ok(log);
        };
        log.next_seq = meta.next_seq;
        log.free_slots.clear();

        for slot in (0..capacity as u32).rev() {
            let record: Option<SlotRecord> = read_record(store, blocks::HISTORY, slot)?;
            match record {
                Some(record) => {
                    log.by_txn_id
                        .insert(record.outcome.transaction_id.clone(), record.seq);
                    log.slot_by_seq.insert(record.seq, slot);
                    log.entries.insert(record.seq, record.outcome);
                }
                None => log.free_slots.push(slot),
            }
        }

        let pending = log.entries.values().filter(|o| o.is_pending()).count();
        if pending > 0 {
            warn!(pending, "history recovered with unresolved pending transfers");
        }
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an outcome, evicting the oldest non-pending entry if full.
    ///
    /// The slot write and the meta write are staged and committed as one
    /// unit before this returns; the assigned slot is stored into the
    /// outcome's `transaction_index`.
    pub fn append(
        &mut self,
        store: &mut dyn StateStore,
        mut outcome: TransferOutcome,
    ) -> Result<TransactionIndex, AftError> {
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                // Oldest-first victim search, skipping pending entries.
                let victim = self
                    .entries
                    .iter()
                    .find(|(_, o)| !o.is_pending())
                    .map(|(seq, _)| *seq);
                let Some(seq) = victim else {
                    return Err(AftError::HistoryFull);
                };
                let evicted = self.entries.remove(&seq).expect("victim entry exists");
                self.by_txn_id.remove(&evicted.transaction_id);
                debug!(txn_id = %evicted.transaction_id, "history ring evicted entry");
                self.slot_by_seq.remove(&seq).expect("victim slot known")
            }
        };

        let seq = self.next_seq;
        outcome.transaction_index = slot as TransactionIndex;

        write_record(
            store,
            blocks::HISTORY,
            slot,
            &SlotRecord {
                seq,
                outcome: outcome.clone(),
            },
        )?;
        write_record(
            store,
            blocks::HISTORY_META,
            0,
            &HistoryMeta {
                next_seq: seq + 1,
                capacity: self.capacity as u32,
            },
        )?;
        store.commit()?;

        self.by_txn_id.insert(outcome.transaction_id.clone(), seq);
        self.slot_by_seq.insert(seq, slot);
        self.entries.insert(seq, outcome);
        self.next_seq = seq + 1;
        Ok(slot as TransactionIndex)
    }

    /// O(1) lookup by the host's idempotency key.
    pub fn find_by_transaction_id(&self, transaction_id: &str) -> Option<&TransferOutcome> {
        let seq = self.by_txn_id.get(transaction_id)?;
        self.entries.get(seq)
    }

    /// Interrogation addressing: 0 = most recent, higher walks backwards.
    pub fn get_by_index(&self, index: TransactionIndex) -> Option<&TransferOutcome> {
        self.entries.values().rev().nth(index as usize)
    }

    /// Most recent outcome, if any.
    pub fn last(&self) -> Option<&TransferOutcome> {
        self.entries.values().next_back()
    }

    /// Transaction ids of unresolved pending entries, oldest first.
    pub fn pending_transaction_ids(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|o| o.is_pending())
            .map(|o| o.transaction_id.clone())
            .collect()
    }

    /// Resolve a `Pending` entry to a terminal status. The only legal
    /// post-append status mutation.
    pub fn resolve_pending(
        &mut self,
        store: &mut dyn StateStore,
        transaction_id: &str,
        status: TransferStatus,
    ) -> Result<(), AftError> {
        debug_assert!(!status.is_pending());
        let Some(&seq) = self.by_txn_id.get(transaction_id) else {
            return Err(AftError::DuplicatePayloadMismatch(format!(
                "resolve for unknown transaction id {transaction_id}"
            )));
        };
        let slot = self.slot_by_seq[&seq];
        let entry = self.entries.get_mut(&seq).expect("indexed entry exists");
        if !entry.is_pending() {
            // Idempotent when already resolved to the same status.
            if entry.status == status {
                return Ok(());
            }
            return Err(AftError::DuplicatePayloadMismatch(format!(
                "transaction {transaction_id} already resolved to {}",
                entry.status
            )));
        }
        entry.status = status;
        Self::persist_entry(store, slot, seq, entry)
    }

    /// Stamp the post-completion cumulative meter snapshot onto an entry.
    pub fn set_cumulative(
        &mut self,
        store: &mut dyn StateStore,
        transaction_id: &str,
        cumulative: crate::amounts::MeterSet,
    ) -> Result<(), AftError> {
        let Some(&seq) = self.by_txn_id.get(transaction_id) else {
            return Ok(());
        };
        let slot = self.slot_by_seq[&seq];
        let entry = self.entries.get_mut(&seq).expect("indexed entry exists");
        entry.cumulative = cumulative;
        Self::persist_entry(store, slot, seq, entry)
    }

    /// Zero the moved amounts on an entry that ended without moving funds
    /// (canceled or refused after the pending write).
    pub fn zero_amounts(
        &mut self,
        store: &mut dyn StateStore,
        transaction_id: &str,
    ) -> Result<(), AftError> {
        let Some(&seq) = self.by_txn_id.get(transaction_id) else {
            return Ok(());
        };
        let slot = self.slot_by_seq[&seq];
        let entry = self.entries.get_mut(&seq).expect("indexed entry exists");
        entry.amounts = crate::amounts::FundAmounts::ZERO;
        Self::persist_entry(store, slot, seq, entry)
    }

    /// Advance the receipt status of a stored entry (printer collaborator
    /// reports completion asynchronously to the poll cycle).
    pub fn set_receipt_status(
        &mut self,
        store: &mut dyn StateStore,
        transaction_id: &str,
        receipt_status: ReceiptStatus,
    ) -> Result<(), AftError> {
        let Some(&seq) = self.by_txn_id.get(transaction_id) else {
            return Ok(());
        };
        let slot = self.slot_by_seq[&seq];
        let entry = self.entries.get_mut(&seq).expect("indexed entry exists");
        entry.receipt_status = receipt_status;
        Self::persist_entry(store, slot, seq, entry)
    }

    fn persist_entry(
        store: &mut dyn StateStore,
        slot: u32,
        seq: u64,
        entry: &TransferOutcome,
    ) -> Result<(), AftError> {
        write_record(
            store,
            blocks::HISTORY,
            slot,
            &SlotRecord {
                seq,
                outcome: entry.clone(),
            },
        )?;
        store.commit()
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amounts::FundAmounts;
    use crate::codes::{TransferCode, TransferType};
    use crate::request::TransferRequest;
    use crate::storage::MemoryStore;

    fn outcome(txn_id: &str, status: TransferStatus) -> TransferOutcome {
        let req = TransferRequest::new(
            TransferCode::FullTransferOnly,
            TransferType::InHouseToMachine,
            FundAmounts::cashable_only(100),
            txn_id,
        );
        let mut out = TransferOutcome::rejection(&req, TransferStatus::GamingMachineNotLocked);
        out.status = status;
        out
    }

    #[test]
    fn test_append_and_find() {
        let mut store = MemoryStore::new();
        let mut log = HistoryLog::new(8);

        let index = log
            .append(&mut store, outcome("TX1", TransferStatus::FullTransferSuccessful))
            .unwrap();
        assert_eq!(index, 0);
        assert_eq!(log.len(), 1);
        assert!(log.find_by_transaction_id("TX1").is_some());
        assert!(log.find_by_transaction_id("TX9").is_none());
    }

    #[test]
    fn test_get_by_index_most_recent_first() {
        let mut store = MemoryStore::new();
        let mut log = HistoryLog::new(8);
        log.append(&mut store, outcome("TX1", TransferStatus::FullTransferSuccessful))
            .unwrap();
        log.append(&mut store, outcome("TX2", TransferStatus::FullTransferSuccessful))
            .unwrap();

        assert_eq!(log.get_by_index(0).unwrap().transaction_id, "TX2");
        assert_eq!(log.get_by_index(1).unwrap().transaction_id, "TX1");
        assert!(log.get_by_index(2).is_none());
        assert_eq!(log.last().unwrap().transaction_id, "TX2");
    }

    #[test]
    fn test_ring_eviction_skips_pending() {
        let mut store = MemoryStore::new();
        let mut log = HistoryLog::new(2);
        log.append(&mut store, outcome("TX1", TransferStatus::TransferPending))
            .unwrap();
        log.append(&mut store, outcome("TX2", TransferStatus::FullTransferSuccessful))
            .unwrap();
        // TX2 (non-pending) is evicted even though TX1 is older.
        log.append(&mut store, outcome("TX3", TransferStatus::FullTransferSuccessful))
            .unwrap();

        assert!(log.find_by_transaction_id("TX1").is_some());
        assert!(log.find_by_transaction_id("TX2").is_none());
        assert!(log.find_by_transaction_id("TX3").is_some());

        // The pending entry's durable copy survived the lap.
        let recovered = HistoryLog::recover(&store, 2).unwrap();
        assert_eq!(
            recovered.find_by_transaction_id("TX1").unwrap().status,
            TransferStatus::TransferPending
        );
        assert!(recovered.find_by_transaction_id("TX3").is_some());
    }

    #[test]
    fn test_ring_full_of_pending_rejects() {
        let mut store = MemoryStore::new();
        let mut log = HistoryLog::new(2);
        log.append(&mut store, outcome("TX1", TransferStatus::TransferPending))
            .unwrap();
        log.append(&mut store, outcome("TX2", TransferStatus::TransferPending))
            .unwrap();

        let result = log.append(&mut store, outcome("TX3", TransferStatus::FullTransferSuccessful));
        assert!(matches!(result, Err(AftError::HistoryFull)));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_resolve_pending() {
        let mut store = MemoryStore::new();
        let mut log = HistoryLog::new(4);
        log.append(&mut store, outcome("TX1", TransferStatus::TransferPending))
            .unwrap();

        log.resolve_pending(&mut store, "TX1", TransferStatus::TransferCanceledByHost)
            .unwrap();
        assert_eq!(
            log.find_by_transaction_id("TX1").unwrap().status,
            TransferStatus::TransferCanceledByHost
        );

        // Idempotent for the same terminal status
        log.resolve_pending(&mut store, "TX1", TransferStatus::TransferCanceledByHost)
            .unwrap();
        // Divergent re-resolution is a data-integrity fault
        assert!(log
            .resolve_pending(&mut store, "TX1", TransferStatus::FullTransferSuccessful)
            .is_err());
    }

    #[test]
    fn test_recover_rebuilds_ring_and_index() {
        let mut store = MemoryStore::new();
        let mut log = HistoryLog::new(4);
        log.append(&mut store, outcome("TX1", TransferStatus::FullTransferSuccessful))
            .unwrap();
        log.append(&mut store, outcome("TX2", TransferStatus::TransferPending))
            .unwrap();

        let recovered = HistoryLog::recover(&store, 4).unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(
            recovered.find_by_transaction_id("TX2").unwrap().status,
            TransferStatus::TransferPending
        );
        assert_eq!(recovered.pending_transaction_ids(), vec!["TX2".to_string()]);
        assert_eq!(recovered.last().unwrap().transaction_id, "TX2");
    }

    #[test]
    fn test_recover_preserves_append_order_across_laps() {
        let mut store = MemoryStore::new();
        let mut log = HistoryLog::new(2);
        for id in ["TX1", "TX2", "TX3"] {
            log.append(&mut store, outcome(id, TransferStatus::FullTransferSuccessful))
                .unwrap();
        }

        let recovered = HistoryLog::recover(&store, 2).unwrap();
        assert_eq!(recovered.len(), 2);
        assert!(recovered.find_by_transaction_id("TX1").is_none());
        assert_eq!(recovered.get_by_index(0).unwrap().transaction_id, "TX3");
        assert_eq!(recovered.get_by_index(1).unwrap().transaction_id, "TX2");
    }
}
