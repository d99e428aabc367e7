//! The append-only journal: every balance mutation, in posting order.
//!
//! Entries carry their own `balance_after` snapshot, so the journal is
//! self-verifying: replaying the stream from zero must reproduce every
//! snapshot along the way, and the final state must match the live store.
//! Any divergence means corruption and is reported as a supply-invariant
//! violation, never repaired silently.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clearbook_types::{
    AccountId, Balance, ClearbookError, Currency, EntryRef, EntrySeq, LedgerEntry, Result,
};
use sha2::{Digest, Sha256};

/// Append-only sequence of [`LedgerEntry`] records.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<LedgerEntry>,
}

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The sequence number the next appended entry must carry.
    #[must_use]
    pub fn next_seq(&self) -> EntrySeq {
        EntrySeq(self.entries.len() as u64)
    }

    /// Append an entry. The caller builds it with [`Journal::next_seq`]
    /// while holding the owning account's lock, which keeps per-account
    /// ordering consistent with sequence order.
    pub fn append(&mut self, entry: LedgerEntry) {
        debug_assert_eq!(entry.seq, self.next_seq(), "journal sequence gap");
        self.entries.push(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// All entries posted to one account, oldest first.
    #[must_use]
    pub fn for_account(&self, account_id: AccountId) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect()
    }

    /// All entries recorded at or after `since`, oldest first.
    #[must_use]
    pub fn since(&self, since: DateTime<Utc>) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.recorded_at >= since)
            .cloned()
            .collect()
    }

    /// Every entry one logical operation produced (a fill's four-plus
    /// legs, a request's postings), oldest first.
    #[must_use]
    pub fn for_reference(&self, reference: EntryRef) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.reference == reference)
            .cloned()
            .collect()
    }

    /// Rebuild every `(account, currency)` balance from the entry stream.
    ///
    /// Verifies, entry by entry, that the stored `balance_after` snapshot
    /// matches the recomputed state and that sequence numbers are gapless.
    ///
    /// # Errors
    /// Returns `SupplyInvariantViolation` on the first divergence.
    pub fn replay(&self) -> Result<HashMap<(AccountId, Currency), Balance>> {
        let mut balances: HashMap<(AccountId, Currency), Balance> = HashMap::new();

        for (index, entry) in self.entries.iter().enumerate() {
            if entry.seq.0 != index as u64 {
                return Err(ClearbookError::SupplyInvariantViolation {
                    reason: format!(
                        "journal gap: entry at position {index} carries sequence {}",
                        entry.seq
                    ),
                });
            }

            let key = (entry.account_id, entry.currency.clone());
            let before = balances.get(&key).copied().unwrap_or_default();
            let after = entry.kind.apply(before, entry.amount);

            if after != entry.balance_after {
                return Err(ClearbookError::SupplyInvariantViolation {
                    reason: format!(
                        "replay divergence at {}: recomputed avail {} rsvd {}, recorded avail {} rsvd {}",
                        entry.seq,
                        after.available,
                        after.reserved,
                        entry.balance_after.available,
                        entry.balance_after.reserved,
                    ),
                });
            }

            balances.insert(key, after);
        }

        Ok(balances)
    }

    /// Deterministic digest over the journal's economic content.
    ///
    /// Hashes each entry's sequence, account, currency, kind, amount, and
    /// balance snapshot, but not `recorded_at`, so two journals recording
    /// identical histories at different wall-clock times digest the same.
    #[must_use]
    pub fn checksum(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"clearbook:journal:v1:");
        hasher.update((self.entries.len() as u64).to_le_bytes());

        for entry in &self.entries {
            hasher.update(entry.seq.0.to_le_bytes());
            hasher.update(entry.account_id.0.as_bytes());
            hasher.update(entry.currency.as_bytes());
            hasher.update(entry.kind.to_string().as_bytes());
            hasher.update(entry.amount.to_string().as_bytes());
            hasher.update(entry.balance_after.available.to_string().as_bytes());
            hasher.update(entry.balance_after.reserved.to_string().as_bytes());
            hasher.update(entry.reference.to_string().as_bytes());
        }

        let result = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        digest
    }

    /// Export the full journal as a JSON array, for offline audit.
    ///
    /// # Errors
    /// Returns `Serialization` if an entry fails to encode.
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }
}
