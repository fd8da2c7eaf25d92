use std::collections::BTreeMap;

use contracts::{AccountRecord, ParticipantId, Role, TimestampMs};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown account {0}")]
    UnknownAccount(ParticipantId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub timestamp_ms: TimestampMs,
    pub account: ParticipantId,
    /// Signed change actually applied to the balance.
    pub delta: i64,
    pub balance_after: u64,
    pub cause: String,
}

/// Account book: balances, roles and locales of every known participant,
/// plus a journal of applied balance changes. The journal holds entries
/// until the owner drains them.
#[derive(Debug, Clone, Default)]
pub struct AccountLedger {
    accounts: BTreeMap<ParticipantId, AccountRecord>,
    entries: Vec<LedgerEntry>,
    next_entry_seq: u64,
}

impl AccountLedger {
    pub fn new(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        Self {
            accounts: records
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect(),
            entries: Vec::new(),
            next_entry_seq: 0,
        }
    }

    /// Adds stored records for ids the ledger does not know yet. Returns how
    /// many were added.
    pub fn import(&mut self, records: impl IntoIterator<Item = AccountRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if let std::collections::btree_map::Entry::Vacant(slot) =
                self.accounts.entry(record.id.clone())
            {
                slot.insert(record);
                added += 1;
            }
        }
        added
    }

    pub fn account(&self, id: &ParticipantId) -> Option<&AccountRecord> {
        self.accounts.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &AccountRecord> {
        self.accounts.values()
    }

    /// Journal entries recorded since the last drain.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn drain_entries(&mut self) -> Vec<LedgerEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn balance(&self, id: &ParticipantId) -> Option<u64> {
        self.accounts.get(id).map(|record| record.balance)
    }

    /// Unknown participants are treated as targets.
    pub fn role(&self, id: &ParticipantId) -> Role {
        self.accounts
            .get(id)
            .map(|record| record.role)
            .unwrap_or_default()
    }

    /// Returns the existing record (refreshing its display name) or opens a
    /// new one funded with `starting_balance`.
    pub fn ensure_account(
        &mut self,
        id: &ParticipantId,
        display_name: &str,
        starting_balance: u64,
    ) -> &AccountRecord {
        let record = self
            .accounts
            .entry(id.clone())
            .or_insert_with(|| AccountRecord::new(id.clone(), display_name, starting_balance));
        if !display_name.is_empty() && record.display_name != display_name {
            record.display_name = display_name.to_string();
        }
        record
    }

    pub fn credit(
        &mut self,
        id: &ParticipantId,
        amount: u64,
        cause: &str,
        now: TimestampMs,
    ) -> Result<u64, LedgerError> {
        let record = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.clone()))?;
        if amount == 0 {
            return Ok(record.balance);
        }
        let before = record.balance;
        record.balance = before.saturating_add(amount);
        let applied = record.balance - before;
        let balance_after = record.balance;
        self.journal(id, i64::try_from(applied).unwrap_or(i64::MAX), balance_after, cause, now);
        Ok(balance_after)
    }

    /// Deducts up to `amount`, never below zero. Returns what was deducted.
    pub fn penalize(
        &mut self,
        id: &ParticipantId,
        amount: u64,
        cause: &str,
        now: TimestampMs,
    ) -> Result<u64, LedgerError> {
        let record = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.clone()))?;
        let deducted = amount.min(record.balance);
        if deducted == 0 {
            return Ok(0);
        }
        record.balance -= deducted;
        let balance_after = record.balance;
        self.journal(
            id,
            -i64::try_from(deducted).unwrap_or(i64::MAX),
            balance_after,
            cause,
            now,
        );
        Ok(deducted)
    }

    pub fn set_role(&mut self, id: &ParticipantId, role: Role) -> Result<(), LedgerError> {
        let record = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.clone()))?;
        record.role = role;
        Ok(())
    }

    pub fn set_locale(&mut self, id: &ParticipantId, locale: &str) -> Result<(), LedgerError> {
        let record = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownAccount(id.clone()))?;
        record.locale = locale.to_string();
        Ok(())
    }

    fn journal(
        &mut self,
        id: &ParticipantId,
        delta: i64,
        balance_after: u64,
        cause: &str,
        now: TimestampMs,
    ) {
        self.next_entry_seq += 1;
        let entry_id = format!("ledger:{now}:{}", self.next_entry_seq);
        self.entries.push(LedgerEntry {
            entry_id,
            timestamp_ms: now,
            account: id.clone(),
            delta,
            balance_after,
            cause: cause.to_string(),
        });
    }
}
