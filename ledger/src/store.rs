use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::entitlement::Entitlement;
use crate::quota::{GenerationRecord, GenerationStatus};

/// Infrastructure fault from the backing store. Transient by contract:
/// callers may retry and every commit below is safe to repeat.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of an atomic commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The write went through.
    Applied,
    /// The entitlement moved on since it was loaded; reload and retry.
    Conflict,
    /// The guarded unique key (event id, compensation) was already
    /// present. A successful no-op for the caller.
    Duplicate,
}

/// Transactional persistence boundary of the ledger.
///
/// Every `commit_*` call is a single atomic unit: either all of its
/// writes land or none do. Entitlement writes carry the version the
/// caller loaded and fail with [`Commit::Conflict`] when the stored row
/// has a different one, which is what lets two concurrent consumers of
/// the same entitlement serialize without row locks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load_entitlement(&self, user_id: Uuid) -> Result<Option<Entitlement>, StoreError>;

    /// Lookup by the payment provider's subscription id. That id, not
    /// the user id, is the key subscription events arrive under.
    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<Entitlement>, StoreError>;

    /// First-write-wins insert of a fresh entitlement.
    async fn create_entitlement(&self, entitlement: &Entitlement) -> Result<Commit, StoreError>;

    /// Cheap pre-check of the processed-event log. The authoritative
    /// guard is the insert inside [`commit_reconciliation`].
    ///
    /// [`commit_reconciliation`]: LedgerStore::commit_reconciliation
    async fn seen_event(&self, event_id: &str) -> Result<bool, StoreError>;

    /// Persist a quota consumption: the incremented entitlement and the
    /// new pending generation record, all-or-nothing.
    async fn commit_consume(
        &self,
        entitlement: &Entitlement,
        record: &GenerationRecord,
    ) -> Result<Commit, StoreError>;

    /// Persist an entitlement mutation alone (rollover on a denied
    /// read, reconciliation without an event id context).
    async fn commit_entitlement(&self, entitlement: &Entitlement) -> Result<Commit, StoreError>;

    /// Record a processed event id and, when present, the entitlement
    /// state it produced, in one transaction. `None` acknowledges an
    /// event that deliberately changes nothing (anomalies, unmatched
    /// refs). A previously recorded event id yields
    /// [`Commit::Duplicate`] and writes nothing.
    async fn commit_reconciliation(
        &self,
        event_id: &str,
        entitlement: Option<&Entitlement>,
    ) -> Result<Commit, StoreError>;

    async fn load_generation(
        &self,
        record_id: Uuid,
    ) -> Result<Option<GenerationRecord>, StoreError>;

    /// Advance a pending generation record to completed.
    async fn complete_generation(&self, record_id: Uuid) -> Result<(), StoreError>;

    /// Persist a compensation: the decremented entitlement plus the
    /// record flipped to failed. A record that is already failed yields
    /// [`Commit::Duplicate`], keeping retries from double-refunding.
    async fn commit_compensation(
        &self,
        entitlement: &Entitlement,
        record: &GenerationRecord,
    ) -> Result<Commit, StoreError>;

    async fn list_generations(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    entitlements: HashMap<Uuid, Entitlement>,
    events: HashSet<String>,
    generations: HashMap<Uuid, GenerationRecord>,
}

/// In-memory [`LedgerStore`] over a single mutex, so every commit is
/// trivially atomic. Backs the unit tests and local development without
/// a database.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<MemoryInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // a poisoned mutex only happens after a panicked test
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn store_versioned(slot: &mut HashMap<Uuid, Entitlement>, entitlement: &Entitlement) -> Commit {
    match slot.get(&entitlement.user_id) {
        Some(current) if current.version != entitlement.version => Commit::Conflict,
        None if entitlement.version != 0 => Commit::Conflict,
        _ => {
            let mut next = entitlement.clone();
            next.version += 1;
            slot.insert(entitlement.user_id, next);
            Commit::Applied
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn load_entitlement(&self, user_id: Uuid) -> Result<Option<Entitlement>, StoreError> {
        Ok(self.lock().entitlements.get(&user_id).cloned())
    }

    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<Entitlement>, StoreError> {
        Ok(self
            .lock()
            .entitlements
            .values()
            .find(|e| e.subscription_ref.as_deref() == Some(subscription_ref))
            .cloned())
    }

    async fn create_entitlement(&self, entitlement: &Entitlement) -> Result<Commit, StoreError> {
        let mut inner = self.lock();
        if inner.entitlements.contains_key(&entitlement.user_id) {
            return Ok(Commit::Conflict);
        }
        let mut next = entitlement.clone();
        next.version += 1;
        inner.entitlements.insert(entitlement.user_id, next);
        Ok(Commit::Applied)
    }

    async fn seen_event(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(self.lock().events.contains(event_id))
    }

    async fn commit_consume(
        &self,
        entitlement: &Entitlement,
        record: &GenerationRecord,
    ) -> Result<Commit, StoreError> {
        let mut inner = self.lock();
        match store_versioned(&mut inner.entitlements, entitlement) {
            Commit::Applied => {
                inner.generations.insert(record.id, record.clone());
                Ok(Commit::Applied)
            }
            other => Ok(other),
        }
    }

    async fn commit_entitlement(&self, entitlement: &Entitlement) -> Result<Commit, StoreError> {
        let mut inner = self.lock();
        Ok(store_versioned(&mut inner.entitlements, entitlement))
    }

    async fn commit_reconciliation(
        &self,
        event_id: &str,
        entitlement: Option<&Entitlement>,
    ) -> Result<Commit, StoreError> {
        let mut inner = self.lock();
        if inner.events.contains(event_id) {
            return Ok(Commit::Duplicate);
        }
        if let Some(entitlement) = entitlement {
            match store_versioned(&mut inner.entitlements, entitlement) {
                Commit::Applied => {}
                other => return Ok(other),
            }
        }
        inner.events.insert(event_id.to_string());
        Ok(Commit::Applied)
    }

    async fn load_generation(
        &self,
        record_id: Uuid,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        Ok(self.lock().generations.get(&record_id).cloned())
    }

    async fn complete_generation(&self, record_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(record) = inner.generations.get_mut(&record_id) {
            if record.status == GenerationStatus::Pending {
                record.status = GenerationStatus::Completed;
            }
        }
        Ok(())
    }

    async fn commit_compensation(
        &self,
        entitlement: &Entitlement,
        record: &GenerationRecord,
    ) -> Result<Commit, StoreError> {
        let mut inner = self.lock();
        match inner.generations.get(&record.id) {
            Some(current) if current.status == GenerationStatus::Failed => {
                return Ok(Commit::Duplicate);
            }
            None => return Ok(Commit::Conflict),
            _ => {}
        }
        match store_versioned(&mut inner.entitlements, entitlement) {
            Commit::Applied => {
                inner.generations.insert(record.id, record.clone());
                Ok(Commit::Applied)
            }
            other => Ok(other),
        }
    }

    async fn list_generations(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        let inner = self.lock();
        let mut records: Vec<GenerationRecord> = inner
            .generations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}
