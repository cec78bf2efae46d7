use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entitlement::{Entitlement, UNLIMITED, rollover_if_due};
use crate::error::LedgerError;
use crate::plan::{PlanId, PlanPolicy};
use crate::store::{Commit, LedgerStore};

/// Upper bound on optimistic-commit rounds before an operation gives up
/// with [`LedgerError::Contention`]. Keeps the wait on a hot entitlement
/// bounded instead of spinning.
pub const MAX_COMMIT_ATTEMPTS: u32 = 5;

pub(crate) fn commit_backoff(attempt: u32) -> std::time::Duration {
    std::time::Duration::from_millis(5 * u64::from(attempt))
}

/// What a consumption stores about the request; the content itself
/// lives with the generation pipeline.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub digest: String,
    pub bytes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(GenerationStatus::Pending),
            "completed" => Some(GenerationStatus::Completed),
            "failed" => Some(GenerationStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }
}

/// One row per consumed generation. Created inside the consuming
/// transaction; afterwards only the status advances
/// (pending -> completed | failed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub input_digest: String,
    pub input_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub status: GenerationStatus,
}

impl GenerationRecord {
    fn pending(user_id: Uuid, input: &GenerationInput, now: DateTime<Utc>) -> Self {
        GenerationRecord {
            id: Uuid::new_v4(),
            user_id,
            input_digest: input.digest.clone(),
            input_bytes: input.bytes,
            created_at: now,
            status: GenerationStatus::Pending,
        }
    }
}

/// Outcome of a consumption attempt. Denial is a first-class answer,
/// not an error; callers surface it as an upgrade prompt.
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    Allowed {
        entitlement: Entitlement,
        record: GenerationRecord,
    },
    Denied {
        entitlement: Entitlement,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationOutcome {
    Applied,
    /// The record was already failed; nothing moved.
    AlreadyCompensated,
}

/// Atomic check-and-increment of the caller's quota.
///
/// Loads the entitlement, applies a due period rollover, then either
/// denies without touching state or increments `quota_used` and writes
/// the pending [`GenerationRecord`] in the same commit. The whole
/// read-modify-write rides the store's version token, so two concurrent
/// requests for the same user cannot both spend the last unit: the
/// loser's commit conflicts and it re-reads the incremented count.
pub async fn try_consume(
    store: &dyn LedgerStore,
    policy: &PlanPolicy,
    user_id: Uuid,
    input: &GenerationInput,
    now: DateTime<Utc>,
) -> Result<ConsumeOutcome, LedgerError> {
    for attempt in 0..MAX_COMMIT_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(commit_backoff(attempt)).await;
        }

        let mut entitlement = match store.load_entitlement(user_id).await? {
            Some(entitlement) => entitlement,
            None => {
                // rows are provisioned at signup; a missing one is an
                // anomaly we repair with the free default
                log::warn!("no entitlement for user {user_id}, creating free default");
                let fresh =
                    Entitlement::free_default(user_id, policy.limit_for(PlanId::Free), now);
                store.create_entitlement(&fresh).await?;
                // reload so a concurrent creator wins cleanly
                continue;
            }
        };

        let rolled = match rollover_if_due(&entitlement, now) {
            Some(next) => {
                entitlement = next;
                true
            }
            None => false,
        };

        if entitlement.quota_limit != UNLIMITED
            && entitlement.quota_used >= entitlement.quota_limit
        {
            // denied: no consumption, but a due rollover is still persisted
            if rolled {
                if store.commit_entitlement(&entitlement).await? == Commit::Conflict {
                    continue;
                }
            }
            return Ok(ConsumeOutcome::Denied { entitlement });
        }

        // unlimited plans count usage too, for observability
        entitlement.quota_used += 1;
        let record = GenerationRecord::pending(user_id, input, now);

        match store.commit_consume(&entitlement, &record).await? {
            Commit::Applied => {
                entitlement.version += 1;
                return Ok(ConsumeOutcome::Allowed {
                    entitlement,
                    record,
                });
            }
            _ => continue,
        }
    }

    Err(LedgerError::Contention)
}

/// Compensating action for a consumption whose downstream generation
/// failed: give the unit back and mark the record failed, in one
/// commit. Idempotent by record id; a repeat on an already-failed
/// record is [`CompensationOutcome::AlreadyCompensated`].
pub async fn compensate(
    store: &dyn LedgerStore,
    user_id: Uuid,
    record_id: Uuid,
) -> Result<CompensationOutcome, LedgerError> {
    for attempt in 0..MAX_COMMIT_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(commit_backoff(attempt)).await;
        }

        let record = store
            .load_generation(record_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or(LedgerError::UnknownRecord(record_id))?;

        if record.status == GenerationStatus::Failed {
            return Ok(CompensationOutcome::AlreadyCompensated);
        }

        let mut entitlement = store
            .load_entitlement(user_id)
            .await?
            .ok_or(LedgerError::UnknownEntitlement(user_id))?;
        entitlement.quota_used = (entitlement.quota_used - 1).max(0);

        let mut failed = record;
        failed.status = GenerationStatus::Failed;

        match store.commit_compensation(&entitlement, &failed).await? {
            Commit::Applied => return Ok(CompensationOutcome::Applied),
            Commit::Duplicate => return Ok(CompensationOutcome::AlreadyCompensated),
            Commit::Conflict => continue,
        }
    }

    Err(LedgerError::Contention)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryLedger, StoreError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 9, 0, 0).unwrap()
    }

    fn input() -> GenerationInput {
        GenerationInput {
            digest: "abc123".to_string(),
            bytes: 512,
        }
    }

    async fn seed(store: &MemoryLedger, limit: i64, used: i64) -> Uuid {
        let user_id = Uuid::new_v4();
        let mut ent = Entitlement::free_default(user_id, limit, now());
        ent.quota_used = used;
        store.create_entitlement(&ent).await.unwrap();
        user_id
    }

    #[tokio::test]
    async fn allows_and_increments_under_limit() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 1).await;

        let outcome = try_consume(&store, &PlanPolicy::default(), user_id, &input(), now())
            .await
            .unwrap();

        match outcome {
            ConsumeOutcome::Allowed {
                entitlement,
                record,
            } => {
                assert_eq!(entitlement.quota_used, 2);
                assert_eq!(record.status, GenerationStatus::Pending);
                assert_eq!(record.user_id, user_id);
            }
            other => panic!("expected allowed, got {other:?}"),
        }

        let stored = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(stored.quota_used, 2);
    }

    #[tokio::test]
    async fn denies_at_limit_without_mutation() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 20).await;

        let outcome = try_consume(&store, &PlanPolicy::default(), user_id, &input(), now())
            .await
            .unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Denied { .. }));

        let stored = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(stored.quota_used, 20);
        assert!(store
            .list_generations(user_id, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unlimited_never_denies_but_still_counts() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, UNLIMITED, 10_000).await;

        let outcome = try_consume(&store, &PlanPolicy::default(), user_id, &input(), now())
            .await
            .unwrap();
        match outcome {
            ConsumeOutcome::Allowed { entitlement, .. } => {
                assert_eq!(entitlement.quota_used, 10_001)
            }
            other => panic!("expected allowed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rolls_over_elapsed_period_before_checking() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 20).await;

        let next_month = Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap();
        let outcome = try_consume(&store, &PlanPolicy::default(), user_id, &input(), next_month)
            .await
            .unwrap();

        match outcome {
            ConsumeOutcome::Allowed { entitlement, .. } => {
                assert_eq!(entitlement.quota_used, 1);
                assert!(entitlement.period_end > next_month);
            }
            other => panic!("expected allowed after rollover, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_entitlement_repaired_with_free_default() {
        let store = MemoryLedger::new();
        let user_id = Uuid::new_v4();

        let outcome = try_consume(&store, &PlanPolicy::default(), user_id, &input(), now())
            .await
            .unwrap();
        match outcome {
            ConsumeOutcome::Allowed { entitlement, .. } => {
                assert_eq!(entitlement.plan, PlanId::Free);
                assert_eq!(entitlement.quota_limit, 20);
                assert_eq!(entitlement.quota_used, 1);
            }
            other => panic!("expected allowed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_consumers_never_overspend() {
        let store = Arc::new(MemoryLedger::new());
        let limit = 8;
        let user_id = seed(&store, limit, 0).await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                try_consume(store.as_ref(), &PlanPolicy::default(), user_id, &input(), now())
                    .await
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(ConsumeOutcome::Allowed { .. }) => allowed += 1,
                Ok(ConsumeOutcome::Denied { .. }) | Err(LedgerError::Contention) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        // contention may make some attempts give up early, but the
        // limit is never crossed
        assert!(allowed <= limit);
        let stored = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(stored.quota_used, allowed);
        assert_eq!(
            store.list_generations(user_id, 100).await.unwrap().len(),
            allowed as usize
        );
    }

    /// Store whose entitlement row always moves between load and
    /// commit, so every commit attempt loses the race.
    struct ContendedStore {
        entitlement: Entitlement,
        commit_attempts: AtomicU32,
    }

    #[async_trait]
    impl LedgerStore for ContendedStore {
        async fn load_entitlement(&self, _: Uuid) -> Result<Option<Entitlement>, StoreError> {
            Ok(Some(self.entitlement.clone()))
        }

        async fn find_by_subscription_ref(
            &self,
            _: &str,
        ) -> Result<Option<Entitlement>, StoreError> {
            Ok(None)
        }

        async fn create_entitlement(&self, _: &Entitlement) -> Result<Commit, StoreError> {
            Ok(Commit::Conflict)
        }

        async fn seen_event(&self, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn commit_consume(
            &self,
            _: &Entitlement,
            _: &GenerationRecord,
        ) -> Result<Commit, StoreError> {
            self.commit_attempts.fetch_add(1, Ordering::SeqCst);
            Ok(Commit::Conflict)
        }

        async fn commit_entitlement(&self, _: &Entitlement) -> Result<Commit, StoreError> {
            Ok(Commit::Conflict)
        }

        async fn commit_reconciliation(
            &self,
            _: &str,
            _: Option<&Entitlement>,
        ) -> Result<Commit, StoreError> {
            Ok(Commit::Conflict)
        }

        async fn load_generation(&self, _: Uuid) -> Result<Option<GenerationRecord>, StoreError> {
            Ok(None)
        }

        async fn complete_generation(&self, _: Uuid) -> Result<(), StoreError> {
            Ok(())
        }

        async fn commit_compensation(
            &self,
            _: &Entitlement,
            _: &GenerationRecord,
        ) -> Result<Commit, StoreError> {
            Ok(Commit::Conflict)
        }

        async fn list_generations(
            &self,
            _: Uuid,
            _: i64,
        ) -> Result<Vec<GenerationRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn persistent_conflicts_exhaust_into_contention() {
        let user_id = Uuid::new_v4();
        let store = ContendedStore {
            entitlement: Entitlement::free_default(user_id, 20, now()),
            commit_attempts: AtomicU32::new(0),
        };

        let result = try_consume(&store, &PlanPolicy::default(), user_id, &input(), now()).await;

        assert!(matches!(result, Err(LedgerError::Contention)));
        assert_eq!(
            store.commit_attempts.load(Ordering::SeqCst),
            MAX_COMMIT_ATTEMPTS
        );
    }

    #[tokio::test]
    async fn compensation_refunds_once() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 1).await;

        let record = match try_consume(&store, &PlanPolicy::default(), user_id, &input(), now())
            .await
            .unwrap()
        {
            ConsumeOutcome::Allowed { record, .. } => record,
            other => panic!("expected allowed, got {other:?}"),
        };
        assert_eq!(
            store
                .load_entitlement(user_id)
                .await
                .unwrap()
                .unwrap()
                .quota_used,
            2
        );

        let first = compensate(&store, user_id, record.id).await.unwrap();
        assert_eq!(first, CompensationOutcome::Applied);

        let stored = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(stored.quota_used, 1);
        let stored_record = store.load_generation(record.id).await.unwrap().unwrap();
        assert_eq!(stored_record.status, GenerationStatus::Failed);

        // retry with the same record id refunds nothing further
        let second = compensate(&store, user_id, record.id).await.unwrap();
        assert_eq!(second, CompensationOutcome::AlreadyCompensated);
        assert_eq!(
            store
                .load_entitlement(user_id)
                .await
                .unwrap()
                .unwrap()
                .quota_used,
            1
        );
    }

    #[tokio::test]
    async fn compensation_for_unknown_record_errors() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 0).await;

        let result = compensate(&store, user_id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(LedgerError::UnknownRecord(_))));
    }

    #[tokio::test]
    async fn successful_generation_completes_record() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 0).await;

        let record = match try_consume(&store, &PlanPolicy::default(), user_id, &input(), now())
            .await
            .unwrap()
        {
            ConsumeOutcome::Allowed { record, .. } => record,
            other => panic!("expected allowed, got {other:?}"),
        };

        store.complete_generation(record.id).await.unwrap();
        let stored = store.load_generation(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Completed);
    }
}
