use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use ledger::{Commit, Entitlement, GenerationRecord, LedgerStore, StoreError};

use crate::models::entitlement::EntitlementRow;
use crate::models::generation::GenerationRow;

const ENTITLEMENT_COLUMNS: &str = "user_id, plan, quota_limit, quota_used, status, \
     subscription_ref, period_start, period_end, version";

/// Postgres-backed [`LedgerStore`]. Each `commit_*` runs one
/// transaction; the entitlement's version column is the optimistic
/// guard, checked in the UPDATE predicate rather than with row locks.
#[derive(Clone)]
pub struct PgLedger {
    pool: Arc<PgPool>,
}

impl PgLedger {
    pub fn new(pool: Arc<PgPool>) -> Self {
        PgLedger { pool }
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Versioned entitlement upsert usable inside a transaction. Inserts
/// when the row is absent (expected version 0), otherwise updates only
/// if the stored version still matches. Zero affected rows means the
/// caller lost the race.
async fn upsert_entitlement(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    ent: &Entitlement,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO entitlements
            (user_id, plan, quota_limit, quota_used, status, subscription_ref,
             period_start, period_end, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9 + 1)
        ON CONFLICT (user_id) DO UPDATE SET
            plan = EXCLUDED.plan,
            quota_limit = EXCLUDED.quota_limit,
            quota_used = EXCLUDED.quota_used,
            status = EXCLUDED.status,
            subscription_ref = EXCLUDED.subscription_ref,
            period_start = EXCLUDED.period_start,
            period_end = EXCLUDED.period_end,
            version = entitlements.version + 1,
            updated_at = now()
        WHERE entitlements.version = $9
        "#,
    )
    .bind(ent.user_id)
    .bind(ent.plan.to_string())
    .bind(ent.quota_limit)
    .bind(ent.quota_used)
    .bind(ent.status.as_str())
    .bind(&ent.subscription_ref)
    .bind(ent.period_start)
    .bind(ent.period_end)
    .bind(ent.version)
    .execute(&mut **tx)
    .await
    .map_err(unavailable)?;

    Ok(result.rows_affected() == 1)
}

async fn insert_generation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &GenerationRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO generation_records (id, user_id, input_digest, input_bytes, status, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(&record.input_digest)
    .bind(record.input_bytes)
    .bind(record.status.as_str())
    .bind(record.created_at)
    .execute(&mut **tx)
    .await
    .map_err(unavailable)?;
    Ok(())
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn load_entitlement(&self, user_id: Uuid) -> Result<Option<Entitlement>, StoreError> {
        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM entitlements WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(unavailable)?;

        row.map(EntitlementRow::into_domain).transpose()
    }

    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<Entitlement>, StoreError> {
        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM entitlements WHERE subscription_ref = $1"
        ))
        .bind(subscription_ref)
        .fetch_optional(&*self.pool)
        .await
        .map_err(unavailable)?;

        row.map(EntitlementRow::into_domain).transpose()
    }

    async fn create_entitlement(&self, ent: &Entitlement) -> Result<Commit, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO entitlements
                (user_id, plan, quota_limit, quota_used, status, subscription_ref,
                 period_start, period_end, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9 + 1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(ent.user_id)
        .bind(ent.plan.to_string())
        .bind(ent.quota_limit)
        .bind(ent.quota_used)
        .bind(ent.status.as_str())
        .bind(&ent.subscription_ref)
        .bind(ent.period_start)
        .bind(ent.period_end)
        .bind(ent.version)
        .execute(&*self.pool)
        .await
        .map_err(unavailable)?;

        Ok(if result.rows_affected() == 1 {
            Commit::Applied
        } else {
            Commit::Conflict
        })
    }

    async fn seen_event(&self, event_id: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM processed_events WHERE event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(&*self.pool)
        .await
        .map_err(unavailable)
    }

    async fn commit_consume(
        &self,
        ent: &Entitlement,
        record: &GenerationRecord,
    ) -> Result<Commit, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        if !upsert_entitlement(&mut tx, ent).await? {
            tx.rollback().await.map_err(unavailable)?;
            return Ok(Commit::Conflict);
        }
        insert_generation(&mut tx, record).await?;

        tx.commit().await.map_err(unavailable)?;
        Ok(Commit::Applied)
    }

    async fn commit_entitlement(&self, ent: &Entitlement) -> Result<Commit, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let applied = upsert_entitlement(&mut tx, ent).await?;
        if applied {
            tx.commit().await.map_err(unavailable)?;
            Ok(Commit::Applied)
        } else {
            tx.rollback().await.map_err(unavailable)?;
            Ok(Commit::Conflict)
        }
    }

    async fn commit_reconciliation(
        &self,
        event_id: &str,
        ent: Option<&Entitlement>,
    ) -> Result<Commit, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let recorded = sqlx::query(
            "INSERT INTO processed_events (event_id) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await.map_err(unavailable)?;
            return Ok(Commit::Duplicate);
        }

        if let Some(ent) = ent {
            if !upsert_entitlement(&mut tx, ent).await? {
                tx.rollback().await.map_err(unavailable)?;
                return Ok(Commit::Conflict);
            }
        }

        tx.commit().await.map_err(unavailable)?;
        Ok(Commit::Applied)
    }

    async fn load_generation(
        &self,
        record_id: Uuid,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        let row = sqlx::query_as::<_, GenerationRow>(
            "SELECT id, user_id, input_digest, input_bytes, status, created_at
             FROM generation_records WHERE id = $1",
        )
        .bind(record_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(unavailable)?;

        row.map(GenerationRow::into_domain).transpose()
    }

    async fn complete_generation(&self, record_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE generation_records SET status = 'completed' WHERE id = $1 AND status = 'pending'")
            .bind(record_id)
            .execute(&*self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn commit_compensation(
        &self,
        ent: &Entitlement,
        record: &GenerationRecord,
    ) -> Result<Commit, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        // the record row serializes concurrent compensations
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM generation_records WHERE id = $1 FOR UPDATE",
        )
        .bind(record.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unavailable)?;

        match status.as_deref() {
            None => {
                tx.rollback().await.map_err(unavailable)?;
                return Ok(Commit::Conflict);
            }
            Some("failed") => {
                tx.rollback().await.map_err(unavailable)?;
                return Ok(Commit::Duplicate);
            }
            Some(_) => {}
        }

        sqlx::query("UPDATE generation_records SET status = 'failed' WHERE id = $1")
            .bind(record.id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        if !upsert_entitlement(&mut tx, ent).await? {
            tx.rollback().await.map_err(unavailable)?;
            return Ok(Commit::Conflict);
        }

        tx.commit().await.map_err(unavailable)?;
        Ok(Commit::Applied)
    }

    async fn list_generations(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        let rows = sqlx::query_as::<_, GenerationRow>(
            "SELECT id, user_id, input_digest, input_bytes, status, created_at
             FROM generation_records WHERE user_id = $1
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter().map(GenerationRow::into_domain).collect()
    }
}
