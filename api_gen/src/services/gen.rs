use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use common::error::{AppError, Res};
use gen_ai::ContentGenerator;
use ledger::{
    ConsumeOutcome, GenerationInput, LedgerStore, PlanPolicy, compensate, try_consume,
};

use crate::dtos::r#gen::{GenerateResponse, HistoryEntry, QuotaInfo};

fn digest(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Runs one generation for the caller: consume a unit of quota, invoke
/// the generator, and settle the generation record either way. A failed
/// generator call refunds the unit before the error is surfaced.
pub(crate) async fn run_generation(
    store: &dyn LedgerStore,
    generator: &dyn ContentGenerator,
    policy: &PlanPolicy,
    user_id: Uuid,
    text: &str,
) -> Res<GenerateResponse> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("No content provided".to_string()));
    }

    let input = GenerationInput {
        digest: digest(text),
        bytes: text.len() as i64,
    };

    let (entitlement, record) =
        match try_consume(store, policy, user_id, &input, Utc::now()).await? {
            ConsumeOutcome::Allowed {
                entitlement,
                record,
            } => (entitlement, record),
            ConsumeOutcome::Denied { entitlement } => {
                return Err(AppError::TooManyRequests(format!(
                    "Quota exceeded: {}/{} generations used this period. Upgrade your plan for unlimited generations.",
                    entitlement.quota_used, entitlement.quota_limit
                )));
            }
        };

    match generator.repurpose(text).await {
        Ok(content) => {
            store.complete_generation(record.id).await?;
            Ok(GenerateResponse {
                content,
                quota: QuotaInfo::from(&entitlement),
            })
        }
        Err(gen_err) => {
            // refund the consumed unit; an unrefunded failure would be
            // a quota leak, so a compensation error is logged loudly
            if let Err(comp_err) = compensate(store, user_id, record.id).await {
                log::error!(
                    "compensation failed for record {} of user {}: {}",
                    record.id,
                    user_id,
                    comp_err
                );
            }
            Err(AppError::from(gen_err))
        }
    }
}

pub(crate) async fn generation_history(
    store: &dyn LedgerStore,
    user_id: Uuid,
    limit: i64,
) -> Res<Vec<HistoryEntry>> {
    let records = store.list_generations(user_id, limit).await?;
    Ok(records.into_iter().map(HistoryEntry::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gen_ai::MockGenerator;
    use ledger::{Entitlement, GenerationStatus, MemoryLedger};

    async fn seed(store: &MemoryLedger, limit: i64, used: i64) -> Uuid {
        let user_id = Uuid::new_v4();
        // seed in the current period: run_generation consumes against
        // Utc::now(), and a stale period would roll over and wipe the
        // seeded usage
        let now = Utc::now();
        let mut ent = Entitlement::free_default(user_id, limit, now);
        ent.quota_used = used;
        store.create_entitlement(&ent).await.unwrap();
        user_id
    }

    #[tokio::test]
    async fn generation_consumes_and_completes() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 0).await;
        let generator = MockGenerator::new();

        let response = run_generation(
            &store,
            &generator,
            &PlanPolicy::default(),
            user_id,
            "a blog post",
        )
        .await
        .unwrap();

        assert_eq!(response.quota.used, 1);
        assert_eq!(response.quota.remaining, Some(19));
        assert!(response.content.social.contains("a blog post"));

        let records = store.list_generations(user_id, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, GenerationStatus::Completed);
    }

    #[tokio::test]
    async fn generator_failure_refunds_quota() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 1).await;
        let generator = MockGenerator::failing();

        let result = run_generation(
            &store,
            &generator,
            &PlanPolicy::default(),
            user_id,
            "a blog post",
        )
        .await;
        assert!(matches!(result, Err(AppError::Upstream(_))));

        let ent = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(ent.quota_used, 1);
        let records = store.list_generations(user_id, 10).await.unwrap();
        assert_eq!(records[0].status, GenerationStatus::Failed);
    }

    #[tokio::test]
    async fn exhausted_quota_is_a_429() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 20).await;
        let generator = MockGenerator::new();

        let result = run_generation(
            &store,
            &generator,
            &PlanPolicy::default(),
            user_id,
            "a blog post",
        )
        .await;
        assert!(matches!(result, Err(AppError::TooManyRequests(_))));

        let ent = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(ent.quota_used, 20);
    }

    #[tokio::test]
    async fn empty_input_is_a_400_without_consumption() {
        let store = MemoryLedger::new();
        let user_id = seed(&store, 20, 0).await;
        let generator = MockGenerator::new();

        let result = run_generation(
            &store,
            &generator,
            &PlanPolicy::default(),
            user_id,
            "   ",
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let ent = store.load_entitlement(user_id).await.unwrap().unwrap();
        assert_eq!(ent.quota_used, 0);
    }
}
