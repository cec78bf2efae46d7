use chrono::{DateTime, Utc};
use gen_ai::RepurposedContent;
use ledger::{Entitlement, GenerationRecord, GenerationStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Source text to repurpose.
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct QuotaInfo {
    pub used: i64,
    /// -1 means unlimited.
    pub limit: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
}

impl From<&Entitlement> for QuotaInfo {
    fn from(ent: &Entitlement) -> Self {
        QuotaInfo {
            used: ent.quota_used,
            limit: ent.quota_limit,
            remaining: ent.remaining(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    #[serde(flatten)]
    pub content: RepurposedContent,
    pub quota: QuotaInfo,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: GenerationStatus,
    pub input_bytes: i64,
}

impl From<GenerationRecord> for HistoryEntry {
    fn from(record: GenerationRecord) -> Self {
        HistoryEntry {
            id: record.id,
            created_at: record.created_at,
            status: record.status,
            input_bytes: record.input_bytes,
        }
    }
}
