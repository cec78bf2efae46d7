use chrono::{DateTime, Utc};
use ledger::{GenerationRecord, GenerationStatus, StoreError};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GenerationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub input_digest: String,
    pub input_bytes: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl GenerationRow {
    pub fn into_domain(self) -> Result<GenerationRecord, StoreError> {
        let status = GenerationStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Unavailable(format!(
                "unknown generation status '{}' on record {}",
                self.status, self.id
            ))
        })?;
        Ok(GenerationRecord {
            id: self.id,
            user_id: self.user_id,
            input_digest: self.input_digest,
            input_bytes: self.input_bytes,
            created_at: self.created_at,
            status,
        })
    }
}
