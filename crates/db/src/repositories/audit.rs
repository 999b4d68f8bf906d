use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;

use incentive_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use incentive_core::domain::case::CaseId;
use incentive_core::domain::deviation::DeviationId;

use super::{optional_text, parse_timestamp, text, AuditEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditEventRepository {
    pool: DbPool,
}

impl SqlAuditEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let category = text(row, "category")?;
    let outcome = text(row, "outcome")?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&text(row, "metadata_json")?)
        .map_err(|e| RepositoryError::Decode(format!("metadata_json: {e}")))?;

    Ok(AuditEvent {
        event_id: text(row, "id")?,
        deviation_id: optional_text(row, "deviation_id")?.map(DeviationId::new),
        case_id: optional_text(row, "case_id")?.map(CaseId::new),
        correlation_id: text(row, "correlation_id")?,
        event_type: text(row, "event_type")?,
        category: AuditCategory::parse(&category)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown category `{category}`")))?,
        actor: text(row, "actor")?,
        outcome: AuditOutcome::parse(&outcome)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown outcome `{outcome}`")))?,
        metadata,
        occurred_at: parse_timestamp(&text(row, "occurred_at")?)?,
    })
}

#[async_trait::async_trait]
impl AuditEventRepository for SqlAuditEventRepository {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event (id, deviation_id, case_id, correlation_id, event_type,
                                      category, actor, outcome, metadata_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.deviation_id.as_ref().map(|id| id.0.as_str()))
        .bind(event.case_id.as_ref().map(|id| id.0.as_str()))
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(&event.actor)
        .bind(event.outcome.as_str())
        .bind(metadata_json)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_deviation(
        &self,
        deviation_id: &DeviationId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, deviation_id, case_id, correlation_id, event_type, category, actor,
                    outcome, metadata_json, occurred_at
             FROM audit_event WHERE deviation_id = ? ORDER BY occurred_at ASC",
        )
        .bind(&deviation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}
