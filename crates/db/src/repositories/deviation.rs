use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use incentive_core::domain::case::{CaseId, CaseSignal};
use incentive_core::domain::deviation::{
    Deviation, DeviationId, DeviationStatus, Hierarchy, ProposedMapping,
};
use incentive_core::domain::employee::EmployeeCode;

use super::case::apply_case_signal;
use super::{
    is_unique_violation, location_columns, optional_text, parse_column, parse_timestamp, text,
    DeviationRepository, RepositoryError,
};
use crate::DbPool;

const DEVIATION_COLUMNS: &str = "id, case_id, customer_name, state, area, branch, hierarchy,
    deviation_type, raised_by, raised_by_role, proposed_mapping_json, reason, eligibility_reason,
    supporting_docs_json, status, rejection_reason, approver_comment, resolved_by, created_at,
    updated_at, resolved_at";

pub struct SqlDeviationRepository {
    pool: DbPool,
}

impl SqlDeviationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_deviation(row: &SqliteRow) -> Result<Deviation, RepositoryError> {
    let proposed: ProposedMapping = serde_json::from_str(&text(row, "proposed_mapping_json")?)
        .map_err(|e| RepositoryError::Decode(format!("proposed_mapping_json: {e}")))?;
    let supporting_docs: Vec<String> = serde_json::from_str(&text(row, "supporting_docs_json")?)
        .map_err(|e| RepositoryError::Decode(format!("supporting_docs_json: {e}")))?;

    Ok(Deviation {
        id: DeviationId::new(text(row, "id")?),
        case_id: CaseId::new(text(row, "case_id")?),
        customer_name: text(row, "customer_name")?,
        location: location_columns(row)?,
        hierarchy: parse_column(row, "hierarchy")?,
        deviation_type: parse_column(row, "deviation_type")?,
        raised_by: EmployeeCode::new(text(row, "raised_by")?),
        raised_by_role: parse_column(row, "raised_by_role")?,
        proposed,
        reason: text(row, "reason")?,
        eligibility_reason: optional_text(row, "eligibility_reason")?,
        supporting_docs,
        status: parse_column(row, "status")?,
        rejection_reason: optional_text(row, "rejection_reason")?,
        approver_comment: optional_text(row, "approver_comment")?,
        resolved_by: optional_text(row, "resolved_by")?.map(EmployeeCode::new),
        created_at: parse_timestamp(&text(row, "created_at")?)?,
        updated_at: parse_timestamp(&text(row, "updated_at")?)?,
        resolved_at: optional_text(row, "resolved_at")?
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
    })
}

#[async_trait::async_trait]
impl DeviationRepository for SqlDeviationRepository {
    async fn find_by_id(&self, id: &DeviationId) -> Result<Option<Deviation>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {DEVIATION_COLUMNS} FROM deviation WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_deviation).transpose()
    }

    async fn raise(
        &self,
        deviation: Deviation,
        signals: &[CaseSignal],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_deviation(&mut tx, &deviation).await?;
        for signal in signals {
            apply_case_signal(&mut tx, signal).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Deviation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DEVIATION_COLUMNS} FROM deviation ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_deviation).collect()
    }

    async fn list_for_case(&self, case_id: &CaseId) -> Result<Vec<Deviation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DEVIATION_COLUMNS} FROM deviation WHERE case_id = ? ORDER BY created_at DESC"
        ))
        .bind(&case_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_deviation).collect()
    }

    async fn find_open_for_case(
        &self,
        case_id: &CaseId,
        hierarchy: Hierarchy,
    ) -> Result<Option<Deviation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DEVIATION_COLUMNS} FROM deviation
             WHERE case_id = ? AND hierarchy = ? AND status = 'pending'"
        ))
        .bind(&case_id.0)
        .bind(hierarchy.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_deviation).transpose()
    }

    async fn resolve(
        &self,
        resolved: &Deviation,
        expected: DeviationStatus,
        signals: &[CaseSignal],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE deviation
             SET status = ?, rejection_reason = ?, approver_comment = ?, resolved_by = ?,
                 resolved_at = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(resolved.status.as_str())
        .bind(&resolved.rejection_reason)
        .bind(&resolved.approver_comment)
        .bind(resolved.resolved_by.as_ref().map(EmployeeCode::as_str))
        .bind(resolved.resolved_at.map(|at| at.to_rfc3339()))
        .bind(resolved.updated_at.to_rfc3339())
        .bind(&resolved.id.0)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "deviation {} is no longer {}",
                resolved.id.0,
                expected.as_str()
            )));
        }
        for signal in signals {
            apply_case_signal(&mut tx, signal).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn insert_deviation(
    conn: &mut SqliteConnection,
    deviation: &Deviation,
) -> Result<(), RepositoryError> {
    let proposed_json = serde_json::to_string(&deviation.proposed)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let docs_json = serde_json::to_string(&deviation.supporting_docs)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let inserted = sqlx::query(
        "INSERT INTO deviation (id, case_id, customer_name, state, area, branch, hierarchy,
                                deviation_type, raised_by, raised_by_role,
                                proposed_mapping_json, reason, eligibility_reason,
                                supporting_docs_json, status, rejection_reason,
                                approver_comment, resolved_by, created_at, updated_at,
                                resolved_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&deviation.id.0)
    .bind(&deviation.case_id.0)
    .bind(&deviation.customer_name)
    .bind(&deviation.location.state)
    .bind(&deviation.location.area)
    .bind(&deviation.location.branch)
    .bind(deviation.hierarchy.as_str())
    .bind(deviation.deviation_type.as_str())
    .bind(deviation.raised_by.as_str())
    .bind(deviation.raised_by_role.as_str())
    .bind(proposed_json)
    .bind(&deviation.reason)
    .bind(&deviation.eligibility_reason)
    .bind(docs_json)
    .bind(deviation.status.as_str())
    .bind(&deviation.rejection_reason)
    .bind(&deviation.approver_comment)
    .bind(deviation.resolved_by.as_ref().map(EmployeeCode::as_str))
    .bind(deviation.created_at.to_rfc3339())
    .bind(deviation.updated_at.to_rfc3339())
    .bind(deviation.resolved_at.map(|at| at.to_rfc3339()))
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => Ok(()),
        Err(error) if is_unique_violation(&error) => Err(RepositoryError::Conflict(format!(
            "case {} already has an open {} deviation",
            deviation.case_id.0,
            deviation.hierarchy.as_str()
        ))),
        Err(error) => Err(error.into()),
    }
}
