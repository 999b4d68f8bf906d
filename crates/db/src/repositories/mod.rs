use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use incentive_core::audit::AuditEvent;
use incentive_core::domain::case::{Case, CaseId, CaseSignal};
use incentive_core::domain::deviation::{Deviation, DeviationId, DeviationStatus, Hierarchy};
use incentive_core::domain::employee::{Employee, EmployeeCode, Location};

pub mod audit;
pub mod case;
pub mod deviation;
pub mod employee;
pub mod memory;

pub use audit::SqlAuditEventRepository;
pub use case::SqlCaseRepository;
pub use deviation::SqlDeviationRepository;
pub use employee::SqlEmployeeRepository;
pub use memory::{
    InMemoryAuditEventRepository, InMemoryCaseRepository, InMemoryDeviationRepository,
    InMemoryEmployeeRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// A guarded write lost to a concurrent writer or hit a uniqueness guard.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A case signal named a case that is not stored. The write it belonged
    /// to is rolled back.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn find_by_code(&self, code: &EmployeeCode) -> Result<Option<Employee>, RepositoryError>;
    async fn save(&self, employee: Employee) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<Employee>, RepositoryError>;
    async fn list_by_branch(&self, branch: &str) -> Result<Vec<Employee>, RepositoryError>;
}

#[async_trait]
pub trait CaseRepository: Send + Sync {
    async fn find_by_id(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError>;
    async fn save(&self, case: Case) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<Case>, RepositoryError>;
}

#[async_trait]
pub trait DeviationRepository: Send + Sync {
    async fn find_by_id(&self, id: &DeviationId) -> Result<Option<Deviation>, RepositoryError>;

    /// Stores a new deviation and applies its case signals in one write.
    /// Fails with `Conflict` when the case already has an open deviation in
    /// the same hierarchy and with `NotFound` when a signal names an unknown
    /// case. A failed raise stores nothing.
    async fn raise(
        &self,
        deviation: Deviation,
        signals: &[CaseSignal],
    ) -> Result<(), RepositoryError>;

    async fn list(&self) -> Result<Vec<Deviation>, RepositoryError>;
    async fn list_for_case(&self, case_id: &CaseId) -> Result<Vec<Deviation>, RepositoryError>;

    async fn find_open_for_case(
        &self,
        case_id: &CaseId,
        hierarchy: Hierarchy,
    ) -> Result<Option<Deviation>, RepositoryError>;

    /// Compare-and-set: persists `resolved` only while the stored status is
    /// still `expected`, and applies `signals` to the case in the same write.
    /// A writer that loses the race gets `Conflict`. On any error neither the
    /// deviation nor the case is changed.
    async fn resolve(
        &self,
        resolved: &Deviation,
        expected: DeviationStatus,
        signals: &[CaseSignal],
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_deviation(
        &self,
        deviation_id: &DeviationId,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}

pub(crate) fn text(row: &SqliteRow, column: &str) -> Result<String, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn optional_text(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<String>, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = String>,
{
    text(row, column)?.parse().map_err(RepositoryError::Decode)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("timestamp `{value}`: {e}")))
}

pub(crate) fn location_columns(row: &SqliteRow) -> Result<Location, RepositoryError> {
    Ok(Location {
        state: optional_text(row, "state")?,
        area: optional_text(row, "area")?,
        branch: optional_text(row, "branch")?,
    })
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use incentive_core::domain::case::{
        ApplicationStatus, Case, CaseId, Channel, IncentiveStatus, Tagging,
    };
    use incentive_core::domain::deviation::{
        Deviation, DeviationId, DeviationStatus, Hierarchy, ProposedMapping,
    };
    use incentive_core::domain::employee::{EmployeeCode, Location};
    use incentive_core::roles::Role;

    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    /// Makes every case update fail until [`restore_case_updates`] runs.
    pub async fn fail_case_updates(pool: &DbPool) {
        sqlx::query(
            "CREATE TRIGGER fail_case_update BEFORE UPDATE ON loan_case
             BEGIN SELECT RAISE(ABORT, 'case store unavailable'); END",
        )
        .execute(pool)
        .await
        .expect("install failing trigger");
    }

    pub async fn restore_case_updates(pool: &DbPool) {
        sqlx::query("DROP TRIGGER fail_case_update")
            .execute(pool)
            .await
            .expect("drop failing trigger");
    }

    pub fn sample_case(id: &str) -> Case {
        Case {
            id: CaseId::new(id),
            customer_name: "Asha Kulkarni".to_string(),
            product: "Home Loan".to_string(),
            loan_amount: Decimal::new(1_000_000, 0),
            location: Location::new("Maharashtra", "Pune", "Pune Camp"),
            tagging: Tagging {
                rm: Some(EmployeeCode::new("RM01")),
                bm: Some(EmployeeCode::new("BM01")),
                bcm: Some(EmployeeCode::new("BCM01")),
                cso: None,
            },
            incentive_status: IncentiveStatus::Eligible,
            application_status: ApplicationStatus::Disbursed,
            channel: Channel::Routed,
            login_date: NaiveDate::from_ymd_opt(2026, 8, 28).expect("date"),
            disbursal_date: NaiveDate::from_ymd_opt(2026, 9, 3),
        }
    }

    pub fn sample_deviation(id: &str, case_id: &str) -> Deviation {
        let created_at = Utc.with_ymd_and_hms(2026, 9, 10, 10, 30, 0).single().expect("timestamp");
        let proposed = ProposedMapping::Business {
            proposed_rm: Some(EmployeeCode::new("RM09")),
            proposed_bm: None,
        };
        Deviation {
            id: DeviationId::new(id),
            case_id: CaseId::new(case_id),
            customer_name: "Asha Kulkarni".to_string(),
            location: Location::new("Maharashtra", "Pune", "Pune Camp"),
            hierarchy: Hierarchy::Business,
            deviation_type: proposed.deviation_type(),
            raised_by: EmployeeCode::new("SHB01"),
            raised_by_role: Role::StateHeadBusiness,
            proposed,
            reason: "Sourced by RM09 before transfer".to_string(),
            eligibility_reason: None,
            supporting_docs: vec!["handover-note.pdf".to_string()],
            status: DeviationStatus::Pending,
            rejection_reason: None,
            approver_comment: None,
            resolved_by: None,
            created_at,
            updated_at: created_at,
            resolved_at: None,
        }
    }

    pub fn resolved(mut deviation: Deviation, status: DeviationStatus, by: &str) -> Deviation {
        let at = deviation.created_at + chrono::Duration::hours(2);
        deviation.status = status;
        deviation.resolved_by = Some(EmployeeCode::new(by));
        deviation.resolved_at = Some(at);
        deviation.updated_at = at;
        deviation
    }
}
