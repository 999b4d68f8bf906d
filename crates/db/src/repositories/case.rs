use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use incentive_core::domain::case::{Case, CaseId, CaseSignal, IncentiveStatus, Tagging};
use incentive_core::domain::deviation::ProposedMapping;
use incentive_core::domain::employee::EmployeeCode;

use super::{
    location_columns, optional_text, parse_column, text, CaseRepository, RepositoryError,
};
use crate::DbPool;

const CASE_COLUMNS: &str = "id, customer_name, product, loan_amount, state, area, branch,
    rm_code, bm_code, bcm_code, cso_code, incentive_status, application_status, channel,
    login_date, disbursal_date";

pub struct SqlCaseRepository {
    pool: DbPool,
}

impl SqlCaseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::from_str(value).map_err(|e| RepositoryError::Decode(format!("date `{value}`: {e}")))
}

fn code_column(row: &SqliteRow, column: &str) -> Result<Option<EmployeeCode>, RepositoryError> {
    Ok(optional_text(row, column)?.map(EmployeeCode::new))
}

fn row_to_case(row: &SqliteRow) -> Result<Case, RepositoryError> {
    let amount = text(row, "loan_amount")?;
    let loan_amount = Decimal::from_str(&amount)
        .map_err(|e| RepositoryError::Decode(format!("loan_amount `{amount}`: {e}")))?;

    Ok(Case {
        id: CaseId::new(text(row, "id")?),
        customer_name: text(row, "customer_name")?,
        product: text(row, "product")?,
        loan_amount,
        location: location_columns(row)?,
        tagging: Tagging {
            rm: code_column(row, "rm_code")?,
            bm: code_column(row, "bm_code")?,
            bcm: code_column(row, "bcm_code")?,
            cso: code_column(row, "cso_code")?,
        },
        incentive_status: parse_column(row, "incentive_status")?,
        application_status: parse_column(row, "application_status")?,
        channel: parse_column(row, "channel")?,
        login_date: parse_date(&text(row, "login_date")?)?,
        disbursal_date: optional_text(row, "disbursal_date")?
            .as_deref()
            .map(parse_date)
            .transpose()?,
    })
}

fn code_param(code: &Option<EmployeeCode>) -> Option<&str> {
    code.as_ref().map(EmployeeCode::as_str)
}

#[async_trait::async_trait]
impl CaseRepository for SqlCaseRepository {
    async fn find_by_id(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CASE_COLUMNS} FROM loan_case WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_case).transpose()
    }

    async fn save(&self, case: Case) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO loan_case (id, customer_name, product, loan_amount, state, area, branch,
                                    rm_code, bm_code, bcm_code, cso_code, incentive_status,
                                    application_status, channel, login_date, disbursal_date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 customer_name = excluded.customer_name,
                 product = excluded.product,
                 loan_amount = excluded.loan_amount,
                 state = excluded.state,
                 area = excluded.area,
                 branch = excluded.branch,
                 rm_code = excluded.rm_code,
                 bm_code = excluded.bm_code,
                 bcm_code = excluded.bcm_code,
                 cso_code = excluded.cso_code,
                 incentive_status = excluded.incentive_status,
                 application_status = excluded.application_status,
                 channel = excluded.channel,
                 login_date = excluded.login_date,
                 disbursal_date = excluded.disbursal_date",
        )
        .bind(&case.id.0)
        .bind(&case.customer_name)
        .bind(&case.product)
        .bind(case.loan_amount.to_string())
        .bind(&case.location.state)
        .bind(&case.location.area)
        .bind(&case.location.branch)
        .bind(code_param(&case.tagging.rm))
        .bind(code_param(&case.tagging.bm))
        .bind(code_param(&case.tagging.bcm))
        .bind(code_param(&case.tagging.cso))
        .bind(case.incentive_status.as_str())
        .bind(case.application_status.as_str())
        .bind(case.channel.as_str())
        .bind(case.login_date.to_string())
        .bind(case.disbursal_date.map(|date| date.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Case>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {CASE_COLUMNS} FROM loan_case ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_case).collect()
    }
}

/// Applies one workflow signal on `conn`, which is usually an open
/// transaction. An unknown case is `NotFound`.
pub(crate) async fn apply_case_signal(
    conn: &mut SqliteConnection,
    signal: &CaseSignal,
) -> Result<(), RepositoryError> {
    let affected = match signal {
        CaseSignal::MarkUnderDeviation { case_id } => {
            update_status(conn, case_id, IncentiveStatus::UnderDeviation).await?
        }
        CaseSignal::RestoreEligibility { case_id } => {
            update_status(conn, case_id, IncentiveStatus::Eligible).await?
        }
        CaseSignal::ApplyTagging { case_id, mapping } => {
            // Unproposed slots keep their current code.
            let (first_column, second_column, first, second) = match mapping {
                ProposedMapping::Business { proposed_rm, proposed_bm } => {
                    ("rm_code", "bm_code", proposed_rm, proposed_bm)
                }
                ProposedMapping::Credit { proposed_bcm, proposed_cso } => {
                    ("bcm_code", "cso_code", proposed_bcm, proposed_cso)
                }
            };
            sqlx::query(&format!(
                "UPDATE loan_case
                 SET {first_column} = COALESCE(?, {first_column}),
                     {second_column} = COALESCE(?, {second_column})
                 WHERE id = ?"
            ))
            .bind(code_param(first))
            .bind(code_param(second))
            .bind(&case_id.0)
            .execute(&mut *conn)
            .await?
            .rows_affected()
        }
    };

    if affected == 0 {
        return Err(RepositoryError::NotFound { entity: "case", id: signal.case_id().0.clone() });
    }
    Ok(())
}

async fn update_status(
    conn: &mut SqliteConnection,
    case_id: &CaseId,
    status: IncentiveStatus,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query("UPDATE loan_case SET incentive_status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(&case_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
