use sqlx::sqlite::SqliteRow;

use incentive_core::domain::employee::{Employee, EmployeeCode, PermissionGrants};
use incentive_core::roles::Role;

use super::{location_columns, optional_text, text, EmployeeRepository, RepositoryError};
use crate::DbPool;

const EMPLOYEE_COLUMNS: &str = "code, name, designation, role, grants_json, state, area, branch";

pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_employee(row: &SqliteRow) -> Result<Employee, RepositoryError> {
    let role = optional_text(row, "role")?
        .map(|value| value.parse::<Role>())
        .transpose()
        .map_err(RepositoryError::Decode)?;
    let grants: PermissionGrants = serde_json::from_str(&text(row, "grants_json")?)
        .map_err(|e| RepositoryError::Decode(format!("grants_json: {e}")))?;

    Ok(Employee {
        code: EmployeeCode::new(text(row, "code")?),
        name: text(row, "name")?,
        designation: text(row, "designation")?,
        role,
        grants,
        location: location_columns(row)?,
    })
}

#[async_trait::async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn find_by_code(&self, code: &EmployeeCode) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE code = ? COLLATE NOCASE"
        ))
        .bind(code.as_str().trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_employee).transpose()
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        let grants_json = serde_json::to_string(&employee.grants)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO employee (code, name, designation, role, grants_json, state, area, branch)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET
                 name = excluded.name,
                 designation = excluded.designation,
                 role = excluded.role,
                 grants_json = excluded.grants_json,
                 state = excluded.state,
                 area = excluded.area,
                 branch = excluded.branch",
        )
        .bind(employee.code.as_str())
        .bind(&employee.name)
        .bind(&employee.designation)
        .bind(employee.role.map(|role| role.as_str()))
        .bind(grants_json)
        .bind(&employee.location.state)
        .bind(&employee.location.area)
        .bind(&employee.location.branch)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Employee>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employee ORDER BY code"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_employee).collect()
    }

    async fn list_by_branch(&self, branch: &str) -> Result<Vec<Employee>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employee
             WHERE TRIM(branch) = TRIM(?) COLLATE NOCASE
             ORDER BY code"
        ))
        .bind(branch)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_employee).collect()
    }
}

#[cfg(test)]
mod tests {
    use incentive_core::domain::employee::{Employee, EmployeeCode, Location, PermissionGrants};
    use incentive_core::roles::Role;

    use super::SqlEmployeeRepository;
    use crate::repositories::test_support::setup;
    use crate::repositories::EmployeeRepository;

    fn employee(code: &str, designation: &str, branch: &str) -> Employee {
        Employee::new(code, "Test Employee", designation, Location::new("Maharashtra", "Pune", branch))
    }

    #[tokio::test]
    async fn save_and_find_is_case_insensitive_on_code() {
        let repo = SqlEmployeeRepository::new(setup().await);
        let saved = employee("RM01", "Relationship Manager", "Pune Camp")
            .with_grants(PermissionGrants::from_permissions(["view_branch"]));
        repo.save(saved.clone()).await.expect("save");

        let found = repo.find_by_code(&EmployeeCode::new("rm01")).await.expect("find");
        assert_eq!(found, Some(saved));
    }

    #[tokio::test]
    async fn explicit_role_survives_round_trip_and_upsert() {
        let repo = SqlEmployeeRepository::new(setup().await);
        repo.save(employee("OPS1", "Analyst", "Pune Camp")).await.expect("save");
        repo.save(employee("OPS1", "Analyst", "Pune Camp").with_role(Role::CentralOps))
            .await
            .expect("upsert");

        let found = repo
            .find_by_code(&EmployeeCode::new("OPS1"))
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found.role, Some(Role::CentralOps));
        assert_eq!(repo.list().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn list_by_branch_only_returns_that_branch() {
        let repo = SqlEmployeeRepository::new(setup().await);
        repo.save(employee("RM01", "Relationship Manager", "Pune Camp")).await.expect("save");
        repo.save(employee("RM02", "Relationship Manager", "Kothrud")).await.expect("save");
        repo.save(employee("BM01", "Branch Manager", "Pune Camp")).await.expect("save");

        let camp = repo.list_by_branch("pune camp").await.expect("list");
        let codes: Vec<&str> = camp.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["BM01", "RM01"]);
    }
}
