use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use incentive_core::audit::AuditEvent;
use incentive_core::domain::case::{Case, CaseId, CaseSignal};
use incentive_core::domain::deviation::{Deviation, DeviationId, DeviationStatus, Hierarchy};
use incentive_core::domain::employee::{Employee, EmployeeCode};

use super::{
    AuditEventRepository, CaseRepository, DeviationRepository, EmployeeRepository,
    RepositoryError,
};

fn employee_key(code: &EmployeeCode) -> String {
    code.as_str().trim().to_ascii_lowercase()
}

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    employees: RwLock<HashMap<String, Employee>>,
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn find_by_code(&self, code: &EmployeeCode) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(&employee_key(code)).cloned())
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee_key(&employee.code), employee);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        let mut all: Vec<Employee> = employees.values().cloned().collect();
        all.sort_by(|left, right| left.code.cmp(&right.code));
        Ok(all)
    }

    async fn list_by_branch(&self, branch: &str) -> Result<Vec<Employee>, RepositoryError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|employee| employee.location.in_branch(branch))
            .collect())
    }
}

type CaseStore = Arc<RwLock<HashMap<String, Case>>>;

#[derive(Default)]
pub struct InMemoryCaseRepository {
    cases: CaseStore,
}

#[async_trait::async_trait]
impl CaseRepository for InMemoryCaseRepository {
    async fn find_by_id(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        let cases = self.cases.read().await;
        Ok(cases.get(&id.0).cloned())
    }

    async fn save(&self, case: Case) -> Result<(), RepositoryError> {
        let mut cases = self.cases.write().await;
        cases.insert(case.id.0.clone(), case);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Case>, RepositoryError> {
        let cases = self.cases.read().await;
        let mut all: Vec<Case> = cases.values().cloned().collect();
        all.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(all)
    }
}

fn ensure_cases_exist(
    cases: &HashMap<String, Case>,
    signals: &[CaseSignal],
) -> Result<(), RepositoryError> {
    match signals.iter().find(|signal| !cases.contains_key(&signal.case_id().0)) {
        Some(signal) => {
            Err(RepositoryError::NotFound { entity: "case", id: signal.case_id().0.clone() })
        }
        None => Ok(()),
    }
}

fn apply_signals(cases: &mut HashMap<String, Case>, signals: &[CaseSignal]) {
    for signal in signals {
        if let Some(case) = cases.get_mut(&signal.case_id().0) {
            case.apply_signal(signal);
        }
    }
}

/// Deviations plus the case store their signals write to. Both maps are
/// locked for a raise or resolve, deviations first.
#[derive(Default)]
pub struct InMemoryDeviationRepository {
    deviations: RwLock<HashMap<String, Deviation>>,
    cases: CaseStore,
}

impl InMemoryDeviationRepository {
    /// Writes case signals into the store behind `cases`.
    pub fn sharing_cases(cases: &InMemoryCaseRepository) -> Self {
        Self { deviations: RwLock::default(), cases: Arc::clone(&cases.cases) }
    }
}

#[async_trait::async_trait]
impl DeviationRepository for InMemoryDeviationRepository {
    async fn find_by_id(&self, id: &DeviationId) -> Result<Option<Deviation>, RepositoryError> {
        let deviations = self.deviations.read().await;
        Ok(deviations.get(&id.0).cloned())
    }

    async fn raise(
        &self,
        deviation: Deviation,
        signals: &[CaseSignal],
    ) -> Result<(), RepositoryError> {
        let mut deviations = self.deviations.write().await;
        let mut cases = self.cases.write().await;
        let open_exists = deviations.values().any(|existing| {
            existing.is_open()
                && existing.case_id == deviation.case_id
                && existing.hierarchy == deviation.hierarchy
        });
        if open_exists && deviation.is_open() {
            return Err(RepositoryError::Conflict(format!(
                "case {} already has an open {} deviation",
                deviation.case_id.0,
                deviation.hierarchy.as_str()
            )));
        }
        if deviations.contains_key(&deviation.id.0) {
            return Err(RepositoryError::Conflict(format!(
                "deviation {} already exists",
                deviation.id.0
            )));
        }
        ensure_cases_exist(&cases, signals)?;
        deviations.insert(deviation.id.0.clone(), deviation);
        apply_signals(&mut cases, signals);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Deviation>, RepositoryError> {
        let deviations = self.deviations.read().await;
        let mut all: Vec<Deviation> = deviations.values().cloned().collect();
        all.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(all)
    }

    async fn list_for_case(&self, case_id: &CaseId) -> Result<Vec<Deviation>, RepositoryError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|deviation| &deviation.case_id == case_id)
            .collect())
    }

    async fn find_open_for_case(
        &self,
        case_id: &CaseId,
        hierarchy: Hierarchy,
    ) -> Result<Option<Deviation>, RepositoryError> {
        let deviations = self.deviations.read().await;
        Ok(deviations
            .values()
            .find(|deviation| {
                deviation.is_open()
                    && &deviation.case_id == case_id
                    && deviation.hierarchy == hierarchy
            })
            .cloned())
    }

    async fn resolve(
        &self,
        resolved: &Deviation,
        expected: DeviationStatus,
        signals: &[CaseSignal],
    ) -> Result<(), RepositoryError> {
        let mut deviations = self.deviations.write().await;
        let mut cases = self.cases.write().await;
        match deviations.get_mut(&resolved.id.0) {
            Some(stored) if stored.status == expected => {
                ensure_cases_exist(&cases, signals)?;
                *stored = resolved.clone();
                apply_signals(&mut cases, signals);
                Ok(())
            }
            _ => Err(RepositoryError::Conflict(format!(
                "deviation {} is no longer {}",
                resolved.id.0,
                expected.as_str()
            ))),
        }
    }
}

#[derive(Default)]
pub struct InMemoryAuditEventRepository {
    events: RwLock<Vec<AuditEvent>>,
}

#[async_trait::async_trait]
impl AuditEventRepository for InMemoryAuditEventRepository {
    async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn list_for_deviation(
        &self,
        deviation_id: &DeviationId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| event.deviation_id.as_ref() == Some(deviation_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use incentive_core::domain::case::{CaseId, CaseSignal, IncentiveStatus};
    use incentive_core::domain::deviation::DeviationStatus;
    use incentive_core::domain::employee::{Employee, EmployeeCode, Location};

    use crate::repositories::test_support::{resolved, sample_case, sample_deviation};
    use crate::repositories::{
        CaseRepository, DeviationRepository, EmployeeRepository, InMemoryCaseRepository,
        InMemoryDeviationRepository, InMemoryEmployeeRepository, RepositoryError,
    };

    #[tokio::test]
    async fn in_memory_employee_lookup_ignores_case() {
        let repo = InMemoryEmployeeRepository::default();
        let employee = Employee::new(
            "BM01",
            "Meera Shah",
            "Branch Manager",
            Location::new("Maharashtra", "Pune", "Pune Camp"),
        );
        repo.save(employee.clone()).await.expect("save");

        let found = repo.find_by_code(&EmployeeCode::new(" bm01 ")).await.expect("find");
        assert_eq!(found, Some(employee));
        assert_eq!(repo.list_by_branch("PUNE CAMP").await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn raise_and_resolve_write_through_to_shared_cases() {
        let cases = InMemoryCaseRepository::default();
        let deviations = InMemoryDeviationRepository::sharing_cases(&cases);
        let case = sample_case("LN-1");
        cases.save(case.clone()).await.expect("save");

        let pending = sample_deviation("DEV-1", "LN-1");
        deviations
            .raise(pending.clone(), &[CaseSignal::MarkUnderDeviation { case_id: case.id.clone() }])
            .await
            .expect("raise");
        let stored = cases.find_by_id(&case.id).await.expect("find").expect("present");
        assert_eq!(stored.incentive_status, IncentiveStatus::UnderDeviation);

        let approved = resolved(pending.clone(), DeviationStatus::Approved, "NBH01");
        deviations
            .resolve(
                &approved,
                DeviationStatus::Pending,
                &[
                    CaseSignal::ApplyTagging {
                        case_id: case.id.clone(),
                        mapping: pending.proposed.clone(),
                    },
                    CaseSignal::RestoreEligibility { case_id: case.id.clone() },
                ],
            )
            .await
            .expect("resolve");
        let stored = cases.find_by_id(&case.id).await.expect("find").expect("present");
        assert_eq!(stored.tagging.rm, Some(EmployeeCode::new("RM09")));
        assert_eq!(stored.incentive_status, IncentiveStatus::Eligible);
    }

    #[tokio::test]
    async fn unknown_case_leaves_the_deviation_untouched() {
        let deviations = InMemoryDeviationRepository::default();
        let restore = [CaseSignal::RestoreEligibility { case_id: CaseId::new("LN-404") }];

        let raised = deviations.raise(sample_deviation("DEV-1", "LN-404"), &restore).await;
        assert!(matches!(raised, Err(RepositoryError::NotFound { entity: "case", .. })));
        assert!(deviations.list().await.expect("list").is_empty());

        let pending = sample_deviation("DEV-2", "LN-404");
        deviations.raise(pending.clone(), &[]).await.expect("raise without signals");
        let approved = resolved(pending.clone(), DeviationStatus::Approved, "NBH01");
        let failed = deviations.resolve(&approved, DeviationStatus::Pending, &restore).await;
        assert!(matches!(failed, Err(RepositoryError::NotFound { .. })));
        let stored = deviations.find_by_id(&pending.id).await.expect("find").expect("present");
        assert_eq!(stored.status, DeviationStatus::Pending);
    }

    #[tokio::test]
    async fn in_memory_deviation_rejects_duplicate_open_raise() {
        let repo = InMemoryDeviationRepository::default();
        repo.raise(sample_deviation("DEV-1", "LN-1"), &[]).await.expect("raise");

        let duplicate = repo.raise(sample_deviation("DEV-2", "LN-1"), &[]).await;
        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn concurrent_resolutions_have_a_single_winner() {
        let repo = Arc::new(InMemoryDeviationRepository::default());
        let pending = sample_deviation("DEV-1", "LN-1");
        repo.raise(pending.clone(), &[]).await.expect("raise");

        let approve = {
            let repo = Arc::clone(&repo);
            let approved = resolved(pending.clone(), DeviationStatus::Approved, "NBH01");
            tokio::spawn(
                async move { repo.resolve(&approved, DeviationStatus::Pending, &[]).await },
            )
        };
        let reject = {
            let repo = Arc::clone(&repo);
            let rejected = resolved(pending.clone(), DeviationStatus::Rejected, "NBH02");
            tokio::spawn(
                async move { repo.resolve(&rejected, DeviationStatus::Pending, &[]).await },
            )
        };

        let outcomes = [approve.await.expect("join"), reject.await.expect("join")];
        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(RepositoryError::Conflict(_)))));

        let stored = repo.find_by_id(&pending.id).await.expect("find").expect("present");
        assert!(stored.status.is_terminal());
    }
}
