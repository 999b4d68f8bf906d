use serde::{Deserialize, Serialize};

use crate::deviations::workflow::WorkflowPolicy;
use crate::domain::deviation::{Deviation, DeviationStatus, DeviationType};
use crate::errors::EngineError;
use crate::hierarchy::{HierarchyFilter, Selection};
use crate::principal::Principal;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationQuery {
    #[serde(default)]
    pub status: Option<DeviationStatus>,
    #[serde(default)]
    pub deviation_type: Option<DeviationType>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub count: usize,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationSummary {
    pub pending_approval: usize,
    pub approved: usize,
    pub rejected: usize,
    pub total_deviations: usize,
}

/// Deviations visible to the caller, filtered and paginated, newest first.
pub fn list(
    deviations: &[Deviation],
    principal: &Principal,
    query: &DeviationQuery,
    policy: &WorkflowPolicy,
) -> Result<Page<Deviation>, EngineError> {
    let mut matching: Vec<Deviation> = inbox(deviations, principal)?
        .into_iter()
        .filter(|deviation| query.status.map_or(true, |status| deviation.status == status))
        .filter(|deviation| {
            query.deviation_type.map_or(true, |kind| deviation.deviation_type == kind)
        })
        .filter(|deviation| {
            query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|term| !term.is_empty())
                .map_or(true, |term| matches_search(deviation, term))
        })
        .collect();
    matching.sort_by(|left, right| {
        right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id))
    });

    let page_size = query
        .page_size
        .filter(|size| *size > 0)
        .unwrap_or(policy.default_page_size)
        .clamp(1, policy.max_page_size.max(1));
    let page = query.page.unwrap_or(1).max(1);
    let count = matching.len();
    let start = (page as usize - 1).saturating_mul(page_size as usize);
    let results: Vec<Deviation> =
        matching.into_iter().skip(start).take(page_size as usize).collect();

    let next = page.checked_add(1).filter(|_| start.saturating_add(results.len()) < count);
    let previous = (page > 1).then_some(page - 1);
    Ok(Page { results, count, next, previous, page, page_size })
}

/// Inbox counters scoped to the caller's hierarchy.
pub fn summarize(
    deviations: &[Deviation],
    principal: &Principal,
) -> Result<DeviationSummary, EngineError> {
    let visible = inbox(deviations, principal)?;
    let count = |status: DeviationStatus| {
        visible.iter().filter(|deviation| deviation.status == status).count()
    };

    Ok(DeviationSummary {
        pending_approval: count(DeviationStatus::Pending),
        approved: count(DeviationStatus::Approved),
        rejected: count(DeviationStatus::Rejected),
        total_deviations: visible.len(),
    })
}

fn inbox(deviations: &[Deviation], principal: &Principal) -> Result<Vec<Deviation>, EngineError> {
    if !principal.capabilities.can_view_deviations {
        return Err(EngineError::ScopeViolation {
            reason: format!("role {} has no deviation inbox", principal.role),
        });
    }
    HierarchyFilter::visible(deviations, principal, &Selection::default())
}

fn matches_search(deviation: &Deviation, term: &str) -> bool {
    let needle = term.to_lowercase();
    [
        deviation.id.0.as_str(),
        deviation.case_id.0.as_str(),
        deviation.customer_name.as_str(),
        deviation.raised_by.as_str(),
        deviation.reason.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{list, summarize, DeviationQuery};
    use crate::deviations::workflow::WorkflowPolicy;
    use crate::domain::case::CaseId;
    use crate::domain::deviation::{
        Deviation, DeviationId, DeviationStatus, DeviationType, Hierarchy, ProposedMapping,
    };
    use crate::domain::employee::{Employee, EmployeeCode, Location};
    use crate::errors::EngineError;
    use crate::principal::Principal;
    use crate::roles::Role;

    fn deviation(
        index: i64,
        hierarchy: Hierarchy,
        status: DeviationStatus,
        state: &str,
        customer: &str,
    ) -> Deviation {
        let created_at = Utc.with_ymd_and_hms(2026, 9, 1, 9, 0, 0).single().expect("timestamp")
            + Duration::hours(index);
        let proposed = match hierarchy {
            Hierarchy::Business => ProposedMapping::Business {
                proposed_rm: Some(EmployeeCode::new("RM09")),
                proposed_bm: None,
            },
            Hierarchy::Credit => ProposedMapping::Credit {
                proposed_bcm: None,
                proposed_cso: Some(EmployeeCode::new("CSO09")),
            },
        };
        Deviation {
            id: DeviationId::new(format!("DEV-{index:03}")),
            case_id: CaseId::new(format!("LN-{index:04}")),
            customer_name: customer.to_owned(),
            location: Location::new(state, "Central", "Main"),
            hierarchy,
            deviation_type: proposed.deviation_type(),
            raised_by: EmployeeCode::new("SH01"),
            raised_by_role: Role::state_head_for(hierarchy),
            proposed,
            reason: "tagging correction".to_owned(),
            eligibility_reason: None,
            supporting_docs: Vec::new(),
            status,
            rejection_reason: None,
            approver_comment: None,
            resolved_by: None,
            created_at,
            updated_at: created_at,
            resolved_at: None,
        }
    }

    fn fixtures() -> Vec<Deviation> {
        use DeviationStatus::{Approved, Pending, Rejected};
        use Hierarchy::{Business, Credit};

        vec![
            deviation(1, Business, Pending, "Maharashtra", "Asha Kulkarni"),
            deviation(2, Business, Approved, "Maharashtra", "Ravi Iyer"),
            deviation(3, Business, Rejected, "Gujarat", "Nisha Patel"),
            deviation(4, Credit, Pending, "Maharashtra", "Kiran Rao"),
            deviation(5, Business, Pending, "Gujarat", "Asha Mehta"),
        ]
    }

    fn principal(role: Role, state: Option<&str>) -> Principal {
        let home = Location { state: state.map(str::to_owned), area: None, branch: None };
        Principal::with_role(&Employee::new("EMP1", "Employee", "", home), role)
    }

    #[test]
    fn summary_is_scoped_to_callers_hierarchy() {
        let nbh = principal(Role::NationalBusinessHead, None);
        let summary = summarize(&fixtures(), &nbh).expect("summary");
        assert_eq!(summary.pending_approval, 2);
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.total_deviations, 4);

        let shb = principal(Role::StateHeadBusiness, Some("Maharashtra"));
        let summary = summarize(&fixtures(), &shb).expect("summary");
        assert_eq!(summary.total_deviations, 2);

        let nch = principal(Role::NationalCreditHead, None);
        assert_eq!(summarize(&fixtures(), &nch).expect("summary").total_deviations, 1);
    }

    #[test]
    fn list_filters_by_status_type_and_search() {
        let nbh = principal(Role::NationalBusinessHead, None);
        let policy = WorkflowPolicy::default();

        let pending = list(
            &fixtures(),
            &nbh,
            &DeviationQuery { status: Some(DeviationStatus::Pending), ..DeviationQuery::default() },
            &policy,
        )
        .expect("list");
        assert_eq!(pending.count, 2);
        assert_eq!(pending.results[0].id.0, "DEV-005", "newest first");

        let searched = list(
            &fixtures(),
            &nbh,
            &DeviationQuery { search: Some("asha".to_owned()), ..DeviationQuery::default() },
            &policy,
        )
        .expect("list");
        assert_eq!(searched.count, 2);

        let credit_typed = list(
            &fixtures(),
            &nbh,
            &DeviationQuery {
                deviation_type: Some(DeviationType::MappingCredit),
                ..DeviationQuery::default()
            },
            &policy,
        )
        .expect("list");
        assert_eq!(credit_typed.count, 0);
    }

    #[test]
    fn pagination_reports_neighbours_and_clamps_page_size() {
        let admin = principal(Role::Admin, None);
        let policy =
            WorkflowPolicy { default_page_size: 2, max_page_size: 3, ..WorkflowPolicy::default() };

        let first = list(&fixtures(), &admin, &DeviationQuery::default(), &policy).expect("page 1");
        assert_eq!(first.count, 5);
        assert_eq!(first.results.len(), 2);
        assert_eq!((first.previous, first.next), (None, Some(2)));

        let last = list(
            &fixtures(),
            &admin,
            &DeviationQuery { page: Some(3), ..DeviationQuery::default() },
            &policy,
        )
        .expect("page 3");
        assert_eq!(last.results.len(), 1);
        assert_eq!((last.previous, last.next), (Some(2), None));

        let oversized = list(
            &fixtures(),
            &admin,
            &DeviationQuery { page_size: Some(500), ..DeviationQuery::default() },
            &policy,
        )
        .expect("clamped");
        assert_eq!(oversized.page_size, 3);
        assert_eq!(oversized.results.len(), 3);
    }

    #[test]
    fn last_representable_page_is_empty_without_a_next_page() {
        let admin = principal(Role::Admin, None);
        let policy =
            WorkflowPolicy { default_page_size: 2, max_page_size: 3, ..WorkflowPolicy::default() };

        let page = list(
            &fixtures(),
            &admin,
            &DeviationQuery { page: Some(u32::MAX), ..DeviationQuery::default() },
            &policy,
        )
        .expect("page beyond the end");
        assert!(page.results.is_empty());
        assert_eq!(page.count, 5);
        assert_eq!(page.page, u32::MAX);
        assert_eq!((page.previous, page.next), (Some(u32::MAX - 1), None));
    }

    #[test]
    fn callers_without_an_inbox_are_refused() {
        let rm = principal(Role::Rm, Some("Maharashtra"));
        assert!(matches!(
            summarize(&fixtures(), &rm),
            Err(EngineError::ScopeViolation { .. })
        ));
    }
}
