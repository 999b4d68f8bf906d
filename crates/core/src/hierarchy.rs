//! Hierarchical visibility: national → state → area → branch → individual.
//!
//! Scope pins the levels at and above the principal's own position; a selection
//! that contradicts a pinned level is a [`EngineError::ScopeViolation`], never a
//! silent empty result. Below the pinned levels the selection narrows
//! conjunctively. Business and Credit records are partitioned here, so a
//! principal in one chain never receives the other chain's records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::case::Case;
use crate::domain::deviation::{Deviation, Hierarchy};
use crate::domain::employee::{EmployeeCode, Location};
use crate::domain::same_key;
use crate::errors::EngineError;
use crate::permissions::ViewScope;
use crate::principal::Principal;

/// A record placed in the organisation tree.
pub trait ScopedRecord {
    fn location(&self) -> &Location;

    /// Chain the record belongs to; `None` when it is shared by both chains.
    fn hierarchy(&self) -> Option<Hierarchy>;

    /// Employees the record is attributed to, limited to one chain when given.
    fn employee_codes(&self, hierarchy: Option<Hierarchy>) -> Vec<&EmployeeCode>;
}

impl<T: ScopedRecord> ScopedRecord for &T {
    fn location(&self) -> &Location {
        (**self).location()
    }

    fn hierarchy(&self) -> Option<Hierarchy> {
        (**self).hierarchy()
    }

    fn employee_codes(&self, hierarchy: Option<Hierarchy>) -> Vec<&EmployeeCode> {
        (**self).employee_codes(hierarchy)
    }
}

impl ScopedRecord for Case {
    fn location(&self) -> &Location {
        &self.location
    }

    fn hierarchy(&self) -> Option<Hierarchy> {
        None
    }

    fn employee_codes(&self, hierarchy: Option<Hierarchy>) -> Vec<&EmployeeCode> {
        self.tagging.codes(hierarchy)
    }
}

impl ScopedRecord for Deviation {
    fn location(&self) -> &Location {
        &self.location
    }

    fn hierarchy(&self) -> Option<Hierarchy> {
        Some(self.hierarchy)
    }

    fn employee_codes(&self, _hierarchy: Option<Hierarchy>) -> Vec<&EmployeeCode> {
        vec![&self.raised_by]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionLevel {
    State,
    Area,
    Branch,
    Employee,
}

/// Cascading state → area → branch → employee selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    area: Option<String>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    employee: Option<String>,
}

impl Selection {
    /// Builds a selection top-down; empty values are treated as unset.
    pub fn from_parts(
        state: Option<&str>,
        area: Option<&str>,
        branch: Option<&str>,
        employee: Option<&str>,
    ) -> Self {
        let mut selection = Self::default();
        for (level, value) in [
            (SelectionLevel::State, state),
            (SelectionLevel::Area, area),
            (SelectionLevel::Branch, branch),
            (SelectionLevel::Employee, employee),
        ] {
            if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
                selection.set(level, Some(value.to_string()));
            }
        }
        selection
    }

    /// Sets one level and resets every deeper level.
    pub fn narrow(mut self, level: SelectionLevel, value: impl Into<String>) -> Self {
        self.set(level, Some(value.into()));
        self.reset_below(level);
        self
    }

    /// Clears one level and every deeper level.
    pub fn clear(mut self, level: SelectionLevel) -> Self {
        self.set(level, None);
        self.reset_below(level);
        self
    }

    pub fn get(&self, level: SelectionLevel) -> Option<&str> {
        match level {
            SelectionLevel::State => self.state.as_deref(),
            SelectionLevel::Area => self.area.as_deref(),
            SelectionLevel::Branch => self.branch.as_deref(),
            SelectionLevel::Employee => self.employee.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.area.is_none() && self.branch.is_none() && self.employee.is_none()
    }

    fn set(&mut self, level: SelectionLevel, value: Option<String>) {
        match level {
            SelectionLevel::State => self.state = value,
            SelectionLevel::Area => self.area = value,
            SelectionLevel::Branch => self.branch = value,
            SelectionLevel::Employee => self.employee = value,
        }
    }

    fn reset_below(&mut self, level: SelectionLevel) {
        for deeper in [SelectionLevel::Area, SelectionLevel::Branch, SelectionLevel::Employee] {
            if deeper > level {
                self.set(deeper, None);
            }
        }
    }
}

/// Option lists for the cascading selectors, derived from visible records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOptions {
    pub states: Vec<String>,
    pub areas: Vec<String>,
    pub branches: Vec<String>,
    pub employees: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HierarchyFilter;

impl HierarchyFilter {
    /// Records the principal may see under `selection`. Idempotent.
    pub fn visible<R>(
        records: &[R],
        principal: &Principal,
        selection: &Selection,
    ) -> Result<Vec<R>, EngineError>
    where
        R: ScopedRecord + Clone,
    {
        let base = Self::scoped(records, principal)?;
        if principal.capabilities.view_scope == ViewScope::Own {
            return Ok(base.into_iter().cloned().collect());
        }

        Self::check_selection(principal, selection)?;
        let hierarchy = principal.hierarchy();
        Ok(base
            .into_iter()
            .filter(|record| matches_selection(*record, selection, hierarchy))
            .cloned()
            .collect())
    }

    /// Cascading option lists. Each level only offers values consistent with
    /// the parents already chosen.
    pub fn options<R>(
        records: &[R],
        principal: &Principal,
        selection: &Selection,
    ) -> Result<SelectionOptions, EngineError>
    where
        R: ScopedRecord,
    {
        let base = Self::scoped(records, principal)?;
        if principal.capabilities.view_scope != ViewScope::Own {
            Self::check_selection(principal, selection)?;
        }

        let hierarchy = principal.hierarchy();
        let state = selection.get(SelectionLevel::State);
        let area = selection.get(SelectionLevel::Area);
        let branch = selection.get(SelectionLevel::Branch);

        let in_state = |record: &R| state.map_or(true, |value| record.location().in_state(value));
        let in_area = |record: &R| area.map_or(true, |value| record.location().in_area(value));
        let in_branch =
            |record: &R| branch.map_or(true, |value| record.location().in_branch(value));

        let states = distinct(base.iter().filter_map(|record| record.location().state.clone()));
        let areas = distinct(
            base.iter()
                .copied()
                .filter(|record| in_state(*record))
                .filter_map(|record| record.location().area.clone()),
        );
        let branches = distinct(
            base.iter()
                .copied()
                .filter(|record| in_state(*record) && in_area(*record))
                .filter_map(|record| record.location().branch.clone()),
        );
        let employees = distinct(
            base.iter()
                .copied()
                .filter(|record| in_state(*record) && in_area(*record) && in_branch(*record))
                .flat_map(|record| record.employee_codes(hierarchy))
                .map(|code| code.0.clone()),
        );

        Ok(SelectionOptions { states, areas, branches, employees })
    }

    /// Fails when `location` lies outside the principal's scope.
    pub fn ensure_in_scope(principal: &Principal, location: &Location) -> Result<(), EngineError> {
        let home = &principal.home;
        let pinned = |home_value: &Option<String>, value: &Option<String>, level: &str| {
            match (home_value, value) {
                (Some(home_value), Some(value)) if same_key(home_value, value) => Ok(()),
                _ => Err(EngineError::ScopeViolation {
                    reason: format!("record is outside the caller's {level}"),
                }),
            }
        };

        match principal.capabilities.view_scope {
            ViewScope::None => Err(EngineError::ScopeViolation {
                reason: "caller has no visibility scope".to_string(),
            }),
            ViewScope::Own | ViewScope::Branch => pinned(&home.branch, &location.branch, "branch"),
            ViewScope::Area => pinned(&home.area, &location.area, "area"),
            ViewScope::State => pinned(&home.state, &location.state, "state"),
            ViewScope::AllIndia => Ok(()),
        }
    }

    fn scoped<'a, R>(records: &'a [R], principal: &Principal) -> Result<Vec<&'a R>, EngineError>
    where
        R: ScopedRecord,
    {
        let scope = principal.capabilities.view_scope;
        if scope == ViewScope::None {
            return Ok(Vec::new());
        }

        let hierarchy = principal.hierarchy();
        let home = &principal.home;
        Ok(records
            .iter()
            .filter(|record| match (hierarchy, record.hierarchy()) {
                (Some(mine), Some(theirs)) => mine == theirs,
                _ => true,
            })
            .filter(|record| {
                let location = record.location();
                match scope {
                    ViewScope::None => false,
                    ViewScope::Own => record
                        .employee_codes(hierarchy)
                        .iter()
                        .any(|code| code.matches(principal.code.as_str())),
                    ViewScope::Branch => {
                        home.branch.as_deref().is_some_and(|branch| location.in_branch(branch))
                    }
                    ViewScope::Area => {
                        home.area.as_deref().is_some_and(|area| location.in_area(area))
                    }
                    ViewScope::State => {
                        home.state.as_deref().is_some_and(|state| location.in_state(state))
                    }
                    ViewScope::AllIndia => true,
                }
            })
            .collect())
    }

    fn check_selection(principal: &Principal, selection: &Selection) -> Result<(), EngineError> {
        let pinned_levels: &[SelectionLevel] = match principal.capabilities.view_scope {
            ViewScope::Branch => {
                &[SelectionLevel::State, SelectionLevel::Area, SelectionLevel::Branch]
            }
            ViewScope::Area => &[SelectionLevel::State, SelectionLevel::Area],
            ViewScope::State => &[SelectionLevel::State],
            ViewScope::None | ViewScope::Own | ViewScope::AllIndia => &[],
        };

        for level in pinned_levels {
            let home = match level {
                SelectionLevel::State => principal.home.state.as_deref(),
                SelectionLevel::Area => principal.home.area.as_deref(),
                SelectionLevel::Branch => principal.home.branch.as_deref(),
                SelectionLevel::Employee => None,
            };
            if let (Some(home), Some(selected)) = (home, selection.get(*level)) {
                if !same_key(home, selected) {
                    return Err(EngineError::ScopeViolation {
                        reason: format!("selected {level:?} is outside the caller's scope")
                            .to_ascii_lowercase(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn matches_selection<R: ScopedRecord>(
    record: &R,
    selection: &Selection,
    hierarchy: Option<Hierarchy>,
) -> bool {
    let location = record.location();
    selection.get(SelectionLevel::State).map_or(true, |state| location.in_state(state))
        && selection.get(SelectionLevel::Area).map_or(true, |area| location.in_area(area))
        && selection.get(SelectionLevel::Branch).map_or(true, |branch| location.in_branch(branch))
        && selection.get(SelectionLevel::Employee).map_or(true, |employee| {
            record.employee_codes(hierarchy).iter().any(|code| code.matches(employee))
        })
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    values.collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{HierarchyFilter, Selection, SelectionLevel};
    use crate::domain::case::{
        ApplicationStatus, Case, CaseId, Channel, IncentiveStatus, Tagging,
    };
    use crate::domain::deviation::{
        Deviation, DeviationId, DeviationStatus, DeviationType, Hierarchy, ProposedMapping,
    };
    use crate::domain::employee::{Employee, EmployeeCode, Location};
    use crate::errors::EngineError;
    use crate::principal::Principal;
    use crate::roles::Role;

    fn case(id: &str, location: Location, rm: &str, cso: &str) -> Case {
        Case {
            id: CaseId::new(id),
            customer_name: format!("Customer {id}"),
            product: "Home Loan".to_string(),
            loan_amount: Decimal::new(500_000, 0),
            location,
            tagging: Tagging {
                rm: Some(EmployeeCode::new(rm)),
                bm: None,
                bcm: None,
                cso: Some(EmployeeCode::new(cso)),
            },
            incentive_status: IncentiveStatus::Eligible,
            application_status: ApplicationStatus::Login,
            channel: Channel::Routed,
            login_date: NaiveDate::from_ymd_opt(2026, 9, 2).expect("date"),
            disbursal_date: None,
        }
    }

    fn cases() -> Vec<Case> {
        vec![
            case("C1", Location::new("Maharashtra", "Pune", "Pune Camp"), "RM01", "CSO01"),
            case("C2", Location::new("Maharashtra", "Pune", "Hadapsar"), "RM02", "CSO01"),
            case("C3", Location::new("Maharashtra", "Mumbai", "Andheri"), "RM03", "CSO02"),
            case("C4", Location::new("Gujarat", "Ahmedabad", "Navrangpura"), "RM04", "CSO03"),
        ]
    }

    fn principal(code: &str, role: Role, home: Location) -> Principal {
        Principal::with_role(&Employee::new(code, code, "", home), role)
    }

    fn ids(cases: &[Case]) -> Vec<&str> {
        cases.iter().map(|case| case.id.0.as_str()).collect()
    }

    fn deviation(id: &str, hierarchy: Hierarchy, state: &str) -> Deviation {
        let now = Utc::now();
        Deviation {
            id: DeviationId::new(id),
            case_id: CaseId::new("C1"),
            customer_name: "Customer C1".to_string(),
            location: Location::new(state, "Pune", "Pune Camp"),
            hierarchy,
            deviation_type: DeviationType::MappingBusiness,
            raised_by: EmployeeCode::new("SH01"),
            raised_by_role: Role::state_head_for(hierarchy),
            proposed: ProposedMapping::Business { proposed_rm: None, proposed_bm: None },
            reason: "retag".to_string(),
            eligibility_reason: None,
            supporting_docs: Vec::new(),
            status: DeviationStatus::Pending,
            rejection_reason: None,
            approver_comment: None,
            resolved_by: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    #[test]
    fn own_scope_ignores_selection_and_keeps_tagged_records() {
        let rm = principal("RM02", Role::Rm, Location::new("Maharashtra", "Pune", "Hadapsar"));
        let selection = Selection::default().narrow(SelectionLevel::State, "Gujarat");

        let visible = HierarchyFilter::visible(&cases(), &rm, &selection).expect("own scope");
        assert_eq!(ids(&visible), vec!["C2"]);
    }

    #[test]
    fn own_scope_uses_the_principals_chain_only() {
        let cso = principal("CSO01", Role::Cso, Location::default());
        let visible =
            HierarchyFilter::visible(&cases(), &cso, &Selection::default()).expect("own scope");
        assert_eq!(ids(&visible), vec!["C1", "C2"]);

        let rm_named_like_cso = principal("CSO01", Role::Rm, Location::default());
        let visible = HierarchyFilter::visible(&cases(), &rm_named_like_cso, &Selection::default())
            .expect("own scope");
        assert!(visible.is_empty());
    }

    #[test]
    fn branch_scope_narrows_to_employee_within_branch() {
        let bm = principal("BM01", Role::Bm, Location::new("Maharashtra", "Pune", "Pune Camp"));
        let all = HierarchyFilter::visible(&cases(), &bm, &Selection::default()).expect("branch");
        assert_eq!(ids(&all), vec!["C1"]);

        let selection = Selection::default().narrow(SelectionLevel::Employee, "RM02");
        let narrowed = HierarchyFilter::visible(&cases(), &bm, &selection).expect("branch");
        assert!(narrowed.is_empty());
    }

    #[test]
    fn selection_outside_scope_is_a_violation() {
        let sh = principal(
            "SH01",
            Role::StateHeadBusiness,
            Location { state: Some("Maharashtra".to_string()), area: None, branch: None },
        );
        let selection = Selection::default().narrow(SelectionLevel::State, "Gujarat");

        let error = HierarchyFilter::visible(&cases(), &sh, &selection)
            .expect_err("state head cannot browse another state");
        assert!(matches!(error, EngineError::ScopeViolation { .. }));

        let bm = principal("BM01", Role::Bm, Location::new("Maharashtra", "Pune", "Pune Camp"));
        let selection = Selection::from_parts(None, None, Some("Hadapsar"), None);
        assert!(matches!(
            HierarchyFilter::visible(&cases(), &bm, &selection),
            Err(EngineError::ScopeViolation { .. })
        ));
    }

    #[test]
    fn state_scope_cascades_conjunctively() {
        let sh = principal(
            "SH01",
            Role::StateHeadBusiness,
            Location { state: Some("Maharashtra".to_string()), area: None, branch: None },
        );

        let all = HierarchyFilter::visible(&cases(), &sh, &Selection::default()).expect("state");
        assert_eq!(ids(&all), vec!["C1", "C2", "C3"]);

        let pune = Selection::default()
            .narrow(SelectionLevel::State, "maharashtra")
            .narrow(SelectionLevel::Area, "Pune");
        let visible = HierarchyFilter::visible(&cases(), &sh, &pune).expect("state");
        assert_eq!(ids(&visible), vec!["C1", "C2"]);

        let impossible = pune.clone().narrow(SelectionLevel::Branch, "Andheri");
        let visible = HierarchyFilter::visible(&cases(), &sh, &impossible).expect("state");
        assert!(visible.is_empty());
    }

    #[test]
    fn all_india_sees_everything_and_filtering_is_idempotent() {
        let nbh = principal("NBH01", Role::NationalBusinessHead, Location::default());
        let selection = Selection::from_parts(Some("Maharashtra"), None, None, Some("RM03"));

        let once = HierarchyFilter::visible(&cases(), &nbh, &selection).expect("all india");
        let twice = HierarchyFilter::visible(&once, &nbh, &selection).expect("all india");
        assert_eq!(ids(&once), vec!["C3"]);
        assert_eq!(once, twice);

        for (viewer, selection) in [
            (principal("RM01", Role::Rm, Location::default()), Selection::default()),
            (
                principal("BM01", Role::Bm, Location::new("Maharashtra", "Pune", "Pune Camp")),
                Selection::default(),
            ),
            (nbh.clone(), Selection::from_parts(Some("Gujarat"), None, None, None)),
        ] {
            let once = HierarchyFilter::visible(&cases(), &viewer, &selection).expect("visible");
            let twice = HierarchyFilter::visible(&once, &viewer, &selection).expect("visible");
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn unknown_role_sees_nothing() {
        let unknown = principal("X1", Role::Unknown, Location::new("Maharashtra", "Pune", "Pune Camp"));
        let visible =
            HierarchyFilter::visible(&cases(), &unknown, &Selection::default()).expect("empty");
        assert!(visible.is_empty());
    }

    #[test]
    fn deviations_are_partitioned_by_hierarchy() {
        let deviations = vec![
            deviation("D1", Hierarchy::Business, "Maharashtra"),
            deviation("D2", Hierarchy::Credit, "Maharashtra"),
            deviation("D3", Hierarchy::Business, "Gujarat"),
        ];

        let nch = principal("NCH01", Role::NationalCreditHead, Location::default());
        let visible =
            HierarchyFilter::visible(&deviations, &nch, &Selection::default()).expect("credit");
        assert_eq!(visible.iter().map(|d| d.id.0.as_str()).collect::<Vec<_>>(), vec!["D2"]);

        let admin = principal("ADM", Role::Admin, Location::default());
        let visible =
            HierarchyFilter::visible(&deviations, &admin, &Selection::default()).expect("admin");
        assert_eq!(visible.len(), 3);
    }

    #[test]
    fn options_only_offer_values_consistent_with_parents() {
        let nbh = principal("NBH01", Role::NationalBusinessHead, Location::default());
        let selection = Selection::default().narrow(SelectionLevel::State, "Maharashtra");

        let options = HierarchyFilter::options(&cases(), &nbh, &selection).expect("options");
        assert_eq!(options.states, vec!["Gujarat".to_string(), "Maharashtra".to_string()]);
        assert_eq!(options.areas, vec!["Mumbai".to_string(), "Pune".to_string()]);
        assert_eq!(
            options.branches,
            vec!["Andheri".to_string(), "Hadapsar".to_string(), "Pune Camp".to_string()]
        );
        assert_eq!(
            options.employees,
            vec!["RM01".to_string(), "RM02".to_string(), "RM03".to_string()]
        );

        let narrowed = selection.narrow(SelectionLevel::Area, "Pune");
        let options = HierarchyFilter::options(&cases(), &nbh, &narrowed).expect("options");
        assert_eq!(options.branches, vec!["Hadapsar".to_string(), "Pune Camp".to_string()]);
    }

    #[test]
    fn narrowing_a_level_resets_deeper_levels() {
        let selection = Selection::from_parts(
            Some("Maharashtra"),
            Some("Pune"),
            Some("Pune Camp"),
            Some("RM01"),
        );

        let renarrowed = selection.clone().narrow(SelectionLevel::Area, "Mumbai");
        assert_eq!(renarrowed.get(SelectionLevel::State), Some("Maharashtra"));
        assert_eq!(renarrowed.get(SelectionLevel::Area), Some("Mumbai"));
        assert_eq!(renarrowed.get(SelectionLevel::Branch), None);
        assert_eq!(renarrowed.get(SelectionLevel::Employee), None);

        let cleared = selection.clear(SelectionLevel::State);
        assert!(cleared.is_empty());
    }

    #[test]
    fn ensure_in_scope_checks_pinned_level() {
        let sh = principal(
            "SH01",
            Role::StateHeadCredit,
            Location { state: Some("Gujarat".to_string()), area: None, branch: None },
        );
        assert!(HierarchyFilter::ensure_in_scope(
            &sh,
            &Location::new("gujarat", "Ahmedabad", "Navrangpura")
        )
        .is_ok());
        assert!(matches!(
            HierarchyFilter::ensure_in_scope(&sh, &Location::new("Maharashtra", "Pune", "Pune Camp")),
            Err(EngineError::ScopeViolation { .. })
        ));
    }
}
