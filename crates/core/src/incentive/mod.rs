//! Incentive computation: qualifying case activity → counts and volumes → payouts → tier.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::case::{Case, Channel, IncentiveStatus};
use crate::domain::employee::EmployeeCode;
use crate::domain::incentive::{
    ActivityCounts, ActivityVolumes, BranchIncentive, EffortIncentive, IncentiveBreakdown,
    PerformanceTier, Period, StatusBasis, TeamMemberIncentive, TeamSummary, VolumeIncentive,
};
use crate::domain::same_key;
use crate::errors::EngineError;
use crate::hierarchy::{HierarchyFilter, Selection};
use crate::principal::Principal;
use crate::roles::Role;

/// Business-tunable rate table. Volume rates are percentages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncentivePolicy {
    pub secured_volume_rate_pct: Decimal,
    pub secured_direct_volume_rate_pct: Decimal,
    pub unsecured_volume_rate_pct: Decimal,
    pub per_secured_case_rate: Decimal,
    pub per_unsecured_case_rate: Decimal,
    pub silver_threshold: Decimal,
    pub gold_threshold: Decimal,
    pub provisional_statuses: Vec<IncentiveStatus>,
    pub final_statuses: Vec<IncentiveStatus>,
}

impl Default for IncentivePolicy {
    fn default() -> Self {
        Self {
            secured_volume_rate_pct: Decimal::new(15, 1),
            secured_direct_volume_rate_pct: Decimal::new(2, 0),
            unsecured_volume_rate_pct: Decimal::new(25, 1),
            per_secured_case_rate: Decimal::new(500, 0),
            per_unsecured_case_rate: Decimal::new(250, 0),
            silver_threshold: Decimal::new(50_000, 0),
            gold_threshold: Decimal::new(100_000, 0),
            provisional_statuses: vec![IncentiveStatus::Eligible],
            final_statuses: vec![IncentiveStatus::Approved],
        }
    }
}

impl IncentivePolicy {
    pub fn statuses(&self, basis: StatusBasis) -> &[IncentiveStatus] {
        match basis {
            StatusBasis::Provisional => &self.provisional_statuses,
            StatusBasis::Final => &self.final_statuses,
        }
    }

    pub fn tier_for(&self, total: Decimal) -> PerformanceTier {
        if total >= self.gold_threshold {
            PerformanceTier::Gold
        } else if total >= self.silver_threshold {
            PerformanceTier::Silver
        } else {
            PerformanceTier::Bronze
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductClass {
    Secured,
    Unsecured,
}

const SECURED_KEYWORDS: [&str; 4] = ["secured", "home", "auto", "gold"];

/// Fixed keyword lookup. "unsecured" is tested first since it contains "secured".
pub fn classify_product(product: &str) -> ProductClass {
    let product = product.to_ascii_lowercase();
    if product.contains("unsecured") {
        return ProductClass::Unsecured;
    }
    if SECURED_KEYWORDS.iter().any(|keyword| product.contains(keyword)) {
        ProductClass::Secured
    } else {
        ProductClass::Unsecured
    }
}

#[derive(Clone, Debug, Default)]
pub struct IncentiveCalculator {
    policy: IncentivePolicy,
}

impl IncentiveCalculator {
    pub fn new(policy: IncentivePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &IncentivePolicy {
        &self.policy
    }

    /// Parses `period` (`YYYY_MM`) and computes the employee's breakdown.
    pub fn compute(
        &self,
        employee: &EmployeeCode,
        role: Role,
        period: &str,
        basis: StatusBasis,
        cases: &[Case],
    ) -> Result<IncentiveBreakdown, EngineError> {
        let period = Period::parse(period)?;
        Ok(self.compute_for_period(employee, role, period, basis, cases))
    }

    /// Cases are attributed through the role's tagging slot; roles without a
    /// slot earn nothing and get a zero breakdown.
    pub fn compute_for_period(
        &self,
        employee: &EmployeeCode,
        role: Role,
        period: Period,
        basis: StatusBasis,
        cases: &[Case],
    ) -> IncentiveBreakdown {
        let statuses = self.policy.statuses(basis);
        let qualifying: Vec<&Case> = match role.tagging_slot() {
            Some(slot) => cases
                .iter()
                .filter(|case| {
                    case.tagging.get(slot).is_some_and(|code| code.matches(employee.as_str()))
                })
                .filter(|case| statuses.contains(&case.incentive_status))
                .filter(|case| period.contains(case.activity_date()))
                .collect(),
            None => Vec::new(),
        };

        let (counts, volumes) = aggregate(&qualifying);
        let volume_incentive = self.volume_incentive(&volumes);
        let effort_incentive = self.effort_incentive(&counts);
        let total_incentive = volume_incentive.total + effort_incentive.total;

        debug!(
            event_name = "incentive.computed",
            employee_code = %employee,
            period = %period,
            qualifying_cases = qualifying.len(),
            total_incentive = %total_incentive,
            "incentive computed"
        );

        IncentiveBreakdown {
            employee_code: employee.clone(),
            role,
            period,
            basis,
            qualifying_cases: qualifying.len() as u32,
            counts,
            volumes,
            volume_incentive,
            effort_incentive,
            total_incentive,
            performance_tier: self.policy.tier_for(total_incentive),
        }
    }

    /// Branch roll-up for a BM or BCM: a full breakdown for the manager plus
    /// totals-only rows for each direct report in the same branch.
    pub fn compute_branch(
        &self,
        manager: &Principal,
        period: &str,
        basis: StatusBasis,
        cases: &[Case],
        roster: &[Principal],
    ) -> Result<BranchIncentive, EngineError> {
        let report_role = manager.role.direct_report().ok_or_else(|| {
            EngineError::ScopeViolation {
                reason: format!("role {} has no branch team", manager.role),
            }
        })?;
        let period = Period::parse(period)?;
        let branch_cases = HierarchyFilter::visible(cases, manager, &Selection::default())?;

        let own =
            self.compute_for_period(&manager.code, manager.role, period, basis, &branch_cases);

        let team_members: Vec<TeamMemberIncentive> = roster
            .iter()
            .filter(|member| {
                member.role == report_role && !member.code.matches(manager.code.as_str())
            })
            .filter(|member| match (&manager.home.branch, &member.home.branch) {
                (Some(home), Some(theirs)) => same_key(home, theirs),
                _ => false,
            })
            .map(|member| {
                let breakdown =
                    self.compute_for_period(&member.code, member.role, period, basis, &branch_cases);
                TeamMemberIncentive {
                    employee_code: member.code.clone(),
                    name: member.name.clone(),
                    role: member.role,
                    total_incentive: breakdown.total_incentive,
                    total_volume: breakdown.volumes.total(),
                    total_logins: breakdown.counts.total_logins(),
                    total_disbursals: breakdown.counts.total_disbursals(),
                    performance_tier: breakdown.performance_tier,
                }
            })
            .collect();

        let team_summary = TeamSummary {
            member_count: team_members.len() as u32,
            total_team_incentive: team_members.iter().map(|member| member.total_incentive).sum(),
            total_volume: team_members.iter().map(|member| member.total_volume).sum(),
            total_logins: team_members.iter().map(|member| member.total_logins).sum(),
        };

        Ok(BranchIncentive {
            branch: manager.home.branch.clone(),
            own,
            team_summary,
            team_members,
        })
    }

    fn volume_incentive(&self, volumes: &ActivityVolumes) -> VolumeIncentive {
        let secured = percent_of(volumes.secured_volume, self.policy.secured_volume_rate_pct);
        let secured_direct =
            percent_of(volumes.secured_direct_volume, self.policy.secured_direct_volume_rate_pct);
        let unsecured = percent_of(volumes.unsecured_volume, self.policy.unsecured_volume_rate_pct);
        let total = secured + secured_direct + unsecured;
        VolumeIncentive { secured, secured_direct, unsecured, total }
    }

    /// Direct disbursals earn through the volume split only.
    fn effort_incentive(&self, counts: &ActivityCounts) -> EffortIncentive {
        let secured = (Decimal::from(counts.login_secured + counts.disbursal_secured)
            * self.policy.per_secured_case_rate)
            .round_dp(2);
        let unsecured = (Decimal::from(counts.login_unsecured + counts.disbursal_unsecured)
            * self.policy.per_unsecured_case_rate)
            .round_dp(2);
        EffortIncentive { secured, unsecured, total: secured + unsecured }
    }
}

fn aggregate(cases: &[&Case]) -> (ActivityCounts, ActivityVolumes) {
    let mut counts = ActivityCounts::default();
    let mut volumes = ActivityVolumes::default();

    for case in cases {
        let class = classify_product(&case.product);
        if !case.is_disbursed() {
            match class {
                ProductClass::Secured => counts.login_secured += 1,
                ProductClass::Unsecured => counts.login_unsecured += 1,
            }
            continue;
        }

        match (class, case.channel) {
            (ProductClass::Secured, Channel::Direct) => {
                counts.disbursal_secured_direct += 1;
                volumes.secured_direct_volume += case.loan_amount;
            }
            (ProductClass::Secured, Channel::Routed) => {
                counts.disbursal_secured += 1;
                volumes.secured_volume += case.loan_amount;
            }
            (ProductClass::Unsecured, _) => {
                counts.disbursal_unsecured += 1;
                volumes.unsecured_volume += case.loan_amount;
            }
        }
    }

    (counts, volumes)
}

fn percent_of(amount: Decimal, rate_pct: Decimal) -> Decimal {
    (amount * rate_pct / Decimal::ONE_HUNDRED).round_dp(2)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{classify_product, IncentiveCalculator, IncentivePolicy, ProductClass};
    use crate::domain::case::{
        ApplicationStatus, Case, CaseId, Channel, IncentiveStatus, Tagging,
    };
    use crate::domain::employee::{Employee, EmployeeCode, Location};
    use crate::domain::incentive::{PerformanceTier, StatusBasis};
    use crate::errors::EngineError;
    use crate::principal::Principal;
    use crate::roles::Role;

    struct CaseFixture<'a> {
        id: &'a str,
        product: &'a str,
        amount: i64,
        disbursed: bool,
        channel: Channel,
        rm: &'a str,
        branch: &'a str,
    }

    fn case(fixture: CaseFixture<'_>) -> Case {
        Case {
            id: CaseId::new(fixture.id),
            customer_name: format!("Customer {}", fixture.id),
            product: fixture.product.to_owned(),
            loan_amount: Decimal::new(fixture.amount, 0),
            location: Location::new("Maharashtra", "Pune", fixture.branch),
            tagging: Tagging {
                rm: Some(EmployeeCode::new(fixture.rm)),
                bm: Some(EmployeeCode::new("BM01")),
                bcm: None,
                cso: None,
            },
            incentive_status: IncentiveStatus::Eligible,
            application_status: if fixture.disbursed {
                ApplicationStatus::Disbursed
            } else {
                ApplicationStatus::Login
            },
            channel: fixture.channel,
            login_date: NaiveDate::from_ymd_opt(2026, 9, 3).expect("date"),
            disbursal_date: fixture
                .disbursed
                .then(|| NaiveDate::from_ymd_opt(2026, 9, 25).expect("date")),
        }
    }

    fn home_loan(id: &str, amount: i64, rm: &str) -> Case {
        case(CaseFixture {
            id,
            product: "Home Loan",
            amount,
            disbursed: true,
            channel: Channel::Routed,
            rm,
            branch: "Pune Camp",
        })
    }

    fn rm(code: &str) -> EmployeeCode {
        EmployeeCode::new(code)
    }

    #[test]
    fn product_classification_uses_fixed_keywords() {
        assert_eq!(classify_product("Home Loan"), ProductClass::Secured);
        assert_eq!(classify_product("AUTO LOAN"), ProductClass::Secured);
        assert_eq!(classify_product("Gold Loan"), ProductClass::Secured);
        assert_eq!(classify_product("Secured Business Loan"), ProductClass::Secured);
        assert_eq!(classify_product("Unsecured Business Loan"), ProductClass::Unsecured);
        assert_eq!(classify_product("Personal Loan"), ProductClass::Unsecured);
    }

    #[test]
    fn routed_home_loan_disbursal_earns_secured_volume_rate() {
        let breakdown = IncentiveCalculator::default()
            .compute(
                &rm("RM01"),
                Role::Rm,
                "2026_09",
                StatusBasis::Provisional,
                &[home_loan("LN-1", 1_000_000, "RM01")],
            )
            .expect("compute");

        assert_eq!(breakdown.volumes.secured_volume, Decimal::new(1_000_000, 0));
        assert_eq!(breakdown.counts.disbursal_secured, 1);
        assert_eq!(breakdown.volume_incentive.secured, Decimal::new(15_000, 0));
        assert_eq!(breakdown.effort_incentive.secured, Decimal::new(500, 0));
        assert_eq!(breakdown.total_incentive, Decimal::new(15_500, 0));
        assert_eq!(breakdown.performance_tier, PerformanceTier::Bronze);
    }

    #[test]
    fn empty_case_set_is_an_all_zero_bronze_breakdown() {
        let breakdown = IncentiveCalculator::default()
            .compute(&rm("RM01"), Role::Rm, "2026_09", StatusBasis::Final, &[])
            .expect("compute");

        assert_eq!(breakdown.qualifying_cases, 0);
        assert_eq!(breakdown.counts.total_logins() + breakdown.counts.total_disbursals(), 0);
        assert_eq!(breakdown.volumes.total(), Decimal::ZERO);
        assert_eq!(breakdown.total_incentive, Decimal::ZERO);
        assert_eq!(breakdown.performance_tier, PerformanceTier::Bronze);
    }

    #[test]
    fn malformed_period_is_rejected() {
        let error = IncentiveCalculator::default()
            .compute(&rm("RM01"), Role::Rm, "2026-09", StatusBasis::Provisional, &[])
            .expect_err("dash separator is malformed");
        assert!(matches!(error, EngineError::InvalidPeriod { .. }));
    }

    #[test]
    fn buckets_split_direct_logins_and_unsecured() {
        let cases = vec![
            home_loan("LN-1", 400_000, "RM01"),
            case(CaseFixture {
                id: "LN-2",
                product: "Auto Loan",
                amount: 300_000,
                disbursed: true,
                channel: Channel::Direct,
                rm: "RM01",
                branch: "Pune Camp",
            }),
            case(CaseFixture {
                id: "LN-3",
                product: "Personal Loan",
                amount: 200_000,
                disbursed: true,
                channel: Channel::Direct,
                rm: "RM01",
                branch: "Pune Camp",
            }),
            case(CaseFixture {
                id: "LN-4",
                product: "Gold Loan",
                amount: 50_000,
                disbursed: false,
                channel: Channel::Routed,
                rm: "RM01",
                branch: "Pune Camp",
            }),
            case(CaseFixture {
                id: "LN-5",
                product: "Unsecured Business Loan",
                amount: 90_000,
                disbursed: false,
                channel: Channel::Routed,
                rm: "RM01",
                branch: "Pune Camp",
            }),
            home_loan("LN-6", 999_999, "RM02"),
        ];

        let breakdown = IncentiveCalculator::default()
            .compute(&rm("rm01"), Role::Rm, "2026_09", StatusBasis::Provisional, &cases)
            .expect("compute");

        assert_eq!(breakdown.qualifying_cases, 5);
        assert_eq!(breakdown.counts.login_secured, 1);
        assert_eq!(breakdown.counts.login_unsecured, 1);
        assert_eq!(breakdown.counts.disbursal_secured, 1);
        assert_eq!(breakdown.counts.disbursal_secured_direct, 1);
        assert_eq!(breakdown.counts.disbursal_unsecured, 1);
        assert_eq!(breakdown.volumes.secured_volume, Decimal::new(400_000, 0));
        assert_eq!(breakdown.volumes.secured_direct_volume, Decimal::new(300_000, 0));
        assert_eq!(breakdown.volumes.unsecured_volume, Decimal::new(200_000, 0));

        assert_eq!(breakdown.volume_incentive.secured, Decimal::new(6_000, 0));
        assert_eq!(breakdown.volume_incentive.secured_direct, Decimal::new(6_000, 0));
        assert_eq!(breakdown.volume_incentive.unsecured, Decimal::new(5_000, 0));
        assert_eq!(breakdown.effort_incentive.secured, Decimal::new(1_000, 0));
        assert_eq!(breakdown.effort_incentive.unsecured, Decimal::new(500, 0));
        assert_eq!(
            breakdown.volume_incentive.total + breakdown.effort_incentive.total,
            breakdown.total_incentive
        );
        assert_eq!(breakdown.total_incentive, Decimal::new(18_500, 0));
    }

    #[test]
    fn status_basis_and_period_select_qualifying_cases() {
        let mut approved = home_loan("LN-1", 100_000, "RM01");
        approved.incentive_status = IncentiveStatus::Approved;
        let mut held = home_loan("LN-2", 100_000, "RM01");
        held.incentive_status = IncentiveStatus::Hold;
        let mut last_month = home_loan("LN-3", 100_000, "RM01");
        last_month.disbursal_date = NaiveDate::from_ymd_opt(2026, 8, 31);
        let cases = vec![approved, held, last_month, home_loan("LN-4", 100_000, "RM01")];

        let calculator = IncentiveCalculator::default();
        let provisional = calculator
            .compute(&rm("RM01"), Role::Rm, "2026_09", StatusBasis::Provisional, &cases)
            .expect("provisional");
        let final_view = calculator
            .compute(&rm("RM01"), Role::Rm, "2026_09", StatusBasis::Final, &cases)
            .expect("final");

        assert_eq!(provisional.qualifying_cases, 1);
        assert_eq!(final_view.qualifying_cases, 1);
        assert_eq!(final_view.counts.disbursal_secured, 1);
    }

    #[test]
    fn tiers_follow_configured_thresholds() {
        let policy = IncentivePolicy::default();
        assert_eq!(policy.tier_for(Decimal::new(49_999, 0)), PerformanceTier::Bronze);
        assert_eq!(policy.tier_for(Decimal::new(50_000, 0)), PerformanceTier::Silver);
        assert_eq!(policy.tier_for(Decimal::new(100_000, 0)), PerformanceTier::Gold);

        let breakdown = IncentiveCalculator::default()
            .compute(
                &rm("RM01"),
                Role::Rm,
                "2026_09",
                StatusBasis::Provisional,
                &[home_loan("LN-1", 4_000_000, "RM01")],
            )
            .expect("compute");
        assert_eq!(breakdown.total_incentive, Decimal::new(60_500, 0));
        assert_eq!(breakdown.performance_tier, PerformanceTier::Silver);
    }

    #[test]
    fn roles_without_a_tagging_slot_earn_nothing() {
        let breakdown = IncentiveCalculator::default()
            .compute(
                &rm("SH01"),
                Role::StateHeadBusiness,
                "2026_09",
                StatusBasis::Provisional,
                &[home_loan("LN-1", 1_000_000, "SH01")],
            )
            .expect("compute");
        assert_eq!(breakdown.total_incentive, Decimal::ZERO);
    }

    fn member(code: &str, role: Role, branch: &str) -> Principal {
        let home = Location::new("Maharashtra", "Pune", branch);
        Principal::with_role(&Employee::new(code, &format!("Name {code}"), "", home), role)
    }

    #[test]
    fn branch_roll_up_details_manager_and_totals_team() {
        let cases = vec![
            home_loan("LN-1", 1_000_000, "RM01"),
            home_loan("LN-2", 200_000, "RM02"),
            case(CaseFixture {
                id: "LN-3",
                product: "Home Loan",
                amount: 700_000,
                disbursed: true,
                channel: Channel::Routed,
                rm: "RM03",
                branch: "Hadapsar",
            }),
        ];
        let manager = member("BM01", Role::Bm, "Pune Camp");
        let roster = vec![
            member("RM01", Role::Rm, "Pune Camp"),
            member("RM02", Role::Rm, "Pune Camp"),
            member("RM03", Role::Rm, "Hadapsar"),
            member("CSO01", Role::Cso, "Pune Camp"),
        ];

        let branch = IncentiveCalculator::default()
            .compute_branch(&manager, "2026_09", StatusBasis::Provisional, &cases, &roster)
            .expect("branch roll-up");

        assert_eq!(branch.branch.as_deref(), Some("Pune Camp"));
        assert_eq!(branch.own.counts.disbursal_secured, 2);
        assert_eq!(branch.own.volumes.secured_volume, Decimal::new(1_200_000, 0));
        assert_eq!(branch.team_summary.member_count, 2);
        assert_eq!(branch.team_summary.total_volume, Decimal::new(1_200_000, 0));
        assert_eq!(
            branch.team_summary.total_team_incentive,
            branch.team_members.iter().map(|member| member.total_incentive).sum::<Decimal>()
        );
        assert_eq!(branch.team_members[0].employee_code, EmployeeCode::new("RM01"));
        assert_eq!(branch.team_members[0].total_incentive, Decimal::new(15_500, 0));
    }

    #[test]
    fn branch_roll_up_is_for_branch_managers_only() {
        let error = IncentiveCalculator::default()
            .compute_branch(
                &member("RM01", Role::Rm, "Pune Camp"),
                "2026_09",
                StatusBasis::Provisional,
                &[],
                &[],
            )
            .expect_err("rm has no team");
        assert!(matches!(error, EngineError::ScopeViolation { .. }));
    }
}
