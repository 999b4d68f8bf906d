use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeCode;
use crate::errors::EngineError;
use crate::roles::Role;

/// Calendar month an incentive is computed for, keyed as `YYYY_MM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, EngineError> {
        if !(1..=12).contains(&month) || !(1900..=9999).contains(&year) {
            return Err(EngineError::InvalidPeriod { period: format!("{year:04}_{month:02}") });
        }
        Ok(Self { year, month })
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidPeriod { period: raw.to_string() };
        let trimmed = raw.trim();
        let (year, month) = trimmed.split_once('_').ok_or_else(invalid)?;
        if year.len() != 4
            || month.len() != 2
            || !year.chars().chain(month.chars()).all(|ch| ch.is_ascii_digit())
        {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn key(&self) -> String {
        format!("{:04}_{:02}", self.year, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for Period {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Which incentive statuses count: provisional (in-month view) or final (payout view).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBasis {
    #[default]
    Provisional,
    Final,
}

impl StatusBasis {
    pub fn from_is_final(is_final: bool) -> Self {
        if is_final {
            Self::Final
        } else {
            Self::Provisional
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Bronze,
    Silver,
    Gold,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCounts {
    pub login_secured: u32,
    pub login_unsecured: u32,
    /// Secured disbursals that were not sourced directly.
    pub disbursal_secured: u32,
    pub disbursal_secured_direct: u32,
    pub disbursal_unsecured: u32,
}

impl ActivityCounts {
    pub fn total_logins(&self) -> u32 {
        self.login_secured + self.login_unsecured
    }

    pub fn total_disbursals(&self) -> u32 {
        self.disbursal_secured + self.disbursal_secured_direct + self.disbursal_unsecured
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityVolumes {
    pub secured_volume: Decimal,
    pub secured_direct_volume: Decimal,
    pub unsecured_volume: Decimal,
}

impl ActivityVolumes {
    pub fn total(&self) -> Decimal {
        self.secured_volume + self.secured_direct_volume + self.unsecured_volume
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeIncentive {
    pub secured: Decimal,
    pub secured_direct: Decimal,
    pub unsecured: Decimal,
    pub total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffortIncentive {
    pub secured: Decimal,
    pub unsecured: Decimal,
    pub total: Decimal,
}

/// Per-employee, per-period incentive. Always derived fresh from case activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncentiveBreakdown {
    pub employee_code: EmployeeCode,
    pub role: Role,
    pub period: Period,
    pub basis: StatusBasis,
    pub qualifying_cases: u32,
    pub counts: ActivityCounts,
    pub volumes: ActivityVolumes,
    pub volume_incentive: VolumeIncentive,
    pub effort_incentive: EffortIncentive,
    pub total_incentive: Decimal,
    pub performance_tier: PerformanceTier,
}

/// Coarse per-report row of a branch roll-up. Carries totals only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMemberIncentive {
    pub employee_code: EmployeeCode,
    pub name: String,
    pub role: Role,
    pub total_incentive: Decimal,
    pub total_volume: Decimal,
    pub total_logins: u32,
    pub total_disbursals: u32,
    pub performance_tier: PerformanceTier,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub member_count: u32,
    pub total_team_incentive: Decimal,
    pub total_volume: Decimal,
    pub total_logins: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchIncentive {
    pub branch: Option<String>,
    pub own: IncentiveBreakdown,
    pub team_summary: TeamSummary,
    pub team_members: Vec<TeamMemberIncentive>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{ActivityCounts, Period};
    use crate::errors::EngineError;

    #[test]
    fn parses_well_formed_period_keys() {
        let period = Period::parse("2026_09").expect("valid period");
        assert_eq!(period.year(), 2026);
        assert_eq!(period.month(), 9);
        assert_eq!(period.to_string(), "2026_09");
        assert!(period.contains(NaiveDate::from_ymd_opt(2026, 9, 30).expect("date")));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2025, 9, 30).expect("date")));
    }

    #[test]
    fn rejects_malformed_period_keys() {
        for raw in ["", "2026-09", "2026_9", "2026_13", "2026_00", "26_09", "abcd_ef", "2026_09_01"]
        {
            let error = Period::parse(raw).expect_err("malformed period must fail");
            assert!(matches!(error, EngineError::InvalidPeriod { .. }), "{raw} should be invalid");
        }
    }

    #[test]
    fn period_serializes_as_key_string() {
        let period = Period::parse("2026_01").expect("valid period");
        assert_eq!(serde_json::to_string(&period).expect("serialize"), "\"2026_01\"");
        let parsed: Period = serde_json::from_str("\"2026_01\"").expect("deserialize");
        assert_eq!(parsed, period);
    }

    #[test]
    fn disbursal_total_includes_direct_cases() {
        let counts = ActivityCounts {
            login_secured: 2,
            login_unsecured: 1,
            disbursal_secured: 3,
            disbursal_secured_direct: 1,
            disbursal_unsecured: 2,
        };
        assert_eq!(counts.total_logins(), 3);
        assert_eq!(counts.total_disbursals(), 6);
    }
}
