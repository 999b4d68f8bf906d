use serde::Deserialize;
use tracing::warn;

use incentive_core::domain::case::Case;
use incentive_core::domain::incentive::Period;
use incentive_core::errors::ApplicationError;
use incentive_core::hierarchy::{HierarchyFilter, Selection, SelectionOptions};
use incentive_core::principal::Principal;

use super::{persistence, PortalServices};

/// Case listing filter: an optional `YYYY_MM` period plus the cascading selection.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CaseFilter {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub employee: Option<String>,
}

impl CaseFilter {
    pub fn selection(&self) -> Selection {
        Selection::from_parts(
            self.state.as_deref(),
            self.area.as_deref(),
            self.branch.as_deref(),
            self.employee.as_deref(),
        )
    }
}

impl PortalServices {
    /// Cases the caller may see, narrowed by the selection and, when given,
    /// by the period their activity date falls in.
    pub async fn list_cases(
        &self,
        principal: &Principal,
        filter: &CaseFilter,
    ) -> Result<Vec<Case>, ApplicationError> {
        let period = filter
            .period
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(Period::parse)
            .transpose()?;

        let cases = self.repositories.cases.list().await.map_err(persistence)?;
        let visible = HierarchyFilter::visible(&cases, principal, &filter.selection())?;

        Ok(match period {
            Some(period) => {
                visible.into_iter().filter(|case| period.contains(case.activity_date())).collect()
            }
            None => visible,
        })
    }

    /// Cascading selector options. A failed lookup degrades to empty lists.
    pub async fn case_options(
        &self,
        principal: &Principal,
        selection: &Selection,
    ) -> Result<SelectionOptions, ApplicationError> {
        let cases = match self.repositories.cases.list().await {
            Ok(cases) => cases,
            Err(error) => {
                warn!(
                    event_name = "cases.options_unavailable",
                    employee_code = %principal.code,
                    error = %error,
                    "case lookup failed; returning empty option lists"
                );
                return Ok(SelectionOptions::default());
            }
        };
        Ok(HierarchyFilter::options(&cases, principal, selection)?)
    }
}
