use incentive_core::domain::incentive::{BranchIncentive, IncentiveBreakdown, StatusBasis};
use incentive_core::errors::ApplicationError;
use incentive_core::principal::Principal;

use super::{persistence, PortalServices};

impl PortalServices {
    pub async fn my_incentive(
        &self,
        principal: &Principal,
        period: &str,
        basis: StatusBasis,
    ) -> Result<IncentiveBreakdown, ApplicationError> {
        let cases = self.repositories.cases.list().await.map_err(persistence)?;
        Ok(self.calculator.compute(&principal.code, principal.role, period, basis, &cases)?)
    }

    /// Branch roll-up for a BM or BCM. The roster is every employee stored
    /// under the manager's branch, resolved the same way callers are.
    pub async fn branch_incentive(
        &self,
        principal: &Principal,
        period: &str,
        basis: StatusBasis,
    ) -> Result<BranchIncentive, ApplicationError> {
        let cases = self.repositories.cases.list().await.map_err(persistence)?;
        let roster = match principal.home.branch.as_deref() {
            Some(branch) => self
                .repositories
                .employees
                .list_by_branch(branch)
                .await
                .map_err(persistence)?
                .iter()
                .map(|employee| Principal::resolve(employee, &self.resolver))
                .collect(),
            None => Vec::new(),
        };

        Ok(self.calculator.compute_branch(principal, period, basis, &cases, &roster)?)
    }
}
