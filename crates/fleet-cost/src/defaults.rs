use crate::policy::{ProjectKind, ProjectPricing, Retribution, RetributionMode};
use crate::rules::{TermsViolation, check_terms};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Suggested retribution terms used to pre-fill new assignments.
///
/// Internal projects default to a percentage of their cost basis, external
/// projects to a fixed hourly rate. Callers may always override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetributionDefaults {
    pub percentage: Decimal,
    pub fixed_rate: Decimal,
}

impl Default for RetributionDefaults {
    fn default() -> Self {
        Self {
            percentage: Decimal::from(15),
            fixed_rate: Decimal::from(100),
        }
    }
}

impl RetributionDefaults {
    pub fn mode_for(&self, kind: ProjectKind) -> RetributionMode {
        match kind {
            ProjectKind::Internal => RetributionMode::Percentage,
            ProjectKind::External => RetributionMode::FixedRate,
        }
    }

    pub fn value_for(&self, mode: RetributionMode) -> Decimal {
        match mode {
            RetributionMode::Percentage => self.percentage,
            RetributionMode::FixedRate => self.fixed_rate,
        }
    }

    pub fn suggest(&self, kind: ProjectKind) -> Retribution {
        let mode = self.mode_for(kind);
        Retribution::from_parts(mode, self.value_for(mode))
    }

    /// Fills in whichever half of the terms the caller left out.
    pub fn complete(
        &self,
        kind: ProjectKind,
        mode: Option<RetributionMode>,
        value: Option<Decimal>,
    ) -> Retribution {
        let mode = mode.unwrap_or_else(|| self.mode_for(kind));
        let value = value.unwrap_or_else(|| self.value_for(mode));
        Retribution::from_parts(mode, value)
    }

    /// Defaults must themselves pass the range rules they pre-fill for.
    pub fn validate(&self) -> Result<(), TermsViolation> {
        check_terms(
            &Retribution::Percentage(self.percentage),
            &ProjectPricing::internal(Decimal::ONE),
        )?;
        check_terms(
            &Retribution::FixedRate(self.fixed_rate),
            &ProjectPricing::external(None),
        )
    }
}
