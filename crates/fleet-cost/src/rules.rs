use crate::policy::{ProjectKind, ProjectPricing, Retribution};
use rust_decimal::Decimal;

/// Inclusive percentage band accepted on internal projects.
pub const INTERNAL_PERCENTAGE_BAND: (Decimal, Decimal) =
    (Decimal::ONE, Decimal::from_parts(50, 0, 0, false, 0));

/// Inclusive percentage band accepted anywhere else.
pub const PERCENTAGE_BAND: (Decimal, Decimal) = (Decimal::ZERO, Decimal::ONE_HUNDRED);

/// A retribution value that falls outside the range its mode and project allow.
///
/// These are user input errors: callers report them as validation failures on
/// the retribution fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TermsViolation {
    #[error("percentage {value} is outside [{min}, {max}] for {kind} projects")]
    PercentageOutOfBand {
        value: Decimal,
        min: Decimal,
        max: Decimal,
        kind: ProjectKind,
    },

    #[error("fixed rate must be greater than zero (got {value})")]
    NonPositiveRate { value: Decimal },

    #[error("{kind} project has no hourly cost basis; use FIXED_RATE retribution")]
    MissingCostBasis { kind: ProjectKind },
}

pub fn percentage_band(kind: ProjectKind) -> (Decimal, Decimal) {
    match kind {
        ProjectKind::Internal => INTERNAL_PERCENTAGE_BAND,
        ProjectKind::External => PERCENTAGE_BAND,
    }
}

/// Checks retribution terms against the range rules for the project they bill.
///
/// Passing this check guarantees [`Retribution::bind`] succeeds for the same
/// project.
pub fn check_terms(terms: &Retribution, project: &ProjectPricing) -> Result<(), TermsViolation> {
    match *terms {
        Retribution::FixedRate(value) => {
            if value <= Decimal::ZERO {
                return Err(TermsViolation::NonPositiveRate { value });
            }
        }
        Retribution::Percentage(value) => {
            if project.hourly_cost_basis.is_none() {
                return Err(TermsViolation::MissingCostBasis { kind: project.kind });
            }
            let (min, max) = percentage_band(project.kind);
            if value < min || value > max {
                return Err(TermsViolation::PercentageOutOfBand {
                    value,
                    min,
                    max,
                    kind: project.kind,
                });
            }
        }
    }
    Ok(())
}
