use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits kept on stored currency amounts.
pub const CURRENCY_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectKind {
    Internal,
    External,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Internal => "INTERNAL",
            ProjectKind::External => "EXTERNAL",
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INTERNAL" => Ok(ProjectKind::Internal),
            "EXTERNAL" => Ok(ProjectKind::External),
            _ => Err(UnknownVariant::new("project kind", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetributionMode {
    Percentage,
    FixedRate,
}

impl RetributionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetributionMode::Percentage => "PERCENTAGE",
            RetributionMode::FixedRate => "FIXED_RATE",
        }
    }
}

impl fmt::Display for RetributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetributionMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PERCENTAGE" => Ok(RetributionMode::Percentage),
            "FIXED_RATE" => Ok(RetributionMode::FixedRate),
            _ => Err(UnknownVariant::new("retribution mode", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what} '{value}'")]
pub struct UnknownVariant {
    what: &'static str,
    value: String,
}

impl UnknownVariant {
    pub fn new(what: &'static str, value: impl Into<String>) -> Self {
        Self {
            what,
            value: value.into(),
        }
    }
}

/// Retribution terms of an assignment: the billing method and its value.
///
/// `Percentage` is a share of the project's hourly cost basis (0..=100);
/// `FixedRate` is a currency-per-hour rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Retribution {
    Percentage(Decimal),
    FixedRate(Decimal),
}

impl Retribution {
    pub fn from_parts(mode: RetributionMode, value: Decimal) -> Self {
        match mode {
            RetributionMode::Percentage => Retribution::Percentage(value),
            RetributionMode::FixedRate => Retribution::FixedRate(value),
        }
    }

    pub fn mode(&self) -> RetributionMode {
        match self {
            Retribution::Percentage(_) => RetributionMode::Percentage,
            Retribution::FixedRate(_) => RetributionMode::FixedRate,
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            Retribution::Percentage(value) | Retribution::FixedRate(value) => *value,
        }
    }

    /// Resolves the terms against a project's pricing. A percentage can only be
    /// bound when the project carries an hourly cost basis.
    pub fn bind(&self, project: &ProjectPricing) -> Result<BoundRetribution, PolicyError> {
        match *self {
            Retribution::FixedRate(rate) => Ok(BoundRetribution::FixedRate { rate }),
            Retribution::Percentage(percent) => {
                let hourly_basis = project
                    .hourly_cost_basis
                    .ok_or(PolicyError::MissingCostBasis { kind: project.kind })?;
                Ok(BoundRetribution::Percentage {
                    percent,
                    hourly_basis,
                })
            }
        }
    }
}

impl fmt::Display for Retribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retribution::Percentage(value) => write!(f, "{value}%"),
            Retribution::FixedRate(value) => write!(f, "{value}/h"),
        }
    }
}

/// The pricing inputs a project contributes to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPricing {
    pub kind: ProjectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_cost_basis: Option<Decimal>,
}

impl ProjectPricing {
    pub fn internal(hourly_cost_basis: Decimal) -> Self {
        Self {
            kind: ProjectKind::Internal,
            hourly_cost_basis: Some(hourly_cost_basis),
        }
    }

    pub fn external(hourly_cost_basis: Option<Decimal>) -> Self {
        Self {
            kind: ProjectKind::External,
            hourly_cost_basis,
        }
    }
}

/// Retribution terms resolved against a project. Every variant carries all the
/// inputs it needs, so costing it never looks anything up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundRetribution {
    Percentage { percent: Decimal, hourly_basis: Decimal },
    FixedRate { rate: Decimal },
}

impl BoundRetribution {
    /// Unrounded cost for `hours` of use.
    pub fn cost(&self, hours: Decimal) -> Result<Decimal, PolicyError> {
        let cost = match *self {
            BoundRetribution::FixedRate { rate } => rate.checked_mul(hours),
            BoundRetribution::Percentage {
                percent,
                hourly_basis,
            } => (percent / Decimal::ONE_HUNDRED)
                .checked_mul(hourly_basis)
                .and_then(|per_hour| per_hour.checked_mul(hours)),
        };
        cost.ok_or(PolicyError::Overflow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("{kind} project has no hourly cost basis to apply a percentage to")]
    MissingCostBasis { kind: ProjectKind },

    #[error("cost computation overflowed")]
    Overflow,
}

/// Cost of `hours` under `terms` for `project`, at full precision.
pub fn compute_cost(
    terms: &Retribution,
    hours: Decimal,
    project: &ProjectPricing,
) -> Result<Decimal, PolicyError> {
    terms.bind(project)?.cost(hours)
}

/// Rounds half-up to the stored currency scale.
pub fn round_currency(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}
