//! Retribution policy for equipment assignments.
//!
//! Maps retribution terms, billed hours and a project's pricing to a cost, and
//! holds the range rules and suggested defaults for those terms. Everything
//! here is pure.

pub mod defaults;
pub mod policy;
pub mod rules;

pub use defaults::RetributionDefaults;
pub use policy::{
    BoundRetribution, CURRENCY_SCALE, PolicyError, ProjectKind, ProjectPricing, Retribution,
    RetributionMode, UnknownVariant, compute_cost, round_currency,
};
pub use rules::{TermsViolation, check_terms, percentage_band};
