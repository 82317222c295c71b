use chrono::{DateTime, NaiveDate, Utc};
use fleet_cost::{ProjectKind, ProjectPricing, Retribution, UnknownVariant};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentState {
    Active,
    Suspended,
    Finalized,
    Cancelled,
}

impl AssignmentState {
    pub const ALL: [AssignmentState; 4] = [
        AssignmentState::Active,
        AssignmentState::Suspended,
        AssignmentState::Finalized,
        AssignmentState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentState::Active => "ACTIVE",
            AssignmentState::Suspended => "SUSPENDED",
            AssignmentState::Finalized => "FINALIZED",
            AssignmentState::Cancelled => "CANCELLED",
        }
    }

    /// Finalized and cancelled assignments accept no further changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssignmentState::Finalized | AssignmentState::Cancelled)
    }

    pub fn can_transition_to(&self, target: AssignmentState) -> bool {
        use AssignmentState::*;
        matches!(
            (self, target),
            (Active, Suspended)
                | (Suspended, Active)
                | (Active | Suspended, Finalized)
                | (Active | Suspended, Cancelled)
        )
    }
}

impl fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| UnknownVariant::new("assignment state", s))
    }
}

/// Binding of one equipment unit to one project and cost center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: Uuid,
    pub equipment_id: String,
    pub project_id: String,
    pub cost_center_id: String,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_end_date: Option<NaiveDate>,
    /// Set when, and only when, the assignment is finalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<NaiveDate>,
    pub retribution: Retribution,
    pub estimated_hours: Decimal,
    #[serde(default)]
    pub actual_hours: Decimal,
    /// Always derived from the retribution terms and billed hours.
    pub total_cost: Decimal,
    pub state: AssignmentState,
    #[serde(default)]
    pub maintenance_validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Assignment {
    /// Hours the cost is billed on: realized effort once it exceeds the estimate.
    pub fn billing_hours(&self) -> Decimal {
        self.actual_hours.max(self.estimated_hours)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: ProjectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_cost_basis: Option<Decimal>,
}

impl Project {
    pub fn internal(id: impl Into<String>, hourly_cost_basis: Decimal) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: ProjectKind::Internal,
            hourly_cost_basis: Some(hourly_cost_basis),
        }
    }

    pub fn external(id: impl Into<String>, hourly_cost_basis: Option<Decimal>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: ProjectKind::External,
            hourly_cost_basis,
        }
    }

    pub fn pricing(&self) -> ProjectPricing {
        ProjectPricing {
            kind: self.kind,
            hourly_cost_basis: self.hourly_cost_basis,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalStatus {
    Operative,
    OutOfService,
    Retired,
}

impl OperationalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalStatus::Operative => "OPERATIVE",
            OperationalStatus::OutOfService => "OUT_OF_SERVICE",
            OperationalStatus::Retired => "RETIRED",
        }
    }
}

impl fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub operational_status: OperationalStatus,
}

impl Equipment {
    pub fn new(id: impl Into<String>, operational_status: OperationalStatus) -> Self {
        Self {
            id: id.into(),
            name: None,
            operational_status,
        }
    }

    pub fn operative(id: impl Into<String>) -> Self {
        Self::new(id, OperationalStatus::Operative)
    }
}

/// Listing filter; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_center_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AssignmentState>,
}

impl AssignmentFilter {
    pub fn by_equipment(equipment_id: impl Into<String>) -> Self {
        Self {
            equipment_id: Some(equipment_id.into()),
            ..Self::default()
        }
    }

    pub fn by_state(state: AssignmentState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn matches(&self, assignment: &Assignment) -> bool {
        fn field_matches(wanted: &Option<String>, actual: &str) -> bool {
            wanted.as_deref().is_none_or(|wanted| wanted == actual)
        }
        field_matches(&self.equipment_id, &assignment.equipment_id)
            && field_matches(&self.project_id, &assignment.project_id)
            && field_matches(&self.cost_center_id, &assignment.cost_center_id)
            && self.state.is_none_or(|state| state == assignment.state)
    }
}
