//! Append-only audit records of offer field changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::offer::OfferId;

/// Kind of change an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    StateChange,
    AmountChange,
    CommissionChange,
    ObservationChange,
    ExpirationDateChange,
    AssignmentChange,
    Created,
    Updated,
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::StateChange => "STATE_CHANGE",
            AuditAction::AmountChange => "AMOUNT_CHANGE",
            AuditAction::CommissionChange => "COMMISSION_CHANGE",
            AuditAction::ObservationChange => "OBSERVATION_CHANGE",
            AuditAction::ExpirationDateChange => "EXPIRATION_DATE_CHANGE",
            AuditAction::AssignmentChange => "ASSIGNMENT_CHANGE",
            AuditAction::Created => "CREATED",
            AuditAction::Updated => "UPDATED",
            AuditAction::Deleted => "DELETED",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field change on an offer. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    pub offer_id: OfferId,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
    pub user_name: String,
}
