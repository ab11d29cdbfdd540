//! Offer stages and their canonical display metadata.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::OfferError;

/// Position of an offer in its lifecycle. Exactly one at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStage {
    Draft,
    Submitted,
    CounterOffer,
    ConfirmForExchange,
    PendingClientApproval,
    PendingCapturerApproval,
    PendingPlacerApproval,
    PendingOwnerApproval,
    Accepted,
    Rejected,
    Expired,
    Finalized,
    Cancelled,
}

/// Display label and color for a stage. One entry per stage, nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageMetadata {
    pub label: &'static str,
    pub color: &'static str,
}

impl OfferStage {
    pub const ALL: [OfferStage; 13] = [
        OfferStage::Draft,
        OfferStage::Submitted,
        OfferStage::CounterOffer,
        OfferStage::ConfirmForExchange,
        OfferStage::PendingClientApproval,
        OfferStage::PendingCapturerApproval,
        OfferStage::PendingPlacerApproval,
        OfferStage::PendingOwnerApproval,
        OfferStage::Accepted,
        OfferStage::Rejected,
        OfferStage::Expired,
        OfferStage::Finalized,
        OfferStage::Cancelled,
    ];

    pub const INITIAL: OfferStage = OfferStage::Draft;

    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStage::Draft => "DRAFT",
            OfferStage::Submitted => "SUBMITTED",
            OfferStage::CounterOffer => "COUNTER_OFFER",
            OfferStage::ConfirmForExchange => "CONFIRM_FOR_EXCHANGE",
            OfferStage::PendingClientApproval => "PENDING_CLIENT_APPROVAL",
            OfferStage::PendingCapturerApproval => "PENDING_CAPTURER_APPROVAL",
            OfferStage::PendingPlacerApproval => "PENDING_PLACER_APPROVAL",
            OfferStage::PendingOwnerApproval => "PENDING_OWNER_APPROVAL",
            OfferStage::Accepted => "ACCEPTED",
            OfferStage::Rejected => "REJECTED",
            OfferStage::Expired => "EXPIRED",
            OfferStage::Finalized => "FINALIZED",
            OfferStage::Cancelled => "CANCELLED",
        }
    }

    /// No outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OfferStage::Rejected
                | OfferStage::Expired
                | OfferStage::Finalized
                | OfferStage::Cancelled
        )
    }

    pub fn metadata(&self) -> StageMetadata {
        let (label, color) = match self {
            OfferStage::Draft => ("Draft", "#9E9E9E"),
            OfferStage::Submitted => ("Submitted", "#2196F3"),
            OfferStage::CounterOffer => ("Counter offer", "#FF9800"),
            OfferStage::ConfirmForExchange => ("Confirm for exchange", "#00BCD4"),
            OfferStage::PendingClientApproval => ("Pending client approval", "#FFC107"),
            OfferStage::PendingCapturerApproval => ("Pending capturer approval", "#FFC107"),
            OfferStage::PendingPlacerApproval => ("Pending placer approval", "#FFC107"),
            OfferStage::PendingOwnerApproval => ("Pending owner approval", "#FFC107"),
            OfferStage::Accepted => ("Accepted", "#4CAF50"),
            OfferStage::Rejected => ("Rejected", "#F44336"),
            OfferStage::Expired => ("Expired", "#795548"),
            OfferStage::Finalized => ("Finalized", "#2E7D32"),
            OfferStage::Cancelled => ("Cancelled", "#607D8B"),
        };
        StageMetadata { label, color }
    }
}

impl core::fmt::Display for OfferStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStage {
    type Err = OfferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OfferStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| OfferError::InvalidStage(s.to_string()))
    }
}
