//! Offer stage state machine: which stages may follow the current one.
//!
//! The table is the single source of truth for transitions. `swap` only
//! changes what follows `ACCEPTED`: an exchange goes through
//! `CONFIRM_FOR_EXCHANGE`, a cash deal through the owner's approval.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::OfferError;
use crate::stage::OfferStage;

/// One permitted next step, as rendered by a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Action {
    pub label: &'static str,
    pub target: OfferStage,
    pub color_hint: &'static str,
}

/// Result of [`available_actions`].
///
/// `terminal_restart` marks terminal stages, where the only affordance is
/// starting a new offer. That is not a transition of this offer and never
/// shows up in `transitions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableActions {
    pub transitions: Vec<Action>,
    pub terminal_restart: bool,
}

impl AvailableActions {
    pub fn none() -> Self {
        Self {
            transitions: Vec::new(),
            terminal_restart: false,
        }
    }

    pub fn permits(&self, target: OfferStage) -> bool {
        self.transitions.iter().any(|a| a.target == target)
    }

    pub fn targets(&self) -> Vec<OfferStage> {
        self.transitions.iter().map(|a| a.target).collect()
    }
}

fn table(stage: OfferStage, swap: bool) -> &'static [(OfferStage, &'static str)] {
    use crate::stage::OfferStage::*;

    match stage {
        Draft => &[(Submitted, "Submit offer")],
        Submitted => &[
            (Accepted, "Accept"),
            (Rejected, "Reject"),
            (CounterOffer, "Counter offer"),
        ],
        CounterOffer => &[
            (Accepted, "Accept counter offer"),
            (Rejected, "Reject counter offer"),
            (CounterOffer, "New counter offer"),
        ],
        Accepted if swap => &[(ConfirmForExchange, "Confirm for exchange")],
        Accepted => &[(PendingOwnerApproval, "Request owner approval")],
        ConfirmForExchange => &[(Finalized, "Finalize exchange"), (Cancelled, "Cancel exchange")],
        PendingOwnerApproval => &[(Finalized, "Owner approves"), (Rejected, "Owner rejects")],
        PendingClientApproval => &[(Accepted, "Client approves"), (Rejected, "Client rejects")],
        PendingCapturerApproval => &[
            (Accepted, "Capturer approves"),
            (Rejected, "Capturer rejects"),
        ],
        PendingPlacerApproval => &[(Accepted, "Placer approves"), (Rejected, "Placer rejects")],
        Rejected | Expired | Finalized | Cancelled => &[],
    }
}

/// Ordered list of permitted next actions for an offer. Pure.
pub fn available_actions(stage: OfferStage, swap: bool) -> AvailableActions {
    let transitions = table(stage, swap)
        .iter()
        .map(|&(target, label)| Action {
            label,
            target,
            color_hint: target.metadata().color,
        })
        .collect();

    AvailableActions {
        transitions,
        terminal_restart: stage.is_terminal(),
    }
}

/// Same as [`available_actions`] for a stage given by its wire name.
pub fn available_actions_for(stage: &str, swap: bool) -> Result<AvailableActions, OfferError> {
    let stage: OfferStage = stage.parse()?;
    Ok(available_actions(stage, swap))
}

pub fn is_permitted(from: OfferStage, to: OfferStage, swap: bool) -> bool {
    table(from, swap).iter().any(|&(target, _)| target == to)
}

/// Every stage reachable from `stage` in one or more steps (swap held fixed).
pub fn reachable_from(stage: OfferStage, swap: bool) -> BTreeSet<OfferStage> {
    let mut seen = BTreeSet::new();
    let mut frontier = vec![stage];

    while let Some(current) = frontier.pop() {
        for &(target, _) in table(current, swap) {
            if seen.insert(target) {
                frontier.push(target);
            }
        }
    }

    seen
}
