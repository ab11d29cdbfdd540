//! Offer lifecycle domain module (event-sourced).
//!
//! Business rules for real-estate offers as deterministic domain logic: the
//! stage state machine, commission recomputation and the audit trail each
//! change leaves behind. No IO, no storage, no logging.

pub mod audit;
pub mod commission;
pub mod error;
pub mod lifecycle;
pub mod offer;
pub mod stage;

pub use audit::{AuditAction, AuditLog};
pub use commission::commission_for;
pub use error::OfferError;
pub use lifecycle::{
    Action, AvailableActions, available_actions, available_actions_for, is_permitted,
    reachable_from,
};
pub use offer::{
    AGGREGATE_TYPE, AmountChanged, ApplyTransition, AssignmentChanged, ChangeAmount,
    ChangeCommission, ChangeExpirationDate, ChangeObservation, CommissionChanged, CreateOffer,
    DeleteOffer, ExpirationDateChanged, ExpireOffer, FlagsUpdated, ObservationChanged, Offer,
    OfferCommand, OfferCreated, OfferDeleted, OfferEvent, OfferId, Reassign, StageChanged,
    UpdateFlags,
};
pub use stage::{OfferStage, StageMetadata};
