use thiserror::Error;

use propcrm_core::DomainError;

use crate::stage::OfferStage;

/// Offer lifecycle failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OfferError {
    /// Input is not one of the thirteen stages. Fatal to the call.
    #[error("invalid offer stage: {0:?}")]
    InvalidStage(String),

    /// Target not permitted from the current stage/swap combination.
    /// The offer is left unchanged.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: OfferStage, to: OfferStage },

    #[error(transparent)]
    Domain(#[from] DomainError),
}
