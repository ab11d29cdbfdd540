//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and are:
//! - **Rebuildable** from the event store
//! - **Organization-isolated**
//! - **Idempotent** under at-least-once delivery

pub mod offer_board;

pub use offer_board::{OfferBoardProjection, OfferBoardProjectionError, OfferSummary};
