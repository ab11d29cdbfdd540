//! Infrastructure layer: event store, command dispatch, read models, config.

pub mod audit_trail;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod offer_service;
pub mod projections;
pub mod read_model;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use config::{Config, ConfigError};
pub use offer_service::{NewOffer, OfferService, RequestContext};
