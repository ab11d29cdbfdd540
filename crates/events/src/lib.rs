//! Event primitives shared by domain modules and infrastructure.
//!
//! - [`Event`]: the contract every domain event implements
//! - [`EventEnvelope`]: organization + stream metadata around a payload
//! - [`EventBus`]: pub/sub transport used after events are persisted

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod organization;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use organization::OrganizationScoped;
