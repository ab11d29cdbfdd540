//! Organization-isolated read model storage abstractions.

pub mod organization_store;

pub use organization_store::{InMemoryOrganizationStore, OrganizationStore};
