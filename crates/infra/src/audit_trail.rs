//! Audit log reader.
//!
//! Every offer event maps to exactly one audit record, so the trail is read
//! straight from the offer's stream. Recording a change and auditing it is a
//! single append.

use propcrm_core::OrganizationId;
use propcrm_offers::{AGGREGATE_TYPE, AuditLog, OfferEvent, OfferId};

use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, StoredEvent};

/// Audit records of one offer, oldest first.
pub fn read_audit_log<S>(
    store: &S,
    organization_id: OrganizationId,
    offer_id: OfferId,
) -> Result<Vec<AuditLog>, DispatchError>
where
    S: EventStore + ?Sized,
{
    let stream = store.load_stream(organization_id, offer_id.0)?;
    stream
        .iter()
        .filter(|stored| stored.aggregate_type == AGGREGATE_TYPE)
        .map(audit_entry)
        .collect()
}

fn audit_entry(stored: &StoredEvent) -> Result<AuditLog, DispatchError> {
    let ev: OfferEvent = serde_json::from_value(stored.payload.clone())
        .map_err(|e| {
            DispatchError::Deserialize(format!(
                "{} #{}: {e}",
                stored.event_type, stored.sequence_number
            ))
        })?;
    Ok(ev.audit_entry())
}
