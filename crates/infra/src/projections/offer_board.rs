use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use propcrm_core::{
    AggregateId, Money, OpportunityId, OrganizationId, Percentage, PropertyId, ProspectId, UserId,
};
use propcrm_events::EventEnvelope;
use propcrm_offers::{AGGREGATE_TYPE, OfferEvent, OfferId, OfferStage};

use crate::read_model::OrganizationStore;

/// One row of the offer board (dashboards, tables, kanban columns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfferSummary {
    pub offer_id: OfferId,
    pub opportunity_id: OpportunityId,
    pub property_id: PropertyId,
    pub prospect_id: ProspectId,
    pub agent_id: UserId,
    pub supervisor_id: Option<UserId>,
    pub stage: OfferStage,
    pub stage_label: &'static str,
    pub stage_color: &'static str,
    pub amount: Money,
    pub commission: Percentage,
    pub commission_amount: Money,
    pub expiration_date: NaiveDate,
    pub swap: bool,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl OfferSummary {
    fn set_stage(&mut self, stage: OfferStage) {
        let meta = stage.metadata();
        self.stage = stage;
        self.stage_label = meta.label;
        self.stage_color = meta.color;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    organization_id: OrganizationId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum OfferBoardProjectionError {
    #[error("failed to deserialize offer event: {0}")]
    Deserialize(String),
    #[error("organization isolation violation: {0}")]
    OrganizationIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
    #[error("event for unknown offer {0}")]
    UnknownOffer(OfferId),
    #[error("offer board unavailable: {0}")]
    Unavailable(String),
}

/// Read model of every offer of an organization.
///
/// Idempotent per stream: an envelope at or below the stream cursor is
/// skipped, a gap is an error. Rebuildable from the event store at any time.
#[derive(Debug)]
pub struct OfferBoardProjection<S>
where
    S: OrganizationStore<OfferId, OfferSummary>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> OfferBoardProjection<S>
where
    S: OrganizationStore<OfferId, OfferSummary>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned() -> OfferBoardProjectionError {
        OfferBoardProjectionError::Unavailable("cursor lock poisoned".to_string())
    }

    fn cursor(
        &self,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
    ) -> Result<u64, OfferBoardProjectionError> {
        let cursors = self.cursors.read().map_err(|_| Self::poisoned())?;
        Ok(cursors
            .get(&CursorKey { organization_id, aggregate_id })
            .copied()
            .unwrap_or(0))
    }

    fn advance_cursor(
        &self,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> Result<(), OfferBoardProjectionError> {
        let mut cursors = self.cursors.write().map_err(|_| Self::poisoned())?;
        cursors.insert(CursorKey { organization_id, aggregate_id }, seq);
        Ok(())
    }

    fn clear_cursors(
        &self,
        organization_id: OrganizationId,
    ) -> Result<(), OfferBoardProjectionError> {
        let mut cursors = self.cursors.write().map_err(|_| Self::poisoned())?;
        cursors.retain(|k, _| k.organization_id != organization_id);
        Ok(())
    }

    pub fn get(&self, organization_id: OrganizationId, offer_id: &OfferId) -> Option<OfferSummary> {
        self.store.get(organization_id, offer_id)
    }

    /// All offers, ordered by id.
    pub fn list(&self, organization_id: OrganizationId) -> Vec<OfferSummary> {
        let mut rows = self.store.list(organization_id);
        rows.sort_by_key(|r| r.offer_id);
        rows
    }

    /// Active offers currently in `stage`.
    pub fn by_stage(
        &self,
        organization_id: OrganizationId,
        stage: OfferStage,
    ) -> Vec<OfferSummary> {
        self.list(organization_id)
            .into_iter()
            .filter(|r| r.active && r.stage == stage)
            .collect()
    }

    /// Active offers handled by `agent_id`.
    pub fn by_agent(&self, organization_id: OrganizationId, agent_id: UserId) -> Vec<OfferSummary> {
        self.list(organization_id)
            .into_iter()
            .filter(|r| r.active && r.agent_id == agent_id)
            .collect()
    }

    /// Number of active offers per stage. Every stage is present, possibly with 0.
    pub fn stage_counts(&self, organization_id: OrganizationId) -> BTreeMap<OfferStage, usize> {
        let mut counts: BTreeMap<OfferStage, usize> =
            OfferStage::ALL.into_iter().map(|s| (s, 0)).collect();
        for row in self.store.list(organization_id) {
            if row.active {
                *counts.entry(row.stage).or_default() += 1;
            }
        }
        counts
    }

    /// Open offers whose expiration date is before `as_of`.
    pub fn overdue(&self, organization_id: OrganizationId, as_of: NaiveDate) -> Vec<OfferSummary> {
        self.list(organization_id)
            .into_iter()
            .filter(|r| r.active && !r.stage.is_terminal() && r.expiration_date < as_of)
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OfferBoardProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let organization_id = envelope.organization_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(organization_id, aggregate_id)?;
        if seq == 0 {
            return Err(OfferBoardProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(OfferBoardProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: OfferEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            OfferBoardProjectionError::Deserialize(format!("{}: {e}", envelope.event_type()))
        })?;

        if ev.organization_id() != organization_id {
            return Err(OfferBoardProjectionError::OrganizationIsolation(
                "event organization_id does not match envelope organization_id".to_string(),
            ));
        }
        if ev.offer_id().0 != aggregate_id {
            return Err(OfferBoardProjectionError::OrganizationIsolation(
                "event offer_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let row = match ev {
            OfferEvent::OfferCreated(e) => {
                let meta = OfferStage::INITIAL.metadata();
                OfferSummary {
                    offer_id: e.offer_id,
                    opportunity_id: e.opportunity_id,
                    property_id: e.property_id,
                    prospect_id: e.prospect_id,
                    agent_id: e.agent_id,
                    supervisor_id: e.supervisor_id,
                    stage: OfferStage::INITIAL,
                    stage_label: meta.label,
                    stage_color: meta.color,
                    amount: e.amount,
                    commission: e.commission,
                    commission_amount: e.commission_amount,
                    expiration_date: e.expiration_date,
                    swap: e.swap,
                    active: true,
                    updated_at: e.occurred_at,
                }
            }
            other => {
                let offer_id = other.offer_id();
                let mut row = self
                    .store
                    .get(organization_id, &offer_id)
                    .ok_or(OfferBoardProjectionError::UnknownOffer(offer_id))?;
                apply_change(&mut row, &other);
                row
            }
        };

        self.store.upsert(organization_id, row.offer_id, row);
        self.advance_cursor(organization_id, aggregate_id, seq)
    }

    /// Drop everything known about the organizations present in `envelopes`
    /// and replay them in stream order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), OfferBoardProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut organizations: Vec<_> = envs.iter().map(|e| e.organization_id()).collect();
        organizations.sort();
        organizations.dedup();
        for org in organizations {
            self.store.clear_organization(org);
            self.clear_cursors(org)?;
        }

        envs.sort_by_key(|e| (e.organization_id(), e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

fn apply_change(row: &mut OfferSummary, ev: &OfferEvent) {
    match ev {
        OfferEvent::OfferCreated(_) => {}
        OfferEvent::StageChanged(e) => row.set_stage(e.to),
        OfferEvent::AmountChanged(e) => {
            row.amount = e.amount;
            row.commission_amount = e.commission_amount;
        }
        OfferEvent::CommissionChanged(e) => {
            row.commission = e.commission;
            row.commission_amount = e.commission_amount;
        }
        OfferEvent::ObservationChanged(_) => {}
        OfferEvent::ExpirationDateChanged(e) => row.expiration_date = e.expiration_date,
        OfferEvent::AssignmentChanged(e) => {
            row.agent_id = e.agent_id;
            row.supervisor_id = e.supervisor_id;
        }
        OfferEvent::FlagsUpdated(e) => {
            row.swap = e.swap;
            row.active = e.active;
        }
        OfferEvent::OfferDeleted(_) => row.active = false,
    }
    row.updated_at = propcrm_events::Event::occurred_at(ev);
}
