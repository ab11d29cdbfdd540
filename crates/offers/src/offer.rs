use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use propcrm_core::{
    Aggregate, AggregateId, AggregateRoot, Currency, DomainError, Money, OpportunityId,
    OrganizationId, Percentage, PropertyId, ProspectId, UserId,
};
use propcrm_events::{Command, Event, OrganizationScoped};

use crate::audit::{AuditAction, AuditLog};
use crate::commission::commission_for;
use crate::error::OfferError;
use crate::lifecycle::{self, AvailableActions};
use crate::stage::OfferStage;

/// Stream type under which offer events are stored.
pub const AGGREGATE_TYPE: &str = "offers.offer";

/// Offer identifier (organization-scoped via `organization_id` fields).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub AggregateId);

impl OfferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OfferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    id: OfferId,
    organization_id: Option<OrganizationId>,
    opportunity_id: OpportunityId,
    property_id: PropertyId,
    prospect_id: ProspectId,
    agent_id: UserId,
    supervisor_id: Option<UserId>,
    amount: Money,
    commission: Percentage,
    commission_amount: Money,
    expiration_date: NaiveDate,
    swap: bool,
    active: bool,
    stage: OfferStage,
    observation: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    created: bool,
}

impl Offer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OfferId) -> Self {
        Self {
            id,
            organization_id: None,
            opportunity_id: OpportunityId::new(0),
            property_id: PropertyId::new(0),
            prospect_id: ProspectId::new(0),
            agent_id: UserId::new(0),
            supervisor_id: None,
            amount: Money::zero(Currency::CLP),
            commission: Percentage::ZERO,
            commission_amount: Money::zero(Currency::CLP),
            expiration_date: NaiveDate::default(),
            swap: false,
            active: false,
            stage: OfferStage::INITIAL,
            observation: None,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OfferId {
        self.id
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.organization_id
    }

    pub fn opportunity_id(&self) -> OpportunityId {
        self.opportunity_id
    }

    pub fn property_id(&self) -> PropertyId {
        self.property_id
    }

    pub fn prospect_id(&self) -> ProspectId {
        self.prospect_id
    }

    pub fn agent_id(&self) -> UserId {
        self.agent_id
    }

    pub fn supervisor_id(&self) -> Option<UserId> {
        self.supervisor_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency()
    }

    pub fn commission(&self) -> Percentage {
        self.commission
    }

    pub fn commission_amount(&self) -> Money {
        self.commission_amount
    }

    /// Always the offer currency.
    pub fn commission_currency(&self) -> Currency {
        self.commission_amount.currency()
    }

    pub fn expiration_date(&self) -> NaiveDate {
        self.expiration_date
    }

    pub fn swap(&self) -> bool {
        self.swap
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stage(&self) -> OfferStage {
        self.stage
    }

    pub fn observation(&self) -> Option<&str> {
        self.observation.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Actions for the current stage. An inactive offer offers none, not even
    /// a restart, until it is reactivated.
    pub fn available_actions(&self) -> AvailableActions {
        if !self.active {
            return AvailableActions::none();
        }
        lifecycle::available_actions(self.stage, self.swap)
    }

    /// Move the offer to `target`, returning the updated offer and the
    /// `STATE_CHANGE` record describing it.
    ///
    /// `self` is never modified; on error nothing is produced at all.
    pub fn apply_transition(
        &self,
        target: OfferStage,
        changed_by: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(Offer, AuditLog), OfferError> {
        let organization_id = self.organization_id.ok_or(DomainError::NotFound)?;
        let command = OfferCommand::ApplyTransition(ApplyTransition {
            organization_id,
            offer_id: self.id,
            target,
            changed_by: changed_by.to_string(),
            occurred_at,
        });

        let events = self.handle(&command)?;
        let mut updated = self.clone();
        let mut audit = None;
        for ev in &events {
            updated.apply(ev);
            audit = Some(ev.audit_entry());
        }

        let audit = audit.ok_or_else(|| DomainError::invariant("transition produced no event"))?;
        Ok((updated, audit))
    }
}

impl AggregateRoot for Offer {
    type Id = OfferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOffer. The offer starts in `DRAFT`, active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOffer {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub opportunity_id: OpportunityId,
    pub property_id: PropertyId,
    pub prospect_id: ProspectId,
    pub agent_id: UserId,
    pub supervisor_id: Option<UserId>,
    pub amount: Money,
    pub commission: Percentage,
    pub expiration_date: NaiveDate,
    pub swap: bool,
    pub observation: Option<String>,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyTransition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyTransition {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub target: OfferStage,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeAmount. A currency change travels with the amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAmount {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub amount: Money,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeCommission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCommission {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub commission: Percentage,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeObservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeObservation {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub observation: Option<String>,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeExpirationDate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeExpirationDate {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub expiration_date: NaiveDate,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reassign the agent and/or supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reassign {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub agent_id: UserId,
    pub supervisor_id: Option<UserId>,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateFlags (`swap`, `active`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFlags {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub swap: bool,
    pub active: bool,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireOffer. Moves an overdue offer to `EXPIRED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireOffer {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub as_of: NaiveDate,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteOffer. Soft: the offer is deactivated, never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOffer {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferCommand {
    CreateOffer(CreateOffer),
    ApplyTransition(ApplyTransition),
    ChangeAmount(ChangeAmount),
    ChangeCommission(ChangeCommission),
    ChangeObservation(ChangeObservation),
    ChangeExpirationDate(ChangeExpirationDate),
    Reassign(Reassign),
    UpdateFlags(UpdateFlags),
    ExpireOffer(ExpireOffer),
    DeleteOffer(DeleteOffer),
}

impl OfferCommand {
    pub fn offer_id(&self) -> OfferId {
        match self {
            OfferCommand::CreateOffer(c) => c.offer_id,
            OfferCommand::ApplyTransition(c) => c.offer_id,
            OfferCommand::ChangeAmount(c) => c.offer_id,
            OfferCommand::ChangeCommission(c) => c.offer_id,
            OfferCommand::ChangeObservation(c) => c.offer_id,
            OfferCommand::ChangeExpirationDate(c) => c.offer_id,
            OfferCommand::Reassign(c) => c.offer_id,
            OfferCommand::UpdateFlags(c) => c.offer_id,
            OfferCommand::ExpireOffer(c) => c.offer_id,
            OfferCommand::DeleteOffer(c) => c.offer_id,
        }
    }
}

impl Command for OfferCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.offer_id().0
    }
}

impl OrganizationScoped for OfferCommand {
    fn organization_id(&self) -> OrganizationId {
        match self {
            OfferCommand::CreateOffer(c) => c.organization_id,
            OfferCommand::ApplyTransition(c) => c.organization_id,
            OfferCommand::ChangeAmount(c) => c.organization_id,
            OfferCommand::ChangeCommission(c) => c.organization_id,
            OfferCommand::ChangeObservation(c) => c.organization_id,
            OfferCommand::ChangeExpirationDate(c) => c.organization_id,
            OfferCommand::Reassign(c) => c.organization_id,
            OfferCommand::UpdateFlags(c) => c.organization_id,
            OfferCommand::ExpireOffer(c) => c.organization_id,
            OfferCommand::DeleteOffer(c) => c.organization_id,
        }
    }
}

/// Event: OfferCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferCreated {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub opportunity_id: OpportunityId,
    pub property_id: PropertyId,
    pub prospect_id: ProspectId,
    pub agent_id: UserId,
    pub supervisor_id: Option<UserId>,
    pub amount: Money,
    pub commission: Percentage,
    pub commission_amount: Money,
    pub expiration_date: NaiveDate,
    pub swap: bool,
    pub observation: Option<String>,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StageChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChanged {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub from: OfferStage,
    pub to: OfferStage,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AmountChanged (commission recomputed alongside).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountChanged {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub previous: Money,
    pub amount: Money,
    pub commission_amount: Money,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CommissionChanged (commission amount recomputed alongside).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionChanged {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub previous: Percentage,
    pub commission: Percentage,
    pub commission_amount: Money,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ObservationChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationChanged {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub previous: Option<String>,
    pub observation: Option<String>,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpirationDateChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationDateChanged {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub previous: NaiveDate,
    pub expiration_date: NaiveDate,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AssignmentChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentChanged {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub previous_agent_id: UserId,
    pub previous_supervisor_id: Option<UserId>,
    pub agent_id: UserId,
    pub supervisor_id: Option<UserId>,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FlagsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagsUpdated {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub previous_swap: bool,
    pub previous_active: bool,
    pub swap: bool,
    pub active: bool,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OfferDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferDeleted {
    pub organization_id: OrganizationId,
    pub offer_id: OfferId,
    pub stage: OfferStage,
    pub changed_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferEvent {
    OfferCreated(OfferCreated),
    StageChanged(StageChanged),
    AmountChanged(AmountChanged),
    CommissionChanged(CommissionChanged),
    ObservationChanged(ObservationChanged),
    ExpirationDateChanged(ExpirationDateChanged),
    AssignmentChanged(AssignmentChanged),
    FlagsUpdated(FlagsUpdated),
    OfferDeleted(OfferDeleted),
}

impl OfferEvent {
    pub fn organization_id(&self) -> OrganizationId {
        match self {
            OfferEvent::OfferCreated(e) => e.organization_id,
            OfferEvent::StageChanged(e) => e.organization_id,
            OfferEvent::AmountChanged(e) => e.organization_id,
            OfferEvent::CommissionChanged(e) => e.organization_id,
            OfferEvent::ObservationChanged(e) => e.organization_id,
            OfferEvent::ExpirationDateChanged(e) => e.organization_id,
            OfferEvent::AssignmentChanged(e) => e.organization_id,
            OfferEvent::FlagsUpdated(e) => e.organization_id,
            OfferEvent::OfferDeleted(e) => e.organization_id,
        }
    }

    pub fn offer_id(&self) -> OfferId {
        match self {
            OfferEvent::OfferCreated(e) => e.offer_id,
            OfferEvent::StageChanged(e) => e.offer_id,
            OfferEvent::AmountChanged(e) => e.offer_id,
            OfferEvent::CommissionChanged(e) => e.offer_id,
            OfferEvent::ObservationChanged(e) => e.offer_id,
            OfferEvent::ExpirationDateChanged(e) => e.offer_id,
            OfferEvent::AssignmentChanged(e) => e.offer_id,
            OfferEvent::FlagsUpdated(e) => e.offer_id,
            OfferEvent::OfferDeleted(e) => e.offer_id,
        }
    }

    pub fn changed_by(&self) -> &str {
        match self {
            OfferEvent::OfferCreated(e) => &e.changed_by,
            OfferEvent::StageChanged(e) => &e.changed_by,
            OfferEvent::AmountChanged(e) => &e.changed_by,
            OfferEvent::CommissionChanged(e) => &e.changed_by,
            OfferEvent::ObservationChanged(e) => &e.changed_by,
            OfferEvent::ExpirationDateChanged(e) => &e.changed_by,
            OfferEvent::AssignmentChanged(e) => &e.changed_by,
            OfferEvent::FlagsUpdated(e) => &e.changed_by,
            OfferEvent::OfferDeleted(e) => &e.changed_by,
        }
    }

    /// The audit record this event stands for. Every event maps to exactly one.
    pub fn audit_entry(&self) -> AuditLog {
        let (action, previous_value, new_value) = match self {
            OfferEvent::OfferCreated(e) => (AuditAction::Created, None, Some(e.amount.to_string())),
            OfferEvent::StageChanged(e) => (
                AuditAction::StateChange,
                Some(e.from.to_string()),
                Some(e.to.to_string()),
            ),
            OfferEvent::AmountChanged(e) => (
                AuditAction::AmountChange,
                Some(e.previous.to_string()),
                Some(e.amount.to_string()),
            ),
            OfferEvent::CommissionChanged(e) => (
                AuditAction::CommissionChange,
                Some(e.previous.to_string()),
                Some(e.commission.to_string()),
            ),
            OfferEvent::ObservationChanged(e) => (
                AuditAction::ObservationChange,
                e.previous.clone(),
                e.observation.clone(),
            ),
            OfferEvent::ExpirationDateChanged(e) => (
                AuditAction::ExpirationDateChange,
                Some(e.previous.to_string()),
                Some(e.expiration_date.to_string()),
            ),
            OfferEvent::AssignmentChanged(e) => (
                AuditAction::AssignmentChange,
                Some(describe_assignment(e.previous_agent_id, e.previous_supervisor_id)),
                Some(describe_assignment(e.agent_id, e.supervisor_id)),
            ),
            OfferEvent::FlagsUpdated(e) => (
                AuditAction::Updated,
                Some(describe_flags(e.previous_swap, e.previous_active)),
                Some(describe_flags(e.swap, e.active)),
            ),
            OfferEvent::OfferDeleted(e) => (AuditAction::Deleted, Some(e.stage.to_string()), None),
        };

        AuditLog {
            offer_id: self.offer_id(),
            timestamp: self.occurred_at(),
            action,
            previous_value,
            new_value,
            user_name: self.changed_by().to_string(),
        }
    }
}

fn describe_assignment(agent: UserId, supervisor: Option<UserId>) -> String {
    match supervisor {
        Some(s) => format!("agent={agent}, supervisor={s}"),
        None => format!("agent={agent}"),
    }
}

fn describe_flags(swap: bool, active: bool) -> String {
    format!("swap={swap}, active={active}")
}

impl Event for OfferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OfferEvent::OfferCreated(_) => "offers.offer.created",
            OfferEvent::StageChanged(_) => "offers.offer.stage_changed",
            OfferEvent::AmountChanged(_) => "offers.offer.amount_changed",
            OfferEvent::CommissionChanged(_) => "offers.offer.commission_changed",
            OfferEvent::ObservationChanged(_) => "offers.offer.observation_changed",
            OfferEvent::ExpirationDateChanged(_) => "offers.offer.expiration_date_changed",
            OfferEvent::AssignmentChanged(_) => "offers.offer.assignment_changed",
            OfferEvent::FlagsUpdated(_) => "offers.offer.flags_updated",
            OfferEvent::OfferDeleted(_) => "offers.offer.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OfferEvent::OfferCreated(e) => e.occurred_at,
            OfferEvent::StageChanged(e) => e.occurred_at,
            OfferEvent::AmountChanged(e) => e.occurred_at,
            OfferEvent::CommissionChanged(e) => e.occurred_at,
            OfferEvent::ObservationChanged(e) => e.occurred_at,
            OfferEvent::ExpirationDateChanged(e) => e.occurred_at,
            OfferEvent::AssignmentChanged(e) => e.occurred_at,
            OfferEvent::FlagsUpdated(e) => e.occurred_at,
            OfferEvent::OfferDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Offer {
    type Command = OfferCommand;
    type Event = OfferEvent;
    type Error = OfferError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OfferEvent::OfferCreated(e) => {
                self.id = e.offer_id;
                self.organization_id = Some(e.organization_id);
                self.opportunity_id = e.opportunity_id;
                self.property_id = e.property_id;
                self.prospect_id = e.prospect_id;
                self.agent_id = e.agent_id;
                self.supervisor_id = e.supervisor_id;
                self.amount = e.amount;
                self.commission = e.commission;
                self.commission_amount = e.commission_amount;
                self.expiration_date = e.expiration_date;
                self.swap = e.swap;
                self.active = true;
                self.stage = OfferStage::INITIAL;
                self.observation = e.observation.clone();
                self.created_at = e.occurred_at;
                self.created = true;
            }
            OfferEvent::StageChanged(e) => {
                self.stage = e.to;
            }
            OfferEvent::AmountChanged(e) => {
                self.amount = e.amount;
                self.commission_amount = e.commission_amount;
            }
            OfferEvent::CommissionChanged(e) => {
                self.commission = e.commission;
                self.commission_amount = e.commission_amount;
            }
            OfferEvent::ObservationChanged(e) => {
                self.observation = e.observation.clone();
            }
            OfferEvent::ExpirationDateChanged(e) => {
                self.expiration_date = e.expiration_date;
            }
            OfferEvent::AssignmentChanged(e) => {
                self.agent_id = e.agent_id;
                self.supervisor_id = e.supervisor_id;
            }
            OfferEvent::FlagsUpdated(e) => {
                self.swap = e.swap;
                self.active = e.active;
            }
            OfferEvent::OfferDeleted(_) => {
                self.active = false;
            }
        }

        self.updated_at = event.occurred_at();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OfferCommand::CreateOffer(cmd) => self.handle_create(cmd),
            OfferCommand::ApplyTransition(cmd) => self.handle_transition(cmd),
            OfferCommand::ChangeAmount(cmd) => self.handle_change_amount(cmd),
            OfferCommand::ChangeCommission(cmd) => self.handle_change_commission(cmd),
            OfferCommand::ChangeObservation(cmd) => self.handle_change_observation(cmd),
            OfferCommand::ChangeExpirationDate(cmd) => self.handle_change_expiration(cmd),
            OfferCommand::Reassign(cmd) => self.handle_reassign(cmd),
            OfferCommand::UpdateFlags(cmd) => self.handle_update_flags(cmd),
            OfferCommand::ExpireOffer(cmd) => self.handle_expire(cmd),
            OfferCommand::DeleteOffer(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Offer {
    /// Shared guard: offer exists, belongs to the caller's organization, and
    /// the command names this offer and an acting user.
    fn ensure_target(
        &self,
        organization_id: OrganizationId,
        offer_id: OfferId,
        changed_by: &str,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.organization_id != Some(organization_id) {
            return Err(DomainError::invariant("organization mismatch"));
        }
        if self.id != offer_id {
            return Err(DomainError::invariant("offer_id mismatch"));
        }
        ensure_actor(changed_by)
    }

    /// Field edits need a live, non-terminal offer.
    fn ensure_editable(&self) -> Result<(), DomainError> {
        if self.stage.is_terminal() {
            return Err(DomainError::invariant(format!(
                "cannot edit an offer in terminal stage {}",
                self.stage
            )));
        }
        if !self.active {
            return Err(DomainError::invariant("cannot edit an inactive offer"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOffer) -> Result<Vec<OfferEvent>, OfferError> {
        if self.created {
            return Err(DomainError::conflict("offer already exists").into());
        }
        ensure_actor(&cmd.changed_by)?;

        if cmd.amount.is_zero() {
            return Err(DomainError::validation("amount must be positive").into());
        }
        if cmd.expiration_date < cmd.occurred_at.date_naive() {
            return Err(DomainError::validation("expiration date is in the past").into());
        }

        let commission_amount = commission_for(cmd.amount, cmd.commission)?;

        Ok(vec![OfferEvent::OfferCreated(OfferCreated {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            opportunity_id: cmd.opportunity_id,
            property_id: cmd.property_id,
            prospect_id: cmd.prospect_id,
            agent_id: cmd.agent_id,
            supervisor_id: cmd.supervisor_id,
            amount: cmd.amount,
            commission: cmd.commission,
            commission_amount,
            expiration_date: cmd.expiration_date,
            swap: cmd.swap,
            observation: normalize_observation(cmd.observation.as_deref()),
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &ApplyTransition) -> Result<Vec<OfferEvent>, OfferError> {
        self.ensure_target(cmd.organization_id, cmd.offer_id, &cmd.changed_by)?;

        if !self.available_actions().permits(cmd.target) {
            return Err(OfferError::IllegalTransition {
                from: self.stage,
                to: cmd.target,
            });
        }

        Ok(vec![OfferEvent::StageChanged(StageChanged {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            from: self.stage,
            to: cmd.target,
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_amount(&self, cmd: &ChangeAmount) -> Result<Vec<OfferEvent>, OfferError> {
        self.ensure_target(cmd.organization_id, cmd.offer_id, &cmd.changed_by)?;
        self.ensure_editable()?;

        if cmd.amount.is_zero() {
            return Err(DomainError::validation("amount must be positive").into());
        }
        if cmd.amount == self.amount {
            return Ok(vec![]);
        }

        let commission_amount = commission_for(cmd.amount, self.commission)?;

        Ok(vec![OfferEvent::AmountChanged(AmountChanged {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            previous: self.amount,
            amount: cmd.amount,
            commission_amount,
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_commission(
        &self,
        cmd: &ChangeCommission,
    ) -> Result<Vec<OfferEvent>, OfferError> {
        self.ensure_target(cmd.organization_id, cmd.offer_id, &cmd.changed_by)?;
        self.ensure_editable()?;

        if cmd.commission == self.commission {
            return Ok(vec![]);
        }

        let commission_amount = commission_for(self.amount, cmd.commission)?;

        Ok(vec![OfferEvent::CommissionChanged(CommissionChanged {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            previous: self.commission,
            commission: cmd.commission,
            commission_amount,
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_observation(
        &self,
        cmd: &ChangeObservation,
    ) -> Result<Vec<OfferEvent>, OfferError> {
        self.ensure_target(cmd.organization_id, cmd.offer_id, &cmd.changed_by)?;
        self.ensure_editable()?;

        let observation = normalize_observation(cmd.observation.as_deref());
        if observation == self.observation {
            return Ok(vec![]);
        }

        Ok(vec![OfferEvent::ObservationChanged(ObservationChanged {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            previous: self.observation.clone(),
            observation,
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_expiration(
        &self,
        cmd: &ChangeExpirationDate,
    ) -> Result<Vec<OfferEvent>, OfferError> {
        self.ensure_target(cmd.organization_id, cmd.offer_id, &cmd.changed_by)?;
        self.ensure_editable()?;

        if cmd.expiration_date == self.expiration_date {
            return Ok(vec![]);
        }
        if cmd.expiration_date < cmd.occurred_at.date_naive() {
            return Err(DomainError::validation("expiration date is in the past").into());
        }

        Ok(vec![OfferEvent::ExpirationDateChanged(ExpirationDateChanged {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            previous: self.expiration_date,
            expiration_date: cmd.expiration_date,
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reassign(&self, cmd: &Reassign) -> Result<Vec<OfferEvent>, OfferError> {
        self.ensure_target(cmd.organization_id, cmd.offer_id, &cmd.changed_by)?;
        self.ensure_editable()?;

        if cmd.agent_id == self.agent_id && cmd.supervisor_id == self.supervisor_id {
            return Ok(vec![]);
        }

        Ok(vec![OfferEvent::AssignmentChanged(AssignmentChanged {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            previous_agent_id: self.agent_id,
            previous_supervisor_id: self.supervisor_id,
            agent_id: cmd.agent_id,
            supervisor_id: cmd.supervisor_id,
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_flags(&self, cmd: &UpdateFlags) -> Result<Vec<OfferEvent>, OfferError> {
        self.ensure_target(cmd.organization_id, cmd.offer_id, &cmd.changed_by)?;
        // Reactivation is allowed, so only the terminal check applies here.
        if self.stage.is_terminal() {
            return Err(DomainError::invariant(format!(
                "cannot edit an offer in terminal stage {}",
                self.stage
            ))
            .into());
        }

        if cmd.swap == self.swap && cmd.active == self.active {
            return Ok(vec![]);
        }

        Ok(vec![OfferEvent::FlagsUpdated(FlagsUpdated {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            previous_swap: self.swap,
            previous_active: self.active,
            swap: cmd.swap,
            active: cmd.active,
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &ExpireOffer) -> Result<Vec<OfferEvent>, OfferError> {
        self.ensure_target(cmd.organization_id, cmd.offer_id, &cmd.changed_by)?;
        if !self.active {
            return Err(DomainError::invariant("cannot expire an inactive offer").into());
        }

        if self.stage.is_terminal() {
            return Err(DomainError::invariant(format!(
                "offer already closed in stage {}",
                self.stage
            ))
            .into());
        }
        if cmd.as_of <= self.expiration_date {
            return Err(DomainError::invariant("offer has not reached its expiration date").into());
        }

        Ok(vec![OfferEvent::StageChanged(StageChanged {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            from: self.stage,
            to: OfferStage::Expired,
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteOffer) -> Result<Vec<OfferEvent>, OfferError> {
        self.ensure_target(cmd.organization_id, cmd.offer_id, &cmd.changed_by)?;

        if !self.active {
            return Ok(vec![]);
        }

        Ok(vec![OfferEvent::OfferDeleted(OfferDeleted {
            organization_id: cmd.organization_id,
            offer_id: cmd.offer_id,
            stage: self.stage,
            changed_by: cmd.changed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn ensure_actor(changed_by: &str) -> Result<(), DomainError> {
    if changed_by.trim().is_empty() {
        return Err(DomainError::validation("acting user name is required"));
    }
    Ok(())
}

/// Blank observations are stored as absent.
fn normalize_observation(observation: Option<&str>) -> Option<String> {
    observation
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use propcrm_events::execute;

    const ORG: OrganizationId = OrganizationId::new(1);
    const AGENT: &str = "maria.agent";

    fn test_offer_id() -> OfferId {
        OfferId::new(AggregateId::new(100))
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn later(minutes: i64) -> DateTime<Utc> {
        test_time() + chrono::Duration::minutes(minutes)
    }

    fn expiration() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, 30).unwrap()
    }

    fn create_cmd(swap: bool) -> CreateOffer {
        CreateOffer {
            organization_id: ORG,
            offer_id: test_offer_id(),
            opportunity_id: OpportunityId::new(10),
            property_id: PropertyId::new(20),
            prospect_id: ProspectId::new(30),
            agent_id: UserId::new(5),
            supervisor_id: None,
            amount: Money::new(1_000_000, Currency::CLP),
            commission: Percentage::from_percent(3).unwrap(),
            expiration_date: expiration(),
            swap,
            observation: None,
            changed_by: AGENT.to_string(),
            occurred_at: test_time(),
        }
    }

    fn created_offer(swap: bool) -> Offer {
        let mut offer = Offer::empty(test_offer_id());
        execute(&mut offer, &OfferCommand::CreateOffer(create_cmd(swap))).unwrap();
        offer
    }

    fn transition(offer: &mut Offer, target: OfferStage) -> Result<Vec<OfferEvent>, OfferError> {
        execute(
            offer,
            &OfferCommand::ApplyTransition(ApplyTransition {
                organization_id: ORG,
                offer_id: test_offer_id(),
                target,
                changed_by: AGENT.to_string(),
                occurred_at: later(5),
            }),
        )
    }

    #[test]
    fn create_starts_in_draft_with_commission_computed() {
        let offer = created_offer(false);

        assert_eq!(offer.stage(), OfferStage::Draft);
        assert!(offer.is_active());
        assert_eq!(offer.commission_amount(), Money::new(30_000, Currency::CLP));
        assert_eq!(offer.commission_currency(), Currency::CLP);
        assert_eq!(offer.version(), 1);
        assert_eq!(offer.created_at(), test_time());
    }

    #[test]
    fn create_twice_conflicts() {
        let offer = created_offer(false);
        let err = offer
            .handle(&OfferCommand::CreateOffer(create_cmd(false)))
            .unwrap_err();
        assert!(matches!(err, OfferError::Domain(DomainError::Conflict(_))));
    }

    #[test]
    fn create_validates_amount_and_expiration() {
        let empty = Offer::empty(test_offer_id());

        let mut zero = create_cmd(false);
        zero.amount = Money::zero(Currency::CLP);
        assert!(matches!(
            empty.handle(&OfferCommand::CreateOffer(zero)),
            Err(OfferError::Domain(DomainError::Validation(_)))
        ));

        let mut past = create_cmd(false);
        past.expiration_date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(matches!(
            empty.handle(&OfferCommand::CreateOffer(past)),
            Err(OfferError::Domain(DomainError::Validation(_)))
        ));

        let mut anonymous = create_cmd(false);
        anonymous.changed_by = "  ".to_string();
        assert!(matches!(
            empty.handle(&OfferCommand::CreateOffer(anonymous)),
            Err(OfferError::Domain(DomainError::Validation(_)))
        ));
    }

    #[test]
    fn commands_on_missing_offer_are_not_found() {
        let offer = Offer::empty(test_offer_id());
        let err = offer
            .handle(&OfferCommand::ApplyTransition(ApplyTransition {
                organization_id: ORG,
                offer_id: test_offer_id(),
                target: OfferStage::Submitted,
                changed_by: AGENT.to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, OfferError::Domain(DomainError::NotFound));
    }

    #[test]
    fn draft_to_submitted_then_finalized_is_illegal() {
        let offer = created_offer(false);

        let (submitted, audit) = offer
            .apply_transition(OfferStage::Submitted, AGENT, later(1))
            .unwrap();
        assert_eq!(submitted.stage(), OfferStage::Submitted);
        assert_eq!(submitted.updated_at(), later(1));
        assert_eq!(audit.action, AuditAction::StateChange);
        assert_eq!(audit.previous_value.as_deref(), Some("DRAFT"));
        assert_eq!(audit.new_value.as_deref(), Some("SUBMITTED"));
        assert_eq!(audit.user_name, AGENT);
        assert_eq!(audit.timestamp, later(1));

        let err = submitted
            .apply_transition(OfferStage::Finalized, AGENT, later(2))
            .unwrap_err();
        assert_eq!(
            err,
            OfferError::IllegalTransition {
                from: OfferStage::Submitted,
                to: OfferStage::Finalized,
            }
        );
        assert_eq!(submitted.stage(), OfferStage::Submitted);
    }

    #[test]
    fn apply_transition_leaves_original_untouched() {
        let offer = created_offer(false);
        let before = offer.clone();
        let _ = offer.apply_transition(OfferStage::Submitted, AGENT, later(1)).unwrap();
        assert_eq!(offer, before);
    }

    #[test]
    fn illegal_transition_does_not_mutate() {
        let mut offer = created_offer(false);
        let before = offer.clone();

        let err = transition(&mut offer, OfferStage::Accepted).unwrap_err();
        assert!(matches!(err, OfferError::IllegalTransition { .. }));
        assert_eq!(offer, before);
    }

    #[test]
    fn swap_offers_go_through_exchange_confirmation() {
        let mut offer = created_offer(true);
        transition(&mut offer, OfferStage::Submitted).unwrap();
        transition(&mut offer, OfferStage::Accepted).unwrap();

        let err = transition(&mut offer, OfferStage::PendingOwnerApproval).unwrap_err();
        assert!(matches!(err, OfferError::IllegalTransition { .. }));

        transition(&mut offer, OfferStage::ConfirmForExchange).unwrap();
        transition(&mut offer, OfferStage::Cancelled).unwrap();
        assert!(offer.available_actions().terminal_restart);
    }

    #[test]
    fn cash_offers_need_owner_approval() {
        let mut offer = created_offer(false);
        for stage in [
            OfferStage::Submitted,
            OfferStage::CounterOffer,
            OfferStage::CounterOffer,
            OfferStage::Accepted,
            OfferStage::PendingOwnerApproval,
            OfferStage::Finalized,
        ] {
            transition(&mut offer, stage).unwrap();
        }
        assert_eq!(offer.stage(), OfferStage::Finalized);
        assert_eq!(offer.version(), 7);

        let err = transition(&mut offer, OfferStage::Draft).unwrap_err();
        assert!(matches!(err, OfferError::IllegalTransition { .. }));
    }

    #[test]
    fn amount_change_recomputes_commission_and_currency() {
        let mut offer = created_offer(false);
        let events = execute(
            &mut offer,
            &OfferCommand::ChangeAmount(ChangeAmount {
                organization_id: ORG,
                offer_id: test_offer_id(),
                amount: Money::from_major(4_000, Currency::CLF).unwrap(),
                changed_by: AGENT.to_string(),
                occurred_at: later(1),
            }),
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(offer.currency(), Currency::CLF);
        assert_eq!(offer.commission_currency(), Currency::CLF);
        assert_eq!(offer.commission_amount().to_string(), "120.0000 CLF");

        let audit = events[0].audit_entry();
        assert_eq!(audit.action, AuditAction::AmountChange);
        assert_eq!(audit.previous_value.as_deref(), Some("1000000 CLP"));
        assert_eq!(audit.new_value.as_deref(), Some("4000.0000 CLF"));
    }

    #[test]
    fn commission_change_recomputes_amount() {
        let mut offer = created_offer(false);
        let events = execute(
            &mut offer,
            &OfferCommand::ChangeCommission(ChangeCommission {
                organization_id: ORG,
                offer_id: test_offer_id(),
                commission: Percentage::parse("2.5").unwrap(),
                changed_by: AGENT.to_string(),
                occurred_at: later(1),
            }),
        )
        .unwrap();

        assert_eq!(offer.commission_amount(), Money::new(25_000, Currency::CLP));
        let audit = events[0].audit_entry();
        assert_eq!(audit.action, AuditAction::CommissionChange);
        assert_eq!(audit.previous_value.as_deref(), Some("3%"));
        assert_eq!(audit.new_value.as_deref(), Some("2.5%"));
    }

    #[test]
    fn unchanged_edits_emit_nothing() {
        let mut offer = created_offer(false);
        let events = execute(
            &mut offer,
            &OfferCommand::ChangeAmount(ChangeAmount {
                organization_id: ORG,
                offer_id: test_offer_id(),
                amount: Money::new(1_000_000, Currency::CLP),
                changed_by: AGENT.to_string(),
                occurred_at: later(1),
            }),
        )
        .unwrap();
        assert!(events.is_empty());

        let events = execute(
            &mut offer,
            &OfferCommand::ChangeObservation(ChangeObservation {
                organization_id: ORG,
                offer_id: test_offer_id(),
                observation: Some("   ".to_string()),
                changed_by: AGENT.to_string(),
                occurred_at: later(1),
            }),
        )
        .unwrap();
        assert!(events.is_empty());
        assert_eq!(offer.version(), 1);
    }

    #[test]
    fn terminal_offers_reject_edits() {
        let mut offer = created_offer(false);
        transition(&mut offer, OfferStage::Submitted).unwrap();
        transition(&mut offer, OfferStage::Rejected).unwrap();

        let err = offer
            .handle(&OfferCommand::ChangeExpirationDate(ChangeExpirationDate {
                organization_id: ORG,
                offer_id: test_offer_id(),
                expiration_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
                changed_by: AGENT.to_string(),
                occurred_at: later(10),
            }))
            .unwrap_err();
        assert!(matches!(err, OfferError::Domain(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn reassign_records_previous_and_new_assignment() {
        let mut offer = created_offer(false);
        let events = execute(
            &mut offer,
            &OfferCommand::Reassign(Reassign {
                organization_id: ORG,
                offer_id: test_offer_id(),
                agent_id: UserId::new(6),
                supervisor_id: Some(UserId::new(9)),
                changed_by: "supervisor".to_string(),
                occurred_at: later(1),
            }),
        )
        .unwrap();

        assert_eq!(offer.agent_id(), UserId::new(6));
        assert_eq!(offer.supervisor_id(), Some(UserId::new(9)));
        let audit = events[0].audit_entry();
        assert_eq!(audit.action, AuditAction::AssignmentChange);
        assert_eq!(audit.previous_value.as_deref(), Some("agent=5"));
        assert_eq!(audit.new_value.as_deref(), Some("agent=6, supervisor=9"));
    }

    #[test]
    fn expiring_requires_the_date_to_have_passed() {
        let mut offer = created_offer(false);
        transition(&mut offer, OfferStage::Submitted).unwrap();

        let expire = |as_of: NaiveDate| {
            OfferCommand::ExpireOffer(ExpireOffer {
                organization_id: ORG,
                offer_id: test_offer_id(),
                as_of,
                changed_by: "system".to_string(),
                occurred_at: later(60),
            })
        };

        let err = offer.handle(&expire(expiration())).unwrap_err();
        assert!(matches!(err, OfferError::Domain(DomainError::InvariantViolation(_))));

        let next_day = expiration().succ_opt().unwrap();
        let events = execute(&mut offer, &expire(next_day)).unwrap();
        assert_eq!(offer.stage(), OfferStage::Expired);
        assert_eq!(events[0].audit_entry().new_value.as_deref(), Some("EXPIRED"));

        assert!(offer.handle(&expire(next_day)).is_err());
    }

    #[test]
    fn delete_is_soft_and_logged_once() {
        let mut offer = created_offer(false);
        let delete = OfferCommand::DeleteOffer(DeleteOffer {
            organization_id: ORG,
            offer_id: test_offer_id(),
            changed_by: AGENT.to_string(),
            occurred_at: later(1),
        });

        let events = execute(&mut offer, &delete).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!offer.is_active());
        assert_eq!(offer.stage(), OfferStage::Draft);
        let audit = events[0].audit_entry();
        assert_eq!(audit.action, AuditAction::Deleted);
        assert_eq!(audit.previous_value.as_deref(), Some("DRAFT"));

        assert!(execute(&mut offer, &delete).unwrap().is_empty());
        assert!(matches!(
            transition(&mut offer, OfferStage::Submitted),
            Err(OfferError::IllegalTransition {
                from: OfferStage::Draft,
                to: OfferStage::Submitted
            })
        ));
    }

    #[test]
    fn deleted_offer_lists_no_actions_and_cannot_expire() {
        let mut offer = created_offer(false);
        transition(&mut offer, OfferStage::Submitted).unwrap();
        execute(
            &mut offer,
            &OfferCommand::DeleteOffer(DeleteOffer {
                organization_id: ORG,
                offer_id: test_offer_id(),
                changed_by: AGENT.to_string(),
                occurred_at: later(10),
            }),
        )
        .unwrap();

        let actions = offer.available_actions();
        assert!(actions.transitions.is_empty());
        assert!(!actions.terminal_restart);

        let err = offer
            .handle(&OfferCommand::ExpireOffer(ExpireOffer {
                organization_id: ORG,
                offer_id: test_offer_id(),
                as_of: expiration().succ_opt().unwrap(),
                changed_by: "system".to_string(),
                occurred_at: later(60),
            }))
            .unwrap_err();
        assert!(matches!(err, OfferError::Domain(DomainError::InvariantViolation(_))));
        assert_eq!(offer.stage(), OfferStage::Submitted);
    }

    #[test]
    fn every_listed_action_can_be_applied() {
        for swap in [false, true] {
            for active in [true, false] {
                for stage in OfferStage::ALL {
                    let mut offer = created_offer(swap);
                    offer.stage = stage;
                    offer.active = active;

                    for target in OfferStage::ALL {
                        let listed = offer.available_actions().permits(target);
                        let applied = offer.apply_transition(target, AGENT, later(1));
                        assert_eq!(
                            listed,
                            applied.is_ok(),
                            "{stage} -> {target} (swap={swap}, active={active})"
                        );
                        if !listed {
                            assert!(matches!(applied, Err(OfferError::IllegalTransition { .. })));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn reactivation_goes_through_flags() {
        let mut offer = created_offer(false);
        execute(
            &mut offer,
            &OfferCommand::DeleteOffer(DeleteOffer {
                organization_id: ORG,
                offer_id: test_offer_id(),
                changed_by: AGENT.to_string(),
                occurred_at: later(1),
            }),
        )
        .unwrap();

        let events = execute(
            &mut offer,
            &OfferCommand::UpdateFlags(UpdateFlags {
                organization_id: ORG,
                offer_id: test_offer_id(),
                swap: true,
                active: true,
                changed_by: AGENT.to_string(),
                occurred_at: later(2),
            }),
        )
        .unwrap();

        assert!(offer.is_active());
        assert!(offer.swap());
        let audit = events[0].audit_entry();
        assert_eq!(audit.action, AuditAction::Updated);
        assert_eq!(audit.previous_value.as_deref(), Some("swap=false, active=false"));
        assert_eq!(audit.new_value.as_deref(), Some("swap=true, active=true"));
    }

    #[test]
    fn other_organizations_cannot_touch_the_offer() {
        let offer = created_offer(false);
        let err = offer
            .handle(&OfferCommand::ApplyTransition(ApplyTransition {
                organization_id: OrganizationId::new(2),
                offer_id: test_offer_id(),
                target: OfferStage::Submitted,
                changed_by: AGENT.to_string(),
                occurred_at: later(1),
            }))
            .unwrap_err();
        assert!(matches!(err, OfferError::Domain(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let offer = created_offer(false);
        let before = offer.clone();
        let cmd = OfferCommand::ApplyTransition(ApplyTransition {
            organization_id: ORG,
            offer_id: test_offer_id(),
            target: OfferStage::Submitted,
            changed_by: AGENT.to_string(),
            occurred_at: later(1),
        });

        let first = offer.handle(&cmd).unwrap();
        let second = offer.handle(&cmd).unwrap();
        assert_eq!(first, second);
        assert_eq!(offer, before);
    }

    #[test]
    fn events_survive_serialization_and_replay() {
        let mut offer = Offer::empty(test_offer_id());
        let mut history =
            execute(&mut offer, &OfferCommand::CreateOffer(create_cmd(true))).unwrap();
        history.extend(transition(&mut offer, OfferStage::Submitted).unwrap());
        history.extend(transition(&mut offer, OfferStage::CounterOffer).unwrap());

        let json = serde_json::to_string(&history).unwrap();
        let decoded: Vec<OfferEvent> = serde_json::from_str(&json).unwrap();

        let mut replayed = Offer::empty(test_offer_id());
        for ev in &decoded {
            replayed.apply(ev);
        }
        assert_eq!(replayed, offer);
        assert_eq!(replayed.version(), 3);
    }
}
