//! Application facade over the offer aggregate.
//!
//! Every mutating call goes through the [`CommandDispatcher`], so a change, its
//! audit record and its publication share one append.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use propcrm_core::{
    AggregateId, Currency, ExpectedVersion, Money, OpportunityId, OrganizationId, Percentage,
    PropertyId, ProspectId, UserId,
};
use propcrm_events::{EventBus, EventEnvelope};
use propcrm_offers::{
    AGGREGATE_TYPE, ApplyTransition, AuditLog, AvailableActions, ChangeAmount, ChangeCommission,
    ChangeExpirationDate, ChangeObservation, CreateOffer, DeleteOffer, ExpireOffer, Offer,
    OfferCommand, OfferId, OfferStage, Reassign, UpdateFlags,
};

use crate::audit_trail::read_audit_log;
use crate::command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use crate::config::Config;
use crate::event_store::EventStore;

/// Who is acting, for which organization, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub organization_id: OrganizationId,
    pub user_name: String,
    pub occurred_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(organization_id: OrganizationId, user_name: impl Into<String>) -> Self {
        Self::at(organization_id, user_name, Utc::now())
    }

    pub fn at(
        organization_id: OrganizationId,
        user_name: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            organization_id,
            user_name: user_name.into(),
            occurred_at,
        }
    }
}

/// Input for [`OfferService::create_offer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOffer {
    pub opportunity_id: OpportunityId,
    pub property_id: PropertyId,
    pub prospect_id: ProspectId,
    pub agent_id: UserId,
    pub supervisor_id: Option<UserId>,
    pub amount: Money,
    /// `None` takes the configured default commission.
    pub commission: Option<Percentage>,
    pub expiration_date: NaiveDate,
    pub swap: bool,
    pub observation: Option<String>,
}

pub struct OfferService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    config: Config,
    next_offer_id: AtomicU64,
}

impl<S, B> OfferService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>, config: Config) -> Self {
        Self {
            dispatcher,
            config,
            next_offer_id: AtomicU64::new(1),
        }
    }

    /// Start id allocation at `first` (ids below it belong to existing offers).
    pub fn with_first_offer_id(self, first: u64) -> Self {
        self.next_offer_id.store(first, Ordering::SeqCst);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    /// Parse a form amount; the configured default currency applies when none is given.
    pub fn parse_amount(
        &self,
        text: &str,
        currency: Option<Currency>,
    ) -> Result<Money, DispatchError> {
        let currency = currency.unwrap_or(self.config.default_currency);
        Ok(Money::parse(text, currency)?)
    }

    pub fn create_offer(
        &self,
        ctx: &RequestContext,
        new: NewOffer,
    ) -> Result<Offer, DispatchError> {
        let next = self.next_offer_id.fetch_add(1, Ordering::SeqCst);
        let offer_id = OfferId::new(AggregateId::new(next));

        let command = OfferCommand::CreateOffer(CreateOffer {
            organization_id: ctx.organization_id,
            offer_id,
            opportunity_id: new.opportunity_id,
            property_id: new.property_id,
            prospect_id: new.prospect_id,
            agent_id: new.agent_id,
            supervisor_id: new.supervisor_id,
            amount: new.amount,
            commission: new.commission.unwrap_or(self.config.default_commission),
            expiration_date: new.expiration_date,
            swap: new.swap,
            observation: new.observation,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });

        let out = self.run(ctx, offer_id, command, ExpectedVersion::Exact(0))?;
        info!(
            organization_id = %ctx.organization_id,
            offer_id = %offer_id,
            amount = %out.aggregate.amount(),
            "offer created"
        );
        Ok(out.aggregate)
    }

    pub fn get(
        &self,
        organization_id: OrganizationId,
        offer_id: OfferId,
    ) -> Result<Offer, DispatchError> {
        let offer: Offer = self
            .dispatcher
            .load(organization_id, offer_id.0, |_, id| Offer::empty(OfferId::new(id)))?;
        if !offer.is_created() {
            return Err(DispatchError::NotFound);
        }
        Ok(offer)
    }

    pub fn available_actions(
        &self,
        organization_id: OrganizationId,
        offer_id: OfferId,
    ) -> Result<AvailableActions, DispatchError> {
        Ok(self.get(organization_id, offer_id)?.available_actions())
    }

    /// Move an offer to `target`. `expected` is the version the caller last saw.
    ///
    /// Returns the updated offer and its `STATE_CHANGE` audit record. An illegal
    /// target leaves the offer and its audit log untouched.
    pub fn apply_transition(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        target: OfferStage,
        expected: ExpectedVersion,
    ) -> Result<(Offer, AuditLog), DispatchError> {
        let command = OfferCommand::ApplyTransition(ApplyTransition {
            organization_id: ctx.organization_id,
            offer_id,
            target,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });

        let out = self.run(ctx, offer_id, command, expected).inspect_err(|err| {
            if let DispatchError::IllegalTransition { from, to } = err {
                warn!(
                    organization_id = %ctx.organization_id,
                    offer_id = %offer_id,
                    %from,
                    %to,
                    "transition rejected"
                );
            }
        })?;
        let audit = last_audit(&out)?;
        info!(
            organization_id = %ctx.organization_id,
            offer_id = %offer_id,
            from = audit.previous_value.as_deref().unwrap_or_default(),
            to = %target,
            user = %ctx.user_name,
            "offer stage changed"
        );
        Ok((out.aggregate, audit))
    }

    /// Same as [`OfferService::apply_transition`] for a stage given by its wire name.
    pub fn apply_transition_named(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        target: &str,
        expected: ExpectedVersion,
    ) -> Result<(Offer, AuditLog), DispatchError> {
        let target: OfferStage = target.parse()?;
        self.apply_transition(ctx, offer_id, target, expected)
    }

    pub fn change_amount(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        amount: Money,
    ) -> Result<Offer, DispatchError> {
        let command = OfferCommand::ChangeAmount(ChangeAmount {
            organization_id: ctx.organization_id,
            offer_id,
            amount,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });
        self.edit(ctx, offer_id, command)
    }

    pub fn change_commission(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        commission: Percentage,
    ) -> Result<Offer, DispatchError> {
        let command = OfferCommand::ChangeCommission(ChangeCommission {
            organization_id: ctx.organization_id,
            offer_id,
            commission,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });
        self.edit(ctx, offer_id, command)
    }

    pub fn change_observation(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        observation: Option<String>,
    ) -> Result<Offer, DispatchError> {
        let command = OfferCommand::ChangeObservation(ChangeObservation {
            organization_id: ctx.organization_id,
            offer_id,
            observation,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });
        self.edit(ctx, offer_id, command)
    }

    pub fn change_expiration_date(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        expiration_date: NaiveDate,
    ) -> Result<Offer, DispatchError> {
        let command = OfferCommand::ChangeExpirationDate(ChangeExpirationDate {
            organization_id: ctx.organization_id,
            offer_id,
            expiration_date,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });
        self.edit(ctx, offer_id, command)
    }

    pub fn reassign(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        agent_id: UserId,
        supervisor_id: Option<UserId>,
    ) -> Result<Offer, DispatchError> {
        let command = OfferCommand::Reassign(Reassign {
            organization_id: ctx.organization_id,
            offer_id,
            agent_id,
            supervisor_id,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });
        self.edit(ctx, offer_id, command)
    }

    pub fn update_flags(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        swap: bool,
        active: bool,
    ) -> Result<Offer, DispatchError> {
        let command = OfferCommand::UpdateFlags(UpdateFlags {
            organization_id: ctx.organization_id,
            offer_id,
            swap,
            active,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });
        self.edit(ctx, offer_id, command)
    }

    /// Move an offer past its expiration date to `EXPIRED`.
    pub fn expire(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        as_of: NaiveDate,
    ) -> Result<Offer, DispatchError> {
        let command = OfferCommand::ExpireOffer(ExpireOffer {
            organization_id: ctx.organization_id,
            offer_id,
            as_of,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });
        let out = self.run(ctx, offer_id, command, ExpectedVersion::Any)?;
        info!(
            organization_id = %ctx.organization_id,
            offer_id = %offer_id,
            %as_of,
            "offer expired"
        );
        Ok(out.aggregate)
    }

    /// Soft delete: the offer stays in its stage, deactivated.
    pub fn delete(&self, ctx: &RequestContext, offer_id: OfferId) -> Result<Offer, DispatchError> {
        let command = OfferCommand::DeleteOffer(DeleteOffer {
            organization_id: ctx.organization_id,
            offer_id,
            changed_by: ctx.user_name.clone(),
            occurred_at: ctx.occurred_at,
        });
        let out = self.run(ctx, offer_id, command, ExpectedVersion::Any)?;
        if !out.events.is_empty() {
            info!(organization_id = %ctx.organization_id, offer_id = %offer_id, "offer deleted");
        }
        Ok(out.aggregate)
    }

    /// Start a new `DRAFT` offer from a terminal one.
    ///
    /// The new offer keeps the parties, amount, commission and swap flag of
    /// the old one. The old offer is not touched.
    pub fn restart(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        expiration_date: NaiveDate,
    ) -> Result<Offer, DispatchError> {
        let previous = self.get(ctx.organization_id, offer_id)?;
        if !previous.available_actions().terminal_restart {
            return Err(DispatchError::InvariantViolation(format!(
                "offer {offer_id} is still open in stage {}",
                previous.stage()
            )));
        }

        let offer = self.create_offer(
            ctx,
            NewOffer {
                opportunity_id: previous.opportunity_id(),
                property_id: previous.property_id(),
                prospect_id: previous.prospect_id(),
                agent_id: previous.agent_id(),
                supervisor_id: previous.supervisor_id(),
                amount: previous.amount(),
                commission: Some(previous.commission()),
                expiration_date,
                swap: previous.swap(),
                observation: Some(format!("Restarted from offer {offer_id}")),
            },
        )?;
        info!(
            organization_id = %ctx.organization_id,
            from_offer = %offer_id,
            offer_id = %offer.id_typed(),
            "offer restarted"
        );
        Ok(offer)
    }

    /// Audit records of an offer, oldest first.
    pub fn audit_log(
        &self,
        organization_id: OrganizationId,
        offer_id: OfferId,
    ) -> Result<Vec<AuditLog>, DispatchError> {
        read_audit_log(self.dispatcher.store(), organization_id, offer_id)
    }

    fn edit(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        command: OfferCommand,
    ) -> Result<Offer, DispatchError> {
        let out = self.run(ctx, offer_id, command, ExpectedVersion::Any)?;
        if let Some(audit) = out.events.last().map(|ev| ev.audit_entry()) {
            info!(
                organization_id = %ctx.organization_id,
                offer_id = %offer_id,
                action = %audit.action,
                user = %audit.user_name,
                "offer updated"
            );
        }
        Ok(out.aggregate)
    }

    fn run(
        &self,
        ctx: &RequestContext,
        offer_id: OfferId,
        command: OfferCommand,
        expected: ExpectedVersion,
    ) -> Result<Dispatched<Offer>, DispatchError> {
        self.dispatcher.dispatch_expecting(
            ctx.organization_id,
            offer_id.0,
            AGGREGATE_TYPE,
            command,
            expected,
            |_, id| Offer::empty(OfferId::new(id)),
        )
    }
}

fn last_audit(out: &Dispatched<Offer>) -> Result<AuditLog, DispatchError> {
    out.events
        .last()
        .map(|ev| ev.audit_entry())
        .ok_or_else(|| {
            DispatchError::InvariantViolation("transition produced no event".to_string())
        })
}
