//! Rental lifecycle operations.
//!
//! Every operation runs in a single unit of work. Rows are locked before
//! they are inspected, the payment gateway is called before anything is
//! written, and nothing is persisted unless the whole operation succeeds.
//! Notifications go out only after commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::BookingPolicy;
use crate::domain::availability::{AvailabilityChecker, BookingWindow};
use crate::domain::cost::{rental_cost, span_exceeds};
use crate::domain::rentals::{
    Cancellation, Extension, PaymentKind, PaymentRecord, RefundOutcome, Rental,
};
use crate::domain::reports::{DamageReport, NewDamageReport, NewReview, Review};
use crate::domain::types::{RentalId, RentalStatus, RequestContext, UserId, VehicleId};
use crate::error::{RentalError, Result};
use crate::metrics;
use crate::notifications::{EventKind, NotificationSink, RentalEvent};
use crate::payments::{ensure_chargeable, PaymentGateway, PaymentIntent, PaymentMetadata};
use crate::storage::{RentalStore, RentalUnitOfWork};

/// Booking request. `user_id` is the customer the rental is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRental {
    pub user_id: UserId,
    pub vehicle_id: VehicleId,
    pub rental_start: DateTime<Utc>,
    pub rental_end: DateTime<Utc>,
}

#[async_trait]
pub trait RentalOperations: Send + Sync {
    async fn create_rental(&self, ctx: &RequestContext, request: NewRental) -> Result<Rental>;

    async fn checkout(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Rental>;

    async fn return_vehicle(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Rental>;

    async fn extend(
        &self,
        ctx: &RequestContext,
        rental_id: &RentalId,
        new_end: DateTime<Utc>,
    ) -> Result<Extension>;

    async fn cancel(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Cancellation>;

    async fn get_rental(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Rental>;

    /// Rentals of `user_id`, latest start first.
    async fn rental_history(&self, ctx: &RequestContext, user_id: &UserId) -> Result<Vec<Rental>>;

    async fn payment_history(
        &self,
        ctx: &RequestContext,
        rental_id: &RentalId,
    ) -> Result<Vec<PaymentRecord>>;

    async fn report_damage(
        &self,
        ctx: &RequestContext,
        report: NewDamageReport,
    ) -> Result<DamageReport>;

    async fn list_damage_reports(
        &self,
        ctx: &RequestContext,
        rental_id: &RentalId,
    ) -> Result<Vec<DamageReport>>;

    async fn create_review(&self, ctx: &RequestContext, review: NewReview) -> Result<Review>;
}

pub struct RentalService {
    store: Arc<dyn RentalStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationSink>,
    availability: AvailabilityChecker,
    currency: String,
    policy: BookingPolicy,
}

impl RentalService {
    pub fn new(
        store: Arc<dyn RentalStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            availability: AvailabilityChecker,
            currency: "usd".to_string(),
            policy: BookingPolicy::default(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_booking_policy(mut self, policy: BookingPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn observe<T>(operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            metrics::record_rejection(operation, e.category());
            debug!(operation, code = e.error_code(), "Rental operation rejected: {}", e);
        }
        result
    }

    fn ensure_within_policy(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        if span_exceeds(start, end, self.policy.max_rental_days) {
            return Err(RentalError::validation(format!(
                "rentals may not exceed {} days",
                self.policy.max_rental_days
            )));
        }
        Ok(())
    }

    async fn locked_rental(
        uow: &mut dyn RentalUnitOfWork,
        ctx: &RequestContext,
        rental_id: &RentalId,
    ) -> Result<Rental> {
        let rental = uow
            .lock_rental(rental_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Rental", rental_id))?;
        ctx.ensure_may_act_for(&rental.user_id)?;
        Ok(rental)
    }

    async fn readable_rental(
        uow: &mut dyn RentalUnitOfWork,
        ctx: &RequestContext,
        rental_id: &RentalId,
    ) -> Result<Rental> {
        let rental = uow
            .get_rental(rental_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Rental", rental_id))?;
        ctx.ensure_may_act_for(&rental.user_id)?;
        Ok(rental)
    }

    async fn charge(
        &self,
        ctx: &RequestContext,
        rental: &Rental,
        amount: Decimal,
        kind: PaymentKind,
    ) -> Result<PaymentIntent> {
        ensure_chargeable(amount)?;
        let metadata = PaymentMetadata::from([
            ("tenant".to_string(), ctx.tenant.to_string()),
            ("rental_id".to_string(), rental.id.to_string()),
            ("kind".to_string(), kind.as_str().to_string()),
        ]);

        match self
            .gateway
            .create_payment_intent(amount, &self.currency, &metadata)
            .await
        {
            Ok(intent) => {
                metrics::record_charge(kind, true);
                Ok(intent)
            }
            Err(e) => {
                metrics::record_charge(kind, false);
                warn!(rental_id = %rental.id, kind = kind.as_str(), %amount, "Payment failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Commit after money has moved. A failure here leaves a charge or refund
    /// without a matching record, so it is logged for manual reconciliation.
    async fn commit_after_gateway(
        uow: Box<dyn RentalUnitOfWork>,
        rental_id: &RentalId,
        gateway_reference: &str,
    ) -> Result<()> {
        uow.commit().await.map_err(|e| {
            error!(
                %rental_id,
                gateway_reference,
                "Gateway call succeeded but the rental could not be saved: {}",
                e
            );
            e
        })
    }

    fn notify(&self, kind: EventKind, ctx: &RequestContext, rental: &Rental, contact: Option<String>) {
        let Some(contact_email) = contact else {
            warn!(rental_id = %rental.id, %kind, "No contact for rental owner, notification skipped");
            metrics::record_notification_dropped();
            return;
        };
        let event = RentalEvent {
            kind,
            tenant: ctx.tenant.clone(),
            rental_id: rental.id,
            user_id: rental.user_id,
            contact_email,
            occurred_at: ctx.at,
        };
        if let Err(e) = self.notifier.notify(&event) {
            metrics::record_notification_dropped();
            warn!(rental_id = %rental.id, %kind, "Failed to queue notification: {}", e);
        }
    }

    async fn do_create(&self, ctx: &RequestContext, request: NewRental) -> Result<Rental> {
        let window = BookingWindow::new(request.rental_start, request.rental_end)?;
        if window.start < ctx.at {
            return Err(RentalError::validation(
                "rental start cannot be in the past",
            ));
        }
        self.ensure_within_policy(window.start, window.end)?;
        ctx.ensure_may_act_for(&request.user_id)?;

        let mut uow = self.store.begin(&ctx.tenant).await?;
        let user = uow
            .get_user(&request.user_id)
            .await?
            .ok_or_else(|| RentalError::not_found("User", request.user_id))?;
        let vehicle = uow
            .lock_vehicle(&request.vehicle_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Vehicle", request.vehicle_id))?;
        if !vehicle.available {
            return Err(RentalError::conflict(format!(
                "vehicle {} is not available for rental",
                vehicle.id
            )));
        }
        if !self
            .availability
            .is_available(&mut *uow, &vehicle.id, &window, None)
            .await?
        {
            return Err(RentalError::conflict(format!(
                "vehicle {} is already booked during {}",
                vehicle.id, window
            )));
        }

        let rental = Rental::book(user.id, vehicle.id, window, ctx.at);
        uow.insert_rental(&rental).await?;
        uow.commit().await?;

        metrics::record_transition("create");
        info!(
            tenant = %ctx.tenant,
            rental_id = %rental.id,
            vehicle_id = %rental.vehicle_id,
            window = %window,
            "Rental booked"
        );
        self.notify(EventKind::BookingConfirmed, ctx, &rental, Some(user.email));
        Ok(rental)
    }

    async fn do_checkout(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Rental> {
        let mut uow = self.store.begin(&ctx.tenant).await?;
        let mut rental = Self::locked_rental(&mut *uow, ctx, rental_id).await?;
        rental.ensure_status("checkout", &[RentalStatus::Active])?;

        let vehicle = uow
            .get_vehicle(&rental.vehicle_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Vehicle", rental.vehicle_id))?;
        let amount = rental_cost(
            rental.rental_start,
            rental.rental_end,
            vehicle.rental_rate_per_day,
        );

        let intent = self
            .charge(ctx, &rental, amount, PaymentKind::Checkout)
            .await?;
        rental.confirm(amount, intent.intent_id.clone(), ctx.at)?;
        uow.update_rental(&rental).await?;
        uow.record_payment(&PaymentRecord {
            rental_id: rental.id,
            intent_id: intent.intent_id.clone(),
            amount,
            kind: PaymentKind::Checkout,
            created_at: ctx.at,
        })
        .await?;
        Self::commit_after_gateway(uow, &rental.id, &intent.intent_id).await?;

        metrics::record_transition("checkout");
        info!(
            tenant = %ctx.tenant,
            rental_id = %rental.id,
            %amount,
            intent_id = %intent.intent_id,
            "Rental confirmed"
        );
        Ok(rental)
    }

    async fn do_return(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Rental> {
        let mut uow = self.store.begin(&ctx.tenant).await?;
        let mut rental = Self::locked_rental(&mut *uow, ctx, rental_id).await?;
        rental.complete(ctx.at)?;
        uow.update_rental(&rental).await?;
        let contact = uow.get_user(&rental.user_id).await?.map(|u| u.email);
        uow.commit().await?;

        metrics::record_transition("return");
        info!(tenant = %ctx.tenant, rental_id = %rental.id, "Rental completed");
        self.notify(EventKind::RentalCompleted, ctx, &rental, contact);
        Ok(rental)
    }

    async fn do_extend(
        &self,
        ctx: &RequestContext,
        rental_id: &RentalId,
        new_end: DateTime<Utc>,
    ) -> Result<Extension> {
        let mut uow = self.store.begin(&ctx.tenant).await?;
        let mut rental = Self::locked_rental(&mut *uow, ctx, rental_id).await?;
        rental.ensure_status("extend", &[RentalStatus::Active, RentalStatus::Confirmed])?;
        if new_end <= rental.rental_end {
            return Err(RentalError::validation(
                "the new rental end must be after the current rental end",
            ));
        }
        self.ensure_within_policy(rental.rental_start, new_end)?;
        let delta = BookingWindow::new(rental.rental_end, new_end)?;

        let vehicle = uow
            .lock_vehicle(&rental.vehicle_id)
            .await?
            .ok_or_else(|| RentalError::not_found("Vehicle", rental.vehicle_id))?;
        if !self
            .availability
            .is_available(&mut *uow, &vehicle.id, &delta, Some(rental.id))
            .await?
        {
            return Err(RentalError::conflict(format!(
                "vehicle {} is already booked during {}",
                vehicle.id, delta
            )));
        }

        // Unpaid rentals are billed for the whole window at checkout.
        let charge = if rental.status == RentalStatus::Confirmed {
            let amount = rental_cost(delta.start, delta.end, vehicle.rental_rate_per_day);
            let intent = self
                .charge(ctx, &rental, amount, PaymentKind::Extension)
                .await?;
            Some(PaymentRecord {
                rental_id: rental.id,
                intent_id: intent.intent_id,
                amount,
                kind: PaymentKind::Extension,
                created_at: ctx.at,
            })
        } else {
            None
        };

        rental.extend_to(new_end, charge.as_ref().map(|c| c.amount), ctx.at)?;
        uow.update_rental(&rental).await?;
        match &charge {
            Some(payment) => {
                uow.record_payment(payment).await?;
                Self::commit_after_gateway(uow, &rental.id, &payment.intent_id).await?;
            }
            None => uow.commit().await?,
        }

        metrics::record_transition("extend");
        info!(
            tenant = %ctx.tenant,
            rental_id = %rental.id,
            rental_end = %rental.rental_end,
            charged = charge.is_some(),
            "Rental extended"
        );
        Ok(Extension { rental, charge })
    }

    async fn do_cancel(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Cancellation> {
        let mut uow = self.store.begin(&ctx.tenant).await?;
        let mut rental = Self::locked_rental(&mut *uow, ctx, rental_id).await?;
        rental.ensure_status("cancel", &[RentalStatus::Active, RentalStatus::Confirmed])?;

        let refund = match rental.refundable_payment().map(str::to_string) {
            Some(intent_id) => match self.gateway.refund(&intent_id).await {
                Ok(receipt) => {
                    metrics::record_payment("refund", true);
                    RefundOutcome::Refunded {
                        refund_id: receipt.refund_id,
                    }
                }
                Err(e) => {
                    metrics::record_payment("refund", false);
                    warn!(rental_id = %rental.id, %intent_id, "Refund failed: {}", e);
                    return Err(e.into());
                }
            },
            None => RefundOutcome::NotRequired,
        };

        rental.cancel(&refund, ctx.at)?;
        uow.update_rental(&rental).await?;
        let contact = uow.get_user(&rental.user_id).await?.map(|u| u.email);
        match &refund {
            RefundOutcome::Refunded { refund_id } => {
                Self::commit_after_gateway(uow, &rental.id, refund_id).await?
            }
            RefundOutcome::NotRequired => uow.commit().await?,
        }

        metrics::record_transition("cancel");
        info!(tenant = %ctx.tenant, rental_id = %rental.id, ?refund, "Rental cancelled");
        self.notify(EventKind::RentalCancelled, ctx, &rental, contact);
        Ok(Cancellation { rental, refund })
    }

    async fn do_report_damage(
        &self,
        ctx: &RequestContext,
        report: NewDamageReport,
    ) -> Result<DamageReport> {
        let mut uow = self.store.begin(&ctx.tenant).await?;
        Self::readable_rental(&mut *uow, ctx, &report.rental_id).await?;
        let report = report.into_report(ctx.actor.user_id, ctx.at)?;
        uow.insert_damage_report(&report).await?;
        uow.commit().await?;

        info!(
            tenant = %ctx.tenant,
            rental_id = %report.rental_id,
            report_id = %report.id,
            "Damage reported"
        );
        Ok(report)
    }

    async fn do_create_review(&self, ctx: &RequestContext, review: NewReview) -> Result<Review> {
        let mut uow = self.store.begin(&ctx.tenant).await?;
        let rental = Self::readable_rental(&mut *uow, ctx, &review.rental_id).await?;
        if rental.status != RentalStatus::Completed {
            return Err(RentalError::validation(format!(
                "only completed rentals can be reviewed, rental {} is {}",
                rental.id, rental.status
            )));
        }
        let review = review.into_review(ctx.actor.user_id, ctx.at)?;
        uow.insert_review(&review).await?;
        uow.commit().await?;

        info!(
            tenant = %ctx.tenant,
            rental_id = %review.rental_id,
            rating = review.rating,
            "Review created"
        );
        Ok(review)
    }
}

#[async_trait]
impl RentalOperations for RentalService {
    async fn create_rental(&self, ctx: &RequestContext, request: NewRental) -> Result<Rental> {
        Self::observe("create", self.do_create(ctx, request).await)
    }

    async fn checkout(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Rental> {
        Self::observe("checkout", self.do_checkout(ctx, rental_id).await)
    }

    async fn return_vehicle(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Rental> {
        Self::observe("return", self.do_return(ctx, rental_id).await)
    }

    async fn extend(
        &self,
        ctx: &RequestContext,
        rental_id: &RentalId,
        new_end: DateTime<Utc>,
    ) -> Result<Extension> {
        Self::observe("extend", self.do_extend(ctx, rental_id, new_end).await)
    }

    async fn cancel(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Cancellation> {
        Self::observe("cancel", self.do_cancel(ctx, rental_id).await)
    }

    async fn get_rental(&self, ctx: &RequestContext, rental_id: &RentalId) -> Result<Rental> {
        let mut uow = self.store.begin(&ctx.tenant).await?;
        Self::readable_rental(&mut *uow, ctx, rental_id).await
    }

    async fn rental_history(&self, ctx: &RequestContext, user_id: &UserId) -> Result<Vec<Rental>> {
        ctx.ensure_may_act_for(user_id)?;
        let mut uow = self.store.begin(&ctx.tenant).await?;
        if uow.get_user(user_id).await?.is_none() {
            return Err(RentalError::not_found("User", user_id));
        }
        uow.rentals_for_user(user_id).await
    }

    async fn payment_history(
        &self,
        ctx: &RequestContext,
        rental_id: &RentalId,
    ) -> Result<Vec<PaymentRecord>> {
        let mut uow = self.store.begin(&ctx.tenant).await?;
        Self::readable_rental(&mut *uow, ctx, rental_id).await?;
        uow.payments_for_rental(rental_id).await
    }

    async fn report_damage(
        &self,
        ctx: &RequestContext,
        report: NewDamageReport,
    ) -> Result<DamageReport> {
        Self::observe("report_damage", self.do_report_damage(ctx, report).await)
    }

    async fn list_damage_reports(
        &self,
        ctx: &RequestContext,
        rental_id: &RentalId,
    ) -> Result<Vec<DamageReport>> {
        let mut uow = self.store.begin(&ctx.tenant).await?;
        Self::readable_rental(&mut *uow, ctx, rental_id).await?;
        uow.damage_reports_for_rental(rental_id).await
    }

    async fn create_review(&self, ctx: &RequestContext, review: NewReview) -> Result<Review> {
        Self::observe("review", self.do_create_review(ctx, review).await)
    }
}
