use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::availability::BookingWindow;
use crate::domain::types::{RentalId, RentalStatus, UserId, VehicleId};
use crate::error::{RentalError, Result};

/// Vehicle as referenced by the rental core. Owned elsewhere; never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub license_plate: String,
    pub rental_rate_per_day: Decimal,
    /// Cleared when the vehicle is withdrawn from service.
    pub available: bool,
}

impl Vehicle {
    /// Checkout charges `days * rate`, so a fleet vehicle needs a positive rate.
    pub fn ensure_rentable(&self) -> Result<()> {
        if self.rental_rate_per_day <= Decimal::ZERO {
            return Err(RentalError::validation(format!(
                "rental rate per day must be positive, got {}",
                self.rental_rate_per_day
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.make, self.model, self.license_plate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    pub id: RentalId,
    pub user_id: UserId,
    pub vehicle_id: VehicleId,
    pub rental_start: DateTime<Utc>,
    pub rental_end: DateTime<Utc>,
    pub status: RentalStatus,
    /// Set from checkout onward.
    pub total_cost: Option<Decimal>,
    /// Payment intent of the checkout charge.
    pub payment_reference: Option<String>,
    /// Refund issued on cancellation of a paid rental.
    pub refund_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rental {
    pub fn book(
        user_id: UserId,
        vehicle_id: VehicleId,
        window: BookingWindow,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RentalId::new(),
            user_id,
            vehicle_id,
            rental_start: window.start,
            rental_end: window.end,
            status: RentalStatus::Active,
            total_cost: None,
            payment_reference: None,
            refund_reference: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn window(&self) -> BookingWindow {
        BookingWindow {
            start: self.rental_start,
            end: self.rental_end,
        }
    }

    pub fn ensure_status(&self, operation: &str, allowed: &[RentalStatus]) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(RentalError::InvalidState {
                operation: operation.to_string(),
                state: self.status.to_string(),
            })
        }
    }

    fn transition_to(
        &mut self,
        operation: &str,
        next: RentalStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RentalError::InvalidState {
                operation: operation.to_string(),
                state: self.status.to_string(),
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// active -> confirmed, recording the charge.
    pub fn confirm(
        &mut self,
        total_cost: Decimal,
        payment_reference: String,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.transition_to("checkout", RentalStatus::Confirmed, at)?;
        self.total_cost = Some(total_cost);
        self.payment_reference = Some(payment_reference);
        Ok(())
    }

    /// active | confirmed -> completed. `rental_end` becomes the actual return time.
    pub fn complete(&mut self, returned_at: DateTime<Utc>) -> Result<()> {
        self.ensure_status("return", &[RentalStatus::Active, RentalStatus::Confirmed])?;
        if returned_at <= self.rental_start {
            return Err(RentalError::validation(
                "a rental cannot be returned before it has started",
            ));
        }
        self.transition_to("return", RentalStatus::Completed, returned_at)?;
        self.rental_end = returned_at;
        Ok(())
    }

    /// Move `rental_end` forward. Status is unchanged.
    pub fn extend_to(
        &mut self,
        new_end: DateTime<Utc>,
        incremental_cost: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_status("extend", &[RentalStatus::Active, RentalStatus::Confirmed])?;
        if new_end <= self.rental_end {
            return Err(RentalError::validation(
                "the new rental end must be after the current rental end",
            ));
        }
        if let Some(incremental) = incremental_cost {
            let current = self.total_cost.unwrap_or(Decimal::ZERO);
            self.total_cost = Some(current + incremental);
        }
        self.rental_end = new_end;
        self.updated_at = at;
        Ok(())
    }

    /// active | confirmed -> cancelled.
    pub fn cancel(&mut self, refund: &RefundOutcome, at: DateTime<Utc>) -> Result<()> {
        self.transition_to("cancel", RentalStatus::Cancelled, at)?;
        if let RefundOutcome::Refunded { refund_id } = refund {
            self.refund_reference = Some(refund_id.clone());
        }
        Ok(())
    }

    /// Refund is due only for a paid rental with a recorded charge.
    pub fn refundable_payment(&self) -> Option<&str> {
        match self.status {
            RentalStatus::Confirmed => self.payment_reference.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Checkout,
    Extension,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Checkout => "checkout",
            PaymentKind::Extension => "extension",
        }
    }
}

impl std::str::FromStr for PaymentKind {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "checkout" => Ok(PaymentKind::Checkout),
            "extension" => Ok(PaymentKind::Extension),
            other => Err(RentalError::validation(format!(
                "unknown payment kind '{other}'"
            ))),
        }
    }
}

/// One successful gateway charge against a rental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub rental_id: RentalId,
    pub intent_id: String,
    pub amount: Decimal,
    pub kind: PaymentKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefundOutcome {
    /// The rental was never paid.
    NotRequired,
    Refunded { refund_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub rental: Rental,
    pub refund: RefundOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub rental: Rental,
    /// `None` when the rental is not yet paid; checkout bills the whole window later.
    pub charge: Option<PaymentRecord>,
}
