//! Payment gateway contract consumed by the rental lifecycle.

pub mod stripe;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::RentalError;

pub use stripe::StripeGateway;

/// Free-form key/value pairs attached to a payment intent.
pub type PaymentMetadata = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub intent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
}

/// Rejection or transport failure reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub message: String,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<GatewayError> for RentalError {
    fn from(err: GatewayError) -> Self {
        RentalError::Payment {
            message: err.message,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount` (major currency units). Never retried by the caller.
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn refund(&self, intent_id: &str) -> Result<RefundReceipt, GatewayError>;
}

/// Convert a two-decimal amount into integer minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount.checked_mul(Decimal::ONE_HUNDRED)?.round().to_i64()
}

/// Amounts the gateway can be asked to charge: strictly positive and
/// representable in minor units.
pub fn ensure_chargeable(amount: Decimal) -> Result<i64, RentalError> {
    match to_minor_units(amount) {
        Some(minor) if minor > 0 => Ok(minor),
        _ => Err(RentalError::AmountOutOfRange { amount }),
    }
}
