//! Rental lifecycle and vehicle availability engine.
//!
//! [`domain::RentalService`] drives bookings through
//! `active -> confirmed -> completed | cancelled` on top of a transactional
//! [`storage::RentalStore`], a [`payments::PaymentGateway`] and a
//! [`notifications::NotificationSink`].

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod notifications;
pub mod payments;
pub mod storage;

pub use config::RentalConfig;
pub use error::{ErrorCategory, RentalError, Result};
