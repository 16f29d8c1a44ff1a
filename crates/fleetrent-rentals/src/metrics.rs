//! Counters emitted through the `metrics` facade. Installing a recorder
//! (exporter) is left to the embedding process.

use metrics::{counter, describe_counter, Unit};

use crate::domain::rentals::PaymentKind;
use crate::error::ErrorCategory;

pub const TRANSITIONS_TOTAL: &str = "fleetrent_rentals_transitions_total";
pub const REJECTIONS_TOTAL: &str = "fleetrent_rentals_rejections_total";
pub const PAYMENTS_TOTAL: &str = "fleetrent_payments_total";
pub const NOTIFICATIONS_DROPPED_TOTAL: &str = "fleetrent_notifications_dropped_total";

pub fn describe_metrics() {
    describe_counter!(
        TRANSITIONS_TOTAL,
        Unit::Count,
        "Rental lifecycle operations that committed, by transition"
    );
    describe_counter!(
        REJECTIONS_TOTAL,
        Unit::Count,
        "Rental operations that failed, by operation and error category"
    );
    describe_counter!(
        PAYMENTS_TOTAL,
        Unit::Count,
        "Payment gateway calls, by kind and outcome"
    );
    describe_counter!(
        NOTIFICATIONS_DROPPED_TOTAL,
        Unit::Count,
        "Lifecycle notifications that could not be handed to the sink"
    );
}

pub fn record_transition(transition: &'static str) {
    counter!(TRANSITIONS_TOTAL, "transition" => transition).increment(1);
}

pub fn record_rejection(operation: &'static str, category: ErrorCategory) {
    counter!(
        REJECTIONS_TOTAL,
        "operation" => operation,
        "category" => category.as_str()
    )
    .increment(1);
}

/// `kind` is a [`PaymentKind`] label or `"refund"`.
pub fn record_payment(kind: &'static str, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    counter!(PAYMENTS_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_charge(kind: PaymentKind, succeeded: bool) {
    record_payment(kind.as_str(), succeeded);
}

pub fn record_notification_dropped() {
    counter!(NOTIFICATIONS_DROPPED_TOTAL).increment(1);
}
