pub mod availability;
pub mod cost;
pub mod lifecycle;
pub mod rentals;
pub mod reports;
pub mod types;

pub use availability::{AvailabilityChecker, BookedWindow, BookingWindow};
pub use lifecycle::{NewRental, RentalOperations, RentalService};
pub use rentals::{
    Cancellation, Extension, PaymentKind, PaymentRecord, RefundOutcome, Rental, UserProfile,
    Vehicle,
};
pub use reports::{DamageReport, NewDamageReport, NewReview, Review};
pub use types::{
    Actor, DamageReportId, RentalId, RentalStatus, RequestContext, ReviewId, TenantId, UserId,
    VehicleId,
};
