//! Persistence contract of the rental core.
//!
//! Every operation runs inside one [`RentalUnitOfWork`]. Dropping a unit of
//! work without calling [`RentalUnitOfWork::commit`] discards all of its writes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::availability::{BookedWindow, BookingWindow};
use crate::domain::rentals::{PaymentRecord, Rental, UserProfile, Vehicle};
use crate::domain::reports::{DamageReport, Review};
use crate::domain::types::{RentalId, TenantId, UserId, VehicleId};
use crate::error::Result;

pub use memory::MemoryRentalStore;
pub use postgres::PgRentalStore;

#[async_trait]
pub trait RentalStore: Send + Sync {
    /// Open a unit of work scoped to `tenant`.
    async fn begin(&self, tenant: &TenantId) -> Result<Box<dyn RentalUnitOfWork>>;
}

#[async_trait]
pub trait RentalUnitOfWork: Send {
    async fn get_vehicle(&mut self, id: &VehicleId) -> Result<Option<Vehicle>>;

    /// Read the vehicle and hold a write lock on it until the unit of work ends.
    ///
    /// Claims on a vehicle's calendar take this lock first, which serializes
    /// concurrent bookings of the same vehicle.
    async fn lock_vehicle(&mut self, id: &VehicleId) -> Result<Option<Vehicle>>;

    async fn get_user(&mut self, id: &UserId) -> Result<Option<UserProfile>>;

    async fn get_rental(&mut self, id: &RentalId) -> Result<Option<Rental>>;

    /// Read the rental and hold a write lock on it until the unit of work ends.
    async fn lock_rental(&mut self, id: &RentalId) -> Result<Option<Rental>>;

    /// Non-terminal bookings of `vehicle_id` that may overlap `around`.
    async fn bookings_for_vehicle(
        &mut self,
        vehicle_id: &VehicleId,
        around: &BookingWindow,
    ) -> Result<Vec<BookedWindow>>;

    /// All rentals of a user, newest `rental_start` first.
    async fn rentals_for_user(&mut self, user_id: &UserId) -> Result<Vec<Rental>>;

    async fn insert_rental(&mut self, rental: &Rental) -> Result<()>;

    async fn update_rental(&mut self, rental: &Rental) -> Result<()>;

    async fn record_payment(&mut self, payment: &PaymentRecord) -> Result<()>;

    async fn payments_for_rental(&mut self, rental_id: &RentalId) -> Result<Vec<PaymentRecord>>;

    async fn insert_damage_report(&mut self, report: &DamageReport) -> Result<()>;

    async fn damage_reports_for_rental(&mut self, rental_id: &RentalId)
        -> Result<Vec<DamageReport>>;

    /// Fails with `Conflict` if the rental already has a review.
    async fn insert_review(&mut self, review: &Review) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
