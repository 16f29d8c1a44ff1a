use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::availability::{BookedWindow, BookingWindow};
use crate::domain::rentals::{PaymentRecord, Rental, UserProfile, Vehicle};
use crate::domain::reports::{DamageReport, Review};
use crate::domain::types::{RentalId, TenantId, UserId, VehicleId};
use crate::error::{RentalError, Result};
use crate::storage::{RentalStore, RentalUnitOfWork};

#[derive(Debug, Clone, Default)]
struct TenantData {
    vehicles: HashMap<VehicleId, Vehicle>,
    users: HashMap<UserId, UserProfile>,
    rentals: HashMap<RentalId, Rental>,
    payments: Vec<PaymentRecord>,
    damage_reports: Vec<DamageReport>,
    reviews: HashMap<RentalId, Review>,
}

type TenantSlot = Arc<Mutex<TenantData>>;

/// Process-local store.
///
/// Each tenant has its own lock. A unit of work owns its tenant's lock from
/// `begin` until commit or drop and works on a copy of the tenant's data, so
/// units of work within a tenant are serialized and an abandoned one leaves
/// no trace.
#[derive(Clone, Default)]
pub struct MemoryRentalStore {
    tenants: Arc<Mutex<HashMap<TenantId, TenantSlot>>>,
}

impl MemoryRentalStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, tenant: &TenantId) -> TenantSlot {
        let mut tenants = self.tenants.lock().await;
        tenants.entry(tenant.clone()).or_default().clone()
    }

    pub async fn register_vehicle(&self, tenant: &TenantId, vehicle: Vehicle) {
        let slot = self.slot(tenant).await;
        slot.lock().await.vehicles.insert(vehicle.id, vehicle);
    }

    pub async fn register_user(&self, tenant: &TenantId, user: UserProfile) {
        let slot = self.slot(tenant).await;
        slot.lock().await.users.insert(user.id, user);
    }

    pub async fn rental(&self, tenant: &TenantId, id: &RentalId) -> Option<Rental> {
        let slot = self.slot(tenant).await;
        let data = slot.lock().await;
        data.rentals.get(id).cloned()
    }

    pub async fn payments(&self, tenant: &TenantId) -> Vec<PaymentRecord> {
        let slot = self.slot(tenant).await;
        let data = slot.lock().await;
        data.payments.clone()
    }
}

#[async_trait]
impl RentalStore for MemoryRentalStore {
    async fn begin(&self, tenant: &TenantId) -> Result<Box<dyn RentalUnitOfWork>> {
        let guard = self.slot(tenant).await.lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<TenantData>,
    working: TenantData,
}

#[async_trait]
impl RentalUnitOfWork for MemoryUnitOfWork {
    async fn get_vehicle(&mut self, id: &VehicleId) -> Result<Option<Vehicle>> {
        Ok(self.working.vehicles.get(id).cloned())
    }

    async fn lock_vehicle(&mut self, id: &VehicleId) -> Result<Option<Vehicle>> {
        self.get_vehicle(id).await
    }

    async fn get_user(&mut self, id: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.working.users.get(id).cloned())
    }

    async fn get_rental(&mut self, id: &RentalId) -> Result<Option<Rental>> {
        Ok(self.working.rentals.get(id).cloned())
    }

    async fn lock_rental(&mut self, id: &RentalId) -> Result<Option<Rental>> {
        self.get_rental(id).await
    }

    async fn bookings_for_vehicle(
        &mut self,
        vehicle_id: &VehicleId,
        around: &BookingWindow,
    ) -> Result<Vec<BookedWindow>> {
        Ok(self
            .working
            .rentals
            .values()
            .filter(|r| r.vehicle_id == *vehicle_id && r.status.blocks_availability())
            .filter(|r| r.window().overlaps(around))
            .map(|r| BookedWindow {
                rental_id: r.id,
                status: r.status,
                window: r.window(),
            })
            .collect())
    }

    async fn rentals_for_user(&mut self, user_id: &UserId) -> Result<Vec<Rental>> {
        let mut rentals: Vec<Rental> = self
            .working
            .rentals
            .values()
            .filter(|r| r.user_id == *user_id)
            .cloned()
            .collect();
        rentals.sort_by(|a, b| b.rental_start.cmp(&a.rental_start));
        Ok(rentals)
    }

    async fn insert_rental(&mut self, rental: &Rental) -> Result<()> {
        if self.working.rentals.contains_key(&rental.id) {
            return Err(RentalError::conflict(format!(
                "rental {} already exists",
                rental.id
            )));
        }
        let claimed = self.working.rentals.values().any(|r| {
            r.vehicle_id == rental.vehicle_id
                && r.status.blocks_availability()
                && r.window().overlaps(&rental.window())
        });
        if claimed {
            return Err(RentalError::conflict(
                "vehicle is already booked during this period",
            ));
        }
        self.working.rentals.insert(rental.id, rental.clone());
        Ok(())
    }

    async fn update_rental(&mut self, rental: &Rental) -> Result<()> {
        match self.working.rentals.get_mut(&rental.id) {
            Some(existing) => {
                *existing = rental.clone();
                Ok(())
            }
            None => Err(RentalError::not_found("Rental", rental.id)),
        }
    }

    async fn record_payment(&mut self, payment: &PaymentRecord) -> Result<()> {
        if self
            .working
            .payments
            .iter()
            .any(|p| p.intent_id == payment.intent_id)
        {
            return Err(RentalError::conflict(format!(
                "payment intent {} is already recorded",
                payment.intent_id
            )));
        }
        self.working.payments.push(payment.clone());
        Ok(())
    }

    async fn payments_for_rental(&mut self, rental_id: &RentalId) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.rental_id == *rental_id)
            .cloned()
            .collect())
    }

    async fn insert_damage_report(&mut self, report: &DamageReport) -> Result<()> {
        self.working.damage_reports.push(report.clone());
        Ok(())
    }

    async fn damage_reports_for_rental(
        &mut self,
        rental_id: &RentalId,
    ) -> Result<Vec<DamageReport>> {
        Ok(self
            .working
            .damage_reports
            .iter()
            .filter(|r| r.rental_id == *rental_id)
            .cloned()
            .collect())
    }

    async fn insert_review(&mut self, review: &Review) -> Result<()> {
        if self.working.reviews.contains_key(&review.rental_id) {
            return Err(RentalError::conflict(format!(
                "rental {} has already been reviewed",
                review.rental_id
            )));
        }
        self.working.reviews.insert(review.rental_id, review.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::RentalStatus;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn tenant() -> TenantId {
        TenantId::new("acme").unwrap()
    }

    fn vehicle() -> Vehicle {
        Vehicle {
            id: VehicleId::new(),
            make: "Toyota".into(),
            model: "Corolla".into(),
            year: 2022,
            license_plate: "ABC-123".into(),
            rental_rate_per_day: dec!(40),
            available: true,
        }
    }

    fn rental_for(vehicle: &Vehicle, offset_days: i64) -> Rental {
        let start = Utc::now() + Duration::days(offset_days);
        Rental::book(
            UserId::new(),
            vehicle.id,
            BookingWindow::new(start, start + Duration::days(1)).unwrap(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryRentalStore::new();
        let vehicle = vehicle();
        store.register_vehicle(&tenant(), vehicle.clone()).await;
        let rental = rental_for(&vehicle, 1);

        {
            let mut uow = store.begin(&tenant()).await.unwrap();
            uow.insert_rental(&rental).await.unwrap();
        }
        assert!(store.rental(&tenant(), &rental.id).await.is_none());

        let mut uow = store.begin(&tenant()).await.unwrap();
        uow.insert_rental(&rental).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(
            store.rental(&tenant(), &rental.id).await.map(|r| r.status),
            Some(RentalStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = MemoryRentalStore::new();
        let vehicle = vehicle();
        store.register_vehicle(&tenant(), vehicle.clone()).await;

        let other = TenantId::new("globex").unwrap();
        let mut uow = store.begin(&other).await.unwrap();
        assert!(uow.get_vehicle(&vehicle.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_unit_of_work_does_not_block_other_tenants() {
        let store = MemoryRentalStore::new();
        let held = store.begin(&tenant()).await.unwrap();

        let other = TenantId::new("globex").unwrap();
        let uow = tokio::time::timeout(std::time::Duration::from_secs(5), store.begin(&other))
            .await
            .expect("other tenant must not wait for acme's unit of work")
            .unwrap();
        uow.commit().await.unwrap();

        let same = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.begin(&tenant()),
        )
        .await;
        assert!(same.is_err(), "same tenant must wait for the open unit of work");
        drop(held);
    }

    #[tokio::test]
    async fn test_overlapping_insert_is_a_conflict() {
        let store = MemoryRentalStore::new();
        let vehicle = vehicle();
        store.register_vehicle(&tenant(), vehicle.clone()).await;

        let mut uow = store.begin(&tenant()).await.unwrap();
        let first = rental_for(&vehicle, 1);
        uow.insert_rental(&first).await.unwrap();

        let mut second = rental_for(&vehicle, 1);
        second.rental_start = first.rental_start + Duration::hours(12);
        second.rental_end = first.rental_end + Duration::hours(12);
        let err = uow.insert_rental(&second).await.unwrap_err();
        assert!(matches!(err, RentalError::Conflict { .. }));
    }
}
