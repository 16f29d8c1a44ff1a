#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use fleetrent_rentals::domain::{
    Actor, NewRental, RentalService, RequestContext, TenantId, UserId, UserProfile, Vehicle,
    VehicleId,
};
use fleetrent_rentals::notifications::{EventKind, NotificationSink, NotifyError, RentalEvent};
use fleetrent_rentals::payments::{
    GatewayError, PaymentGateway, PaymentIntent, PaymentMetadata, RefundReceipt,
};
use fleetrent_rentals::storage::MemoryRentalStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Gateway double that records every call and can be switched to fail.
#[derive(Default)]
pub struct RecordingGateway {
    pub charges: Mutex<Vec<Decimal>>,
    pub refunds: Mutex<Vec<String>>,
    fail_charges: AtomicBool,
    fail_refunds: AtomicBool,
    issued: AtomicUsize,
}

impl RecordingGateway {
    pub fn fail_charges(&self, fail: bool) {
        self.fail_charges.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        _currency: &str,
        _metadata: &PaymentMetadata,
    ) -> Result<PaymentIntent, GatewayError> {
        if self.fail_charges.load(Ordering::SeqCst) {
            return Err(GatewayError::new("Your card was declined."));
        }
        self.charges.lock().unwrap().push(amount);
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentIntent {
            intent_id: format!("pi_{n}"),
        })
    }

    async fn refund(&self, intent_id: &str) -> Result<RefundReceipt, GatewayError> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(GatewayError::new("Refund could not be processed."));
        }
        self.refunds.lock().unwrap().push(intent_id.to_string());
        Ok(RefundReceipt {
            refund_id: format!("re_{intent_id}"),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<RentalEvent>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &RentalEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct TestContext {
    pub store: MemoryRentalStore,
    pub gateway: Arc<RecordingGateway>,
    pub sink: Arc<RecordingSink>,
    pub service: Arc<RentalService>,
    pub tenant: TenantId,
    pub vehicle: Vehicle,
    pub customer: UserProfile,
    /// 2030-03-01 00:00 UTC. Scenario times are offsets from here.
    pub day0: DateTime<Utc>,
}

impl TestContext {
    pub async fn new() -> Self {
        let store = MemoryRentalStore::new();
        let gateway = Arc::new(RecordingGateway::default());
        let sink = Arc::new(RecordingSink::default());
        let service = Arc::new(RentalService::new(
            Arc::new(store.clone()),
            gateway.clone(),
            sink.clone(),
        ));
        let tenant = TenantId::new("acme-rentals").unwrap();
        let vehicle = vehicle(dec!(40));
        let customer = customer("Grace Hopper", "grace@example.com");
        store.register_vehicle(&tenant, vehicle.clone()).await;
        store.register_user(&tenant, customer.clone()).await;

        Self {
            store,
            gateway,
            sink,
            service,
            tenant,
            vehicle,
            customer,
            day0: Utc.with_ymd_and_hms(2030, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    pub fn at(&self, hours: i64) -> DateTime<Utc> {
        self.day0 + Duration::hours(hours)
    }

    /// Context of the default customer, operating just before day0.
    pub fn ctx(&self) -> RequestContext {
        self.ctx_for(self.customer.id)
    }

    pub fn ctx_for(&self, user_id: UserId) -> RequestContext {
        RequestContext::new(self.tenant.clone(), Actor::customer(user_id))
            .at(self.day0 - Duration::hours(1))
    }

    pub fn booking(&self, start_hours: i64, end_hours: i64) -> NewRental {
        NewRental {
            user_id: self.customer.id,
            vehicle_id: self.vehicle.id,
            rental_start: self.at(start_hours),
            rental_end: self.at(end_hours),
        }
    }

    pub async fn add_customer(&self, name: &str, email: &str) -> UserProfile {
        let user = customer(name, email);
        self.store.register_user(&self.tenant, user.clone()).await;
        user
    }
}

pub fn vehicle(rate: Decimal) -> Vehicle {
    Vehicle {
        id: VehicleId::new(),
        make: "Volkswagen".into(),
        model: "Golf".into(),
        year: 2023,
        license_plate: "FR-2030".into(),
        rental_rate_per_day: rate,
        available: true,
    }
}

pub fn customer(name: &str, email: &str) -> UserProfile {
    UserProfile {
        id: UserId::new(),
        name: name.into(),
        email: email.into(),
    }
}
