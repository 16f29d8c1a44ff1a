use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::domain::availability::{BookedWindow, BookingWindow};
use crate::domain::rentals::{PaymentKind, PaymentRecord, Rental, UserProfile, Vehicle};
use crate::domain::reports::{DamageReport, Review};
use crate::domain::types::{DamageReportId, RentalId, RentalStatus, TenantId, UserId, VehicleId};
use crate::error::{RentalError, Result};
use crate::storage::{RentalStore, RentalUnitOfWork};

const RENTAL_COLUMNS: &str = "rental_id, user_id, vehicle_id, rental_start, rental_end, status, \
     total_cost, payment_intent_id, refund_id, created_at, updated_at";

const VEHICLE_COLUMNS: &str =
    "vehicle_id, make, model, year, license_plate, rental_rate_per_day, available";

#[derive(Clone)]
pub struct PgRentalStore {
    pool: PgPool,
}

impl PgRentalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| RentalError::database("connect", e))?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RentalError::Database {
                operation: "run_migrations".to_string(),
                source: Box::new(e),
            })?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Insert or replace a vehicle in the tenant's fleet.
    pub async fn register_vehicle(&self, tenant: &TenantId, vehicle: &Vehicle) -> Result<()> {
        vehicle.ensure_rentable()?;
        sqlx::query(
            r#"
            INSERT INTO vehicles
            (tenant_id, vehicle_id, make, model, year, license_plate, rental_rate_per_day, available)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tenant_id, vehicle_id) DO UPDATE SET
                make = EXCLUDED.make,
                model = EXCLUDED.model,
                year = EXCLUDED.year,
                license_plate = EXCLUDED.license_plate,
                rental_rate_per_day = EXCLUDED.rental_rate_per_day,
                available = EXCLUDED.available
            "#,
        )
        .bind(tenant.as_str())
        .bind(vehicle.id.as_uuid())
        .bind(&vehicle.make)
        .bind(&vehicle.model)
        .bind(vehicle.year)
        .bind(&vehicle.license_plate)
        .bind(vehicle.rental_rate_per_day)
        .bind(vehicle.available)
        .execute(&self.pool)
        .await
        .map_err(|e| RentalError::database("register_vehicle", e))?;
        Ok(())
    }

    pub async fn register_user(&self, tenant: &TenantId, user: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (tenant_id, user_id, name, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, user_id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email
            "#,
        )
        .bind(tenant.as_str())
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .execute(&self.pool)
        .await
        .map_err(|e| RentalError::database("register_user", e))?;
        Ok(())
    }
}

#[async_trait]
impl RentalStore for PgRentalStore {
    async fn begin(&self, tenant: &TenantId) -> Result<Box<dyn RentalUnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RentalError::database("begin", e))?;
        Ok(Box::new(PgUnitOfWork {
            tx,
            tenant: tenant.clone(),
        }))
    }
}

/// One Postgres transaction. Dropping it without commit rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    tenant: TenantId,
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| RentalError::database("decode_row", e))
}

fn vehicle_from_row(row: &PgRow) -> Result<Vehicle> {
    Ok(Vehicle {
        id: VehicleId::from_uuid(column(row, "vehicle_id")?),
        make: column(row, "make")?,
        model: column(row, "model")?,
        year: column(row, "year")?,
        license_plate: column(row, "license_plate")?,
        rental_rate_per_day: column(row, "rental_rate_per_day")?,
        available: column(row, "available")?,
    })
}

fn rental_from_row(row: &PgRow) -> Result<Rental> {
    let status: String = column(row, "status")?;
    Ok(Rental {
        id: RentalId::from_uuid(column(row, "rental_id")?),
        user_id: UserId::from_uuid(column(row, "user_id")?),
        vehicle_id: VehicleId::from_uuid(column(row, "vehicle_id")?),
        rental_start: column(row, "rental_start")?,
        rental_end: column(row, "rental_end")?,
        status: status.parse()?,
        total_cost: column(row, "total_cost")?,
        payment_reference: column(row, "payment_intent_id")?,
        refund_reference: column(row, "refund_id")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<PaymentRecord> {
    let kind: String = column(row, "kind")?;
    Ok(PaymentRecord {
        rental_id: RentalId::from_uuid(column(row, "rental_id")?),
        intent_id: column(row, "intent_id")?,
        amount: column(row, "amount")?,
        kind: kind.parse::<PaymentKind>()?,
        created_at: column(row, "created_at")?,
    })
}

fn damage_report_from_row(row: &PgRow) -> Result<DamageReport> {
    Ok(DamageReport {
        id: DamageReportId::from_uuid(column(row, "report_id")?),
        rental_id: RentalId::from_uuid(column(row, "rental_id")?),
        reporter_id: UserId::from_uuid(column(row, "reporter_id")?),
        photo_url: column(row, "photo_url")?,
        description: column(row, "description")?,
        reported_at: column(row, "reported_at")?,
        is_resolved: column(row, "is_resolved")?,
    })
}

impl PgUnitOfWork {
    async fn fetch_vehicle(&mut self, id: &VehicleId, lock: bool) -> Result<Option<Vehicle>> {
        let sql = format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE tenant_id = $1 AND vehicle_id = $2{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(self.tenant.as_str())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| RentalError::database("get_vehicle", e))?;
        row.as_ref().map(vehicle_from_row).transpose()
    }

    async fn fetch_rental(&mut self, id: &RentalId, lock: bool) -> Result<Option<Rental>> {
        let sql = format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE tenant_id = $1 AND rental_id = $2{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(self.tenant.as_str())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| RentalError::database("get_rental", e))?;
        row.as_ref().map(rental_from_row).transpose()
    }
}

#[async_trait]
impl RentalUnitOfWork for PgUnitOfWork {
    async fn get_vehicle(&mut self, id: &VehicleId) -> Result<Option<Vehicle>> {
        self.fetch_vehicle(id, false).await
    }

    async fn lock_vehicle(&mut self, id: &VehicleId) -> Result<Option<Vehicle>> {
        self.fetch_vehicle(id, true).await
    }

    async fn get_user(&mut self, id: &UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT user_id, name, email FROM users WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(self.tenant.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("get_user", e))?;

        row.map(|r| {
            Ok(UserProfile {
                id: UserId::from_uuid(column(&r, "user_id")?),
                name: column(&r, "name")?,
                email: column(&r, "email")?,
            })
        })
        .transpose()
    }

    async fn get_rental(&mut self, id: &RentalId) -> Result<Option<Rental>> {
        self.fetch_rental(id, false).await
    }

    async fn lock_rental(&mut self, id: &RentalId) -> Result<Option<Rental>> {
        self.fetch_rental(id, true).await
    }

    async fn bookings_for_vehicle(
        &mut self,
        vehicle_id: &VehicleId,
        around: &BookingWindow,
    ) -> Result<Vec<BookedWindow>> {
        let rows = sqlx::query(
            r#"
            SELECT rental_id, status, rental_start, rental_end
            FROM rentals
            WHERE tenant_id = $1
              AND vehicle_id = $2
              AND status IN ('active', 'confirmed')
              AND rental_start < $4
              AND rental_end > $3
            "#,
        )
        .bind(self.tenant.as_str())
        .bind(vehicle_id.as_uuid())
        .bind(around.start)
        .bind(around.end)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("bookings_for_vehicle", e))?;

        rows.iter()
            .map(|r| {
                let status: String = column(r, "status")?;
                Ok(BookedWindow {
                    rental_id: RentalId::from_uuid(column(r, "rental_id")?),
                    status: status.parse::<RentalStatus>()?,
                    window: BookingWindow {
                        start: column(r, "rental_start")?,
                        end: column(r, "rental_end")?,
                    },
                })
            })
            .collect()
    }

    async fn rentals_for_user(&mut self, user_id: &UserId) -> Result<Vec<Rental>> {
        let sql = format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE tenant_id = $1 AND user_id = $2 \
             ORDER BY rental_start DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(self.tenant.as_str())
            .bind(user_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| RentalError::database("rentals_for_user", e))?;
        rows.iter().map(rental_from_row).collect()
    }

    async fn insert_rental(&mut self, rental: &Rental) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rentals
            (tenant_id, rental_id, user_id, vehicle_id, rental_start, rental_end, status,
             total_cost, payment_intent_id, refund_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(self.tenant.as_str())
        .bind(rental.id.as_uuid())
        .bind(rental.user_id.as_uuid())
        .bind(rental.vehicle_id.as_uuid())
        .bind(rental.rental_start)
        .bind(rental.rental_end)
        .bind(rental.status.as_str())
        .bind(rental.total_cost)
        .bind(&rental.payment_reference)
        .bind(&rental.refund_reference)
        .bind(rental.created_at)
        .bind(rental.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("insert_rental", e))?;
        Ok(())
    }

    async fn update_rental(&mut self, rental: &Rental) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE rentals
            SET rental_start = $3, rental_end = $4, status = $5, total_cost = $6,
                payment_intent_id = $7, refund_id = $8, updated_at = $9
            WHERE tenant_id = $1 AND rental_id = $2
            "#,
        )
        .bind(self.tenant.as_str())
        .bind(rental.id.as_uuid())
        .bind(rental.rental_start)
        .bind(rental.rental_end)
        .bind(rental.status.as_str())
        .bind(rental.total_cost)
        .bind(&rental.payment_reference)
        .bind(&rental.refund_reference)
        .bind(rental.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("update_rental", e))?;

        if result.rows_affected() == 0 {
            return Err(RentalError::not_found("Rental", rental.id));
        }
        Ok(())
    }

    async fn record_payment(&mut self, payment: &PaymentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rental_payments (tenant_id, intent_id, rental_id, amount, kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(self.tenant.as_str())
        .bind(&payment.intent_id)
        .bind(payment.rental_id.as_uuid())
        .bind(payment.amount)
        .bind(payment.kind.as_str())
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("record_payment", e))?;
        Ok(())
    }

    async fn payments_for_rental(&mut self, rental_id: &RentalId) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT intent_id, rental_id, amount, kind, created_at
            FROM rental_payments
            WHERE tenant_id = $1 AND rental_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(self.tenant.as_str())
        .bind(rental_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("payments_for_rental", e))?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn insert_damage_report(&mut self, report: &DamageReport) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO damage_reports
            (tenant_id, report_id, rental_id, reporter_id, photo_url, description,
             reported_at, is_resolved)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(self.tenant.as_str())
        .bind(report.id.as_uuid())
        .bind(report.rental_id.as_uuid())
        .bind(report.reporter_id.as_uuid())
        .bind(&report.photo_url)
        .bind(&report.description)
        .bind(report.reported_at)
        .bind(report.is_resolved)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("insert_damage_report", e))?;
        Ok(())
    }

    async fn damage_reports_for_rental(
        &mut self,
        rental_id: &RentalId,
    ) -> Result<Vec<DamageReport>> {
        let rows = sqlx::query(
            r#"
            SELECT report_id, rental_id, reporter_id, photo_url, description,
                   reported_at, is_resolved
            FROM damage_reports
            WHERE tenant_id = $1 AND rental_id = $2
            ORDER BY reported_at
            "#,
        )
        .bind(self.tenant.as_str())
        .bind(rental_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("damage_reports_for_rental", e))?;
        rows.iter().map(damage_report_from_row).collect()
    }

    async fn insert_review(&mut self, review: &Review) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (tenant_id, review_id, rental_id, author_id, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(self.tenant.as_str())
        .bind(review.id.as_uuid())
        .bind(review.rental_id.as_uuid())
        .bind(review.author_id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| RentalError::database("insert_review", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| RentalError::database("commit", e))
    }
}
