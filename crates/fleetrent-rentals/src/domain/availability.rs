//! Vehicle availability: half-open window overlap against non-terminal bookings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::types::{RentalId, RentalStatus, VehicleId};
use crate::error::{RentalError, Result};
use crate::storage::RentalUnitOfWork;

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BookingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(RentalError::validation(
                "rental end must be after the rental start",
            ));
        }
        Ok(Self { start, end })
    }

    /// Touching windows (`self.end == other.start`) do not overlap.
    pub fn overlaps(&self, other: &BookingWindow) -> bool {
        self.start < other.end && self.end > other.start
    }
}

impl std::fmt::Display for BookingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// An existing booking of a vehicle as seen by the availability scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedWindow {
    pub rental_id: RentalId,
    pub status: RentalStatus,
    pub window: BookingWindow,
}

/// First booking that blocks `proposed`, ignoring terminal rentals and `exclude`.
pub fn find_conflict<'a>(
    existing: &'a [BookedWindow],
    proposed: &BookingWindow,
    exclude: Option<RentalId>,
) -> Option<&'a BookedWindow> {
    existing.iter().find(|booked| {
        booked.status.blocks_availability()
            && Some(booked.rental_id) != exclude
            && booked.window.overlaps(proposed)
    })
}

pub fn is_free(
    existing: &[BookedWindow],
    proposed: &BookingWindow,
    exclude: Option<RentalId>,
) -> bool {
    find_conflict(existing, proposed, exclude).is_none()
}

/// Availability queries run inside the unit of work that later claims the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvailabilityChecker;

impl AvailabilityChecker {
    /// The vehicle row must already be locked by `uow` so that concurrent
    /// claims on the same vehicle serialize behind this check.
    pub async fn is_available(
        &self,
        uow: &mut dyn RentalUnitOfWork,
        vehicle_id: &VehicleId,
        proposed: &BookingWindow,
        exclude: Option<RentalId>,
    ) -> Result<bool> {
        let booked = uow.bookings_for_vehicle(vehicle_id, proposed).await?;
        match find_conflict(&booked, proposed, exclude) {
            Some(conflict) => {
                debug!(
                    vehicle_id = %vehicle_id,
                    conflicting_rental = %conflict.rental_id,
                    window = %proposed,
                    "window is not available"
                );
                Ok(false)
            }
            None => Ok(true),
        }
    }
}
