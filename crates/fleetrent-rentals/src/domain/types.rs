use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{RentalError, Result};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Rental identifier
    RentalId
);
uuid_id!(
    /// Vehicle identifier
    VehicleId
);
uuid_id!(
    /// Customer identifier
    UserId
);
uuid_id!(DamageReportId);
uuid_id!(ReviewId);

/// Tenant (customer organisation) whose data is isolated from every other tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub const MAX_LEN: usize = 63;

    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= Self::MAX_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(RentalError::validation(format!(
                "invalid tenant identifier '{id}'"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = RentalError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated caller, as established by the (external) auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub is_staff: bool,
}

impl Actor {
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            is_staff: false,
        }
    }

    pub fn staff(user_id: UserId) -> Self {
        Self {
            user_id,
            is_staff: true,
        }
    }

    pub fn may_act_for(&self, owner: &UserId) -> bool {
        self.is_staff || self.user_id == *owner
    }
}

/// Per-call context threaded through every core operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant: TenantId,
    pub actor: Actor,
    /// Operation time. Used for the past-start check and as the actual return time.
    pub at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(tenant: TenantId, actor: Actor) -> Self {
        Self {
            tenant,
            actor,
            at: Utc::now(),
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    pub(crate) fn ensure_may_act_for(&self, owner: &UserId) -> Result<()> {
        if self.actor.may_act_for(owner) {
            Ok(())
        } else {
            Err(RentalError::forbidden(format!(
                "user {} may not access rentals of user {}",
                self.actor.user_id, owner
            )))
        }
    }
}

/// Rental lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    /// Booked, not yet paid
    Active,
    /// Paid
    Confirmed,
    /// Vehicle returned
    Completed,
    Cancelled,
}

impl RentalStatus {
    pub const ALL: [RentalStatus; 4] = [
        RentalStatus::Active,
        RentalStatus::Confirmed,
        RentalStatus::Completed,
        RentalStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, RentalStatus::Completed | RentalStatus::Cancelled)
    }

    /// Whether a rental in this state holds its window against other bookings.
    pub fn blocks_availability(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: RentalStatus) -> bool {
        matches!(
            (self, next),
            (RentalStatus::Active, RentalStatus::Confirmed)
                | (RentalStatus::Active, RentalStatus::Completed)
                | (RentalStatus::Confirmed, RentalStatus::Completed)
                | (RentalStatus::Active, RentalStatus::Cancelled)
                | (RentalStatus::Confirmed, RentalStatus::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Active => "active",
            RentalStatus::Confirmed => "confirmed",
            RentalStatus::Completed => "completed",
            RentalStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RentalStatus {
    type Err = RentalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(RentalStatus::Active),
            "confirmed" => Ok(RentalStatus::Confirmed),
            "completed" => Ok(RentalStatus::Completed),
            "cancelled" => Ok(RentalStatus::Cancelled),
            other => Err(RentalError::validation(format!(
                "unknown rental status '{other}'"
            ))),
        }
    }
}
