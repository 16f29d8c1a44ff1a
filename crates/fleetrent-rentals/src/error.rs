use rust_decimal::Decimal;
use thiserror::Error;

/// Caller-facing classification of a [`RentalError`].
///
/// The calling layer maps each category onto its own transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Conflict,
    InvalidState,
    Payment,
    NotFound,
    Forbidden,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::InvalidState => "invalid_state",
            ErrorCategory::Payment => "payment",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Forbidden => "forbidden",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RentalError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Operation {operation} is not allowed for a rental in state {state}")]
    InvalidState { operation: String, state: String },

    #[error("Payment error: {message}")]
    Payment { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Amount out of range for payment: {amount}")]
    AmountOutOfRange { amount: Decimal },

    #[error("Database error during {operation}: {source}")]
    Database {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, RentalError>;

impl RentalError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Wrap a store error, turning constraint violations into domain conflicts.
    ///
    /// `23505` is a unique violation and `23P01` an exclusion violation;
    /// both mean the write lost against an existing row.
    pub fn database(operation: &str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some("23505") => {
                    return Self::conflict(format!(
                        "{operation}: a record with the same unique key already exists"
                    ))
                }
                Some("23P01") => {
                    return Self::conflict(format!(
                        "{operation}: vehicle is already booked during this period"
                    ))
                }
                _ => {}
            }
        }
        Self::Database {
            operation: operation.to_string(),
            source: Box::new(err),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RentalError::Validation { .. } => ErrorCategory::Validation,
            RentalError::Conflict { .. } => ErrorCategory::Conflict,
            RentalError::InvalidState { .. } => ErrorCategory::InvalidState,
            RentalError::Payment { .. } | RentalError::AmountOutOfRange { .. } => {
                ErrorCategory::Payment
            }
            RentalError::NotFound { .. } => ErrorCategory::NotFound,
            RentalError::Forbidden { .. } => ErrorCategory::Forbidden,
            RentalError::Database { .. } => ErrorCategory::Internal,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RentalError::Validation { .. } => "FLEETRENT_VALIDATION_ERROR",
            RentalError::Conflict { .. } => "FLEETRENT_CONFLICT",
            RentalError::InvalidState { .. } => "FLEETRENT_INVALID_STATE",
            RentalError::Payment { .. } => "FLEETRENT_PAYMENT_ERROR",
            RentalError::AmountOutOfRange { .. } => "FLEETRENT_PAYMENT_AMOUNT_ERROR",
            RentalError::NotFound { .. } => "FLEETRENT_NOT_FOUND",
            RentalError::Forbidden { .. } => "FLEETRENT_FORBIDDEN",
            RentalError::Database { .. } => "FLEETRENT_DATABASE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_variants() {
        assert_eq!(
            RentalError::validation("bad").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            RentalError::conflict("taken").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            RentalError::not_found("Rental", 7).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            RentalError::InvalidState {
                operation: "checkout".into(),
                state: "completed".into()
            }
            .category(),
            ErrorCategory::InvalidState
        );
    }

    #[test]
    fn non_constraint_database_errors_stay_internal() {
        let err = RentalError::database("get_rental", sqlx::Error::RowNotFound);
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert_eq!(err.error_code(), "FLEETRENT_DATABASE_ERROR");
    }

    #[test]
    fn display_carries_detail() {
        let err = RentalError::Payment {
            message: "card_declined".into(),
        };
        assert_eq!(err.to_string(), "Payment error: card_declined");
    }

    #[test]
    fn only_database_failures_are_internal() {
        let errors = [
            RentalError::validation("bad"),
            RentalError::conflict("taken"),
            RentalError::forbidden("not yours"),
            RentalError::not_found("Vehicle", 1),
            RentalError::Payment {
                message: "declined".into(),
            },
            RentalError::AmountOutOfRange {
                amount: Decimal::ZERO,
            },
            RentalError::InvalidState {
                operation: "extend".into(),
                state: "cancelled".into(),
            },
        ];
        for err in &errors {
            assert_ne!(err.category(), ErrorCategory::Internal, "{err}");
        }

        let mut codes: Vec<&str> = errors.iter().map(RentalError::error_code).collect();
        codes.push(RentalError::database("x", sqlx::Error::RowNotFound).error_code());
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len() + 1);
    }
}
