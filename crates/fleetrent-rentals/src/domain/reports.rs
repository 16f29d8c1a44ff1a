//! Damage reports and reviews attached to rentals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::types::{DamageReportId, RentalId, ReviewId, UserId};
use crate::error::{RentalError, Result};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageReport {
    pub id: DamageReportId,
    pub rental_id: RentalId,
    pub reporter_id: UserId,
    pub photo_url: Option<String>,
    pub description: String,
    pub reported_at: DateTime<Utc>,
    /// Toggled by moderation outside the rental core.
    pub is_resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDamageReport {
    pub rental_id: RentalId,
    pub description: String,
    pub photo_url: Option<String>,
}

impl NewDamageReport {
    pub fn into_report(self, reporter_id: UserId, at: DateTime<Utc>) -> Result<DamageReport> {
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(RentalError::validation(
                "a damage report needs a description",
            ));
        }
        let photo_url = match self.photo_url {
            Some(raw) => {
                let url = Url::parse(raw.trim()).map_err(|e| {
                    RentalError::validation(format!("invalid photo url '{raw}': {e}"))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(RentalError::validation(format!(
                        "photo url must use http or https, got '{}'",
                        url.scheme()
                    )));
                }
                Some(url.to_string())
            }
            None => None,
        };

        Ok(DamageReport {
            id: DamageReportId::new(),
            rental_id: self.rental_id,
            reporter_id,
            photo_url,
            description,
            reported_at: at,
            is_resolved: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub rental_id: RentalId,
    pub author_id: UserId,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub rental_id: RentalId,
    pub rating: u8,
    pub comment: String,
}

impl NewReview {
    pub fn into_review(self, author_id: UserId, at: DateTime<Utc>) -> Result<Review> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(RentalError::validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}, got {}",
                self.rating
            )));
        }
        Ok(Review {
            id: ReviewId::new(),
            rental_id: self.rental_id,
            author_id,
            rating: self.rating,
            comment: self.comment.trim().to_string(),
            created_at: at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_report_requires_description() {
        let draft = NewDamageReport {
            rental_id: RentalId::new(),
            description: "   ".into(),
            photo_url: None,
        };
        assert!(matches!(
            draft.into_report(UserId::new(), Utc::now()),
            Err(RentalError::Validation { .. })
        ));
    }

    #[test]
    fn test_damage_report_photo_url_must_be_web() {
        let draft = NewDamageReport {
            rental_id: RentalId::new(),
            description: "scratch on rear bumper".into(),
            photo_url: Some("ftp://photos.example.com/1.jpg".into()),
        };
        assert!(draft.into_report(UserId::new(), Utc::now()).is_err());

        let draft = NewDamageReport {
            rental_id: RentalId::new(),
            description: "scratch on rear bumper".into(),
            photo_url: Some("https://photos.example.com/1.jpg".into()),
        };
        let report = draft.into_report(UserId::new(), Utc::now()).unwrap();
        assert_eq!(
            report.photo_url.as_deref(),
            Some("https://photos.example.com/1.jpg")
        );
        assert!(!report.is_resolved);
    }

    #[test]
    fn test_review_rating_bounds() {
        for rating in [0u8, 6] {
            let draft = NewReview {
                rental_id: RentalId::new(),
                rating,
                comment: String::new(),
            };
            assert!(draft.into_review(UserId::new(), Utc::now()).is_err());
        }
        let draft = NewReview {
            rental_id: RentalId::new(),
            rating: 5,
            comment: " smooth pickup ".into(),
        };
        assert_eq!(
            draft.into_review(UserId::new(), Utc::now()).unwrap().comment,
            "smooth pickup"
        );
    }
}
