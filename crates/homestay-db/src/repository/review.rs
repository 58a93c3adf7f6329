//! # Review Repository
//!
//! One review per completed booking. The coordinator checks ownership and
//! status; the `booking_id` UNIQUE column makes a second review fail even
//! when two submissions race.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use homestay_core::Review;

#[derive(Debug, sqlx::FromRow)]
struct ReviewRecord {
    id: String,
    booking_id: String,
    guest_id: String,
    property_id: String,
    rating: i64,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl ReviewRecord {
    fn into_review(self) -> DbResult<Review> {
        let rating = u8::try_from(self.rating)
            .map_err(|_| DbError::corrupt("review", &self.id, "rating out of range"))?;
        Ok(Review {
            id: self.id,
            booking_id: self.booking_id,
            guest_id: self.guest_id,
            property_id: self.property_id,
            rating,
            comment: self.comment,
            created_at: self.created_at,
        })
    }
}

/// Repository for reviews.
#[derive(Debug, Clone)]
pub struct ReviewRepository {
    pool: SqlitePool,
}

impl ReviewRepository {
    /// Creates a new ReviewRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReviewRepository { pool }
    }

    /// Inserts a review.
    ///
    /// ## Errors
    /// `UniqueViolation { field: "booking_id" }` if the booking was already
    /// reviewed.
    pub async fn insert(&self, review: &Review) -> DbResult<()> {
        debug!(booking_id = %review.booking_id, rating = review.rating, "Inserting review");

        sqlx::query(
            r#"
            INSERT INTO reviews (id, booking_id, guest_id, property_id, rating, comment, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&review.id)
        .bind(&review.booking_id)
        .bind(&review.guest_id)
        .bind(&review.property_id)
        .bind(review.rating as i64)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("booking_id") => {
                DbError::duplicate("booking_id", &review.booking_id)
            }
            other => other,
        })?;

        Ok(())
    }

    /// The review of a booking, if any.
    pub async fn get_by_booking(&self, booking_id: &str) -> DbResult<Option<Review>> {
        let record: Option<ReviewRecord> = sqlx::query_as(
            r#"
            SELECT id, booking_id, guest_id, property_id, rating, comment, created_at
            FROM reviews
            WHERE booking_id = ?1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(ReviewRecord::into_review).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::booking::tests::{at, sample_booking, sample_payment};
    use crate::{Database, DbConfig};
    use homestay_core::BookingState;

    fn review(id: &str) -> Review {
        Review {
            id: id.to_string(),
            booking_id: "b-1".into(),
            guest_id: "guest-1".into(),
            property_id: "prop-1".into(),
            rating: 5,
            comment: Some("quiet and warm".into()),
            created_at: at(23, 10),
        }
    }

    async fn completed_booking() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let booking = sample_booking("b-1", "guest-1");
        db.bookings()
            .insert_with_payment(&booking, "req-1", &sample_payment(&booking))
            .await
            .unwrap();

        let mut completed = booking.clone();
        completed.state = BookingState::Completed;
        completed.confirmed_at = Some(at(2, 9));
        completed.completed_at = Some(at(22, 12));
        db.bookings().commit_transition(&completed, 1, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_one_review_per_booking() {
        let db = completed_booking().await;

        db.reviews().insert(&review("r-1")).await.unwrap();
        let err = db.reviews().insert(&review("r-2")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "booking_id"));

        let stored = db.reviews().get_by_booking("b-1").await.unwrap().unwrap();
        assert_eq!(stored.id, "r-1");
        assert_eq!(stored.rating, 5);
    }

    #[tokio::test]
    async fn test_reviewed_booking_stays_completed() {
        let db = completed_booking().await;
        db.reviews().insert(&review("r-1")).await.unwrap();

        let result = sqlx::query("UPDATE bookings SET status = 'CANCELLED' WHERE id = 'b-1'")
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }
}
