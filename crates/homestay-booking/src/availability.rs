//! # Availability Boundary
//!
//! The calendar lives outside the booking core. The coordinator only needs
//! a yes/no for a property and date range; anything other than a clear
//! "yes" is treated as unavailable.

use async_trait::async_trait;
use chrono::NaiveDate;
#[cfg(any(test, feature = "test-utils"))]
use std::collections::{HashMap, VecDeque};
#[cfg(any(test, feature = "test-utils"))]
use tokio::sync::Mutex;

use crate::error::AvailabilityError;

/// Answers whether a property can be reserved for `[check_in, check_out)`.
#[async_trait]
pub trait AvailabilityChecker: Send + Sync {
    async fn check_available(
        &self,
        property_id: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, AvailabilityError>;
}

/// In-memory calendar of blocked date ranges, for development and tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct InMemoryAvailability {
    state: Mutex<CalendarState>,
}

#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
struct CalendarState {
    blocked: HashMap<String, Vec<(NaiveDate, NaiveDate)>>,
    failures: VecDeque<AvailabilityError>,
}

#[cfg(any(test, feature = "test-utils"))]
impl InMemoryAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `[check_in, check_out)` as taken.
    pub async fn block(&self, property_id: &str, check_in: NaiveDate, check_out: NaiveDate) {
        self.state
            .lock()
            .await
            .blocked
            .entry(property_id.to_string())
            .or_default()
            .push((check_in, check_out));
    }

    /// The next checks fail with these errors, in order.
    pub async fn fail_next(&self, errors: impl IntoIterator<Item = AvailabilityError>) {
        self.state.lock().await.failures.extend(errors);
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl AvailabilityChecker for InMemoryAvailability {
    async fn check_available(
        &self,
        property_id: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, AvailabilityError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }

        let overlaps = state
            .blocked
            .get(property_id)
            .map(|ranges| ranges.iter().any(|&(start, end)| check_in < end && start < check_out))
            .unwrap_or(false);
        Ok(!overlaps)
    }
}
