//! Late-return fine policy

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Flat per-day fine, charged for every started day past the due date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    rate_per_day: Decimal,
}

impl FinePolicy {
    pub fn new(rate_per_day: Decimal) -> Self {
        Self { rate_per_day }
    }

    /// Whole days late, rounded up. Zero when `evaluated_at <= due_at`.
    pub fn days_late(due_at: DateTime<Utc>, evaluated_at: DateTime<Utc>) -> i64 {
        if evaluated_at <= due_at {
            return 0;
        }
        let late = evaluated_at - due_at;
        let whole = late.num_days();
        if late > Duration::days(whole) {
            whole + 1
        } else {
            whole
        }
    }

    pub fn compute_fine(&self, due_at: DateTime<Utc>, evaluated_at: DateTime<Utc>) -> Decimal {
        Decimal::from(Self::days_late(due_at, evaluated_at)) * self.rate_per_day
    }
}
