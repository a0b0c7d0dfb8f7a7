use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::{error::LedgerError, record::BorrowRecord};

/// Borrowing rules attached to a member
///
/// A policy is a plain value: it is resolved once when a member is created and
/// never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LendingPolicy {
    /// Maximum number of simultaneous active loans
    max_active_loans: u32,
    /// Days between borrowing and the due date
    loan_duration_days: u32,
    /// Amount charged per whole day a return is late
    fine_per_day_overdue: Decimal,
}

impl LendingPolicy {
    /// 5 loans, 14 days, 0.50 per overdue day
    pub const STUDENT: Self = Self {
        max_active_loans: 5,
        loan_duration_days: 14,
        fine_per_day_overdue: dec!(0.50),
    };

    /// 10 loans, 30 days, 1.00 per overdue day
    pub const FACULTY: Self = Self {
        max_active_loans: 10,
        loan_duration_days: 30,
        fine_per_day_overdue: dec!(1.00),
    };

    /// Create a custom policy
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidArgument` if the loan quota or the loan
    /// duration is zero, or if the fine rate is negative.
    pub fn new(
        max_active_loans: u32,
        loan_duration_days: u32,
        fine_per_day_overdue: Decimal,
    ) -> Result<Self, LedgerError> {
        if max_active_loans == 0 {
            return Err(LedgerError::InvalidArgument(
                "max_active_loans must be positive".to_string(),
            ));
        }
        if loan_duration_days == 0 {
            return Err(LedgerError::InvalidArgument(
                "loan_duration_days must be positive".to_string(),
            ));
        }
        if fine_per_day_overdue < Decimal::ZERO {
            return Err(LedgerError::InvalidArgument(format!(
                "fine_per_day_overdue must not be negative, got {fine_per_day_overdue}"
            )));
        }
        Ok(Self {
            max_active_loans,
            loan_duration_days,
            fine_per_day_overdue,
        })
    }

    /// Get the loan quota
    #[must_use]
    pub fn max_active_loans(&self) -> u32 {
        self.max_active_loans
    }

    /// Get the loan period in days
    #[must_use]
    pub fn loan_duration_days(&self) -> u32 {
        self.loan_duration_days
    }

    /// Get the fine charged per overdue day
    #[must_use]
    pub fn fine_per_day_overdue(&self) -> Decimal {
        self.fine_per_day_overdue
    }

    /// Due date of a loan taken out on `borrowed_on`
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidArgument` if the due date falls outside the
    /// representable calendar.
    pub fn due_date(&self, borrowed_on: NaiveDate) -> Result<NaiveDate, LedgerError> {
        borrowed_on
            .checked_add_days(Days::new(u64::from(self.loan_duration_days)))
            .ok_or_else(|| {
                LedgerError::InvalidArgument(format!(
                    "due date for a loan on {borrowed_on} overflows"
                ))
            })
    }

    /// Fine owed for a given number of days overdue; zero when not late
    #[must_use]
    pub fn fine_for_days(&self, days_overdue: i64) -> Decimal {
        if days_overdue <= 0 {
            return Decimal::ZERO;
        }
        Decimal::from(days_overdue).checked_mul(self.fine_per_day_overdue).unwrap_or(Decimal::MAX)
    }

    /// Fine owed for `record` if it is (or was) returned on `returned_on`
    #[must_use]
    pub fn fine_for(&self, record: &BorrowRecord, returned_on: NaiveDate) -> Decimal {
        self.fine_for_days(record.days_overdue(returned_on))
    }
}

/// Closed set of member categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemberCategory {
    /// Standard borrowing rights
    Student,
    /// Extended borrowing rights
    Faculty,
    /// Any other arrangement, carrying its own policy
    Custom(LendingPolicy),
}

impl MemberCategory {
    /// Resolve the lending policy for this category
    #[must_use]
    pub fn policy(&self) -> LendingPolicy {
        match self {
            Self::Student => LendingPolicy::STUDENT,
            Self::Faculty => LendingPolicy::FACULTY,
            Self::Custom(policy) => *policy,
        }
    }

    /// Short label for reports
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Faculty => "faculty",
            Self::Custom(_) => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_policies() {
        assert_eq!(MemberCategory::Student.policy().max_active_loans(), 5);
        assert_eq!(MemberCategory::Student.policy().loan_duration_days(), 14);
        assert_eq!(MemberCategory::Faculty.policy().max_active_loans(), 10);
        assert_eq!(MemberCategory::Faculty.policy().fine_per_day_overdue(), dec!(1.00));

        let custom = LendingPolicy::new(1, 7, dec!(2)).unwrap_or(LendingPolicy::STUDENT);
        assert_eq!(MemberCategory::Custom(custom).policy(), custom);
    }

    #[test]
    fn test_rejects_degenerate_policies() {
        for (quota, days, fine) in [(0, 14, dec!(0.5)), (3, 0, dec!(0.5)), (3, 14, dec!(-1))] {
            assert!(matches!(
                LendingPolicy::new(quota, days, fine),
                Err(LedgerError::InvalidArgument(_))
            ));
        }
        assert!(LendingPolicy::new(3, 14, Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_fine_for_days() {
        let policy = LendingPolicy::STUDENT;

        assert_eq!(policy.fine_for_days(6), dec!(3.00));
        assert_eq!(policy.fine_for_days(0), Decimal::ZERO);
        assert_eq!(policy.fine_for_days(-4), Decimal::ZERO);
        assert_eq!(LendingPolicy::FACULTY.fine_for_days(10), dec!(10.00));
    }

    #[test]
    fn test_due_date() {
        let borrowed_on = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default();
        let due = LendingPolicy::STUDENT.due_date(borrowed_on);

        assert_eq!(due, Ok(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap_or_default()));
        assert!(LendingPolicy::STUDENT.due_date(NaiveDate::MAX).is_err());
    }
}
