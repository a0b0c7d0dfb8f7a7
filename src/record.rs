use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{catalog::CatalogId, ledger::LibraryId, member::MemberId};

/// Opaque identifier of a loan, unique within one library
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct LoanId(u64);

impl LoanId {
    /// Wrap a raw loan number
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw loan number
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a loan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum LoanState {
    /// The copy is out with the borrower
    #[default]
    Active,
    /// The copy came back on the given date
    Returned(NaiveDate),
}

impl LoanState {
    /// Get a human-readable description of the state
    #[must_use]
    pub fn get_description(&self) -> String {
        match self {
            Self::Active => "on loan".to_string(),
            Self::Returned(date) => format!("returned on {date}"),
        }
    }
}

/// One loan of one copy to one member
///
/// The due date is fixed when the loan opens. The return date is set exactly
/// once and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BorrowRecord {
    /// Loan number within the issuing library
    loan_id: LoanId,
    /// Library that issued the loan
    library_id: LibraryId,
    /// Title that was lent
    catalog_id: CatalogId,
    /// Borrower
    member_id: MemberId,
    /// Day the copy left the library
    borrow_date: NaiveDate,
    /// Last day the copy may be returned without a fine
    due_date: NaiveDate,
    /// Day the copy came back, if it has
    return_date: Option<NaiveDate>,
}

impl BorrowRecord {
    /// Open a new active loan
    pub(crate) fn open(
        loan_id: LoanId,
        library_id: LibraryId,
        catalog_id: CatalogId,
        member_id: MemberId,
        borrow_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            loan_id,
            library_id,
            catalog_id,
            member_id,
            borrow_date,
            due_date,
            return_date: None,
        }
    }

    /// Set the return date, moving the record to its terminal state
    ///
    /// Returns `false` without touching the record if it was already returned.
    pub(crate) fn mark_returned(&mut self, returned_on: NaiveDate) -> bool {
        if self.return_date.is_some() {
            return false;
        }
        self.return_date = Some(returned_on);
        true
    }

    /// Get the loan id
    #[must_use]
    pub fn loan_id(&self) -> LoanId {
        self.loan_id
    }

    /// Get the lending library
    #[must_use]
    pub fn library_id(&self) -> &LibraryId {
        &self.library_id
    }

    /// Get the borrowed title
    #[must_use]
    pub fn catalog_id(&self) -> &CatalogId {
        &self.catalog_id
    }

    /// Get the borrower
    #[must_use]
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// Get the day the loan was opened
    #[must_use]
    pub fn borrow_date(&self) -> NaiveDate {
        self.borrow_date
    }

    /// Get the day the copy is due back
    #[must_use]
    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    /// Get the return day, if the copy is back
    #[must_use]
    pub fn return_date(&self) -> Option<NaiveDate> {
        self.return_date
    }

    /// Get the current state of the loan
    #[must_use]
    pub fn state(&self) -> LoanState {
        self.return_date.map_or(LoanState::Active, LoanState::Returned)
    }

    /// Whether the copy is still out
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.return_date.is_none()
    }

    /// Whole days past the due date
    ///
    /// Measured up to the return date once the record is closed, otherwise up
    /// to `as_of`. Never negative.
    #[must_use]
    pub fn days_overdue(&self, as_of: NaiveDate) -> i64 {
        let checked_on = self.return_date.unwrap_or(as_of);
        checked_on.signed_duration_since(self.due_date).num_days().max(0)
    }

    /// Whether this record is loan `loan_id` issued by `library_id`
    pub(crate) fn same_loan(&self, library_id: &LibraryId, loan_id: LoanId) -> bool {
        self.loan_id == loan_id && &self.library_id == library_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Date `offset` days after the first of January 2024
    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.checked_add_days(chrono::Days::new(offset)))
            .unwrap_or_default()
    }

    /// Helper function for a fresh two-week loan
    fn open_record() -> BorrowRecord {
        BorrowRecord::open(
            LoanId::new(1),
            LibraryId::new("central"),
            CatalogId::new("978-0132350884"),
            MemberId::new("S001"),
            day(0),
            day(14),
        )
    }

    #[test]
    fn test_record_lifecycle() {
        let mut record = open_record();
        assert!(record.is_active());
        assert_eq!(record.state(), LoanState::Active);

        assert!(record.mark_returned(day(20)));
        assert_eq!(record.state(), LoanState::Returned(day(20)));

        // A second return never rewrites the date
        assert!(!record.mark_returned(day(25)));
        assert_eq!(record.return_date(), Some(day(20)));
        assert_eq!(record.due_date(), day(14));
    }

    #[test]
    fn test_days_overdue() {
        let mut record = open_record();

        assert_eq!(record.days_overdue(day(10)), 0);
        assert_eq!(record.days_overdue(day(14)), 0);
        assert_eq!(record.days_overdue(day(17)), 3);

        record.mark_returned(day(20));
        // Once closed, the return date is what counts
        assert_eq!(record.days_overdue(day(40)), 6);
    }

    #[test]
    fn test_state_description() {
        assert_eq!(LoanState::Active.get_description(), "on loan");
        assert_eq!(LoanState::Returned(day(0)).get_description(), "returned on 2024-01-01");
    }
}
