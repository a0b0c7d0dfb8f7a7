use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::CatalogId,
    ledger::LibraryId,
    policy::{LendingPolicy, MemberCategory},
    record::{BorrowRecord, LoanId},
};

/// Unique identifier of a library member
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct MemberId(String);

impl MemberId {
    /// Create an id from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A borrower and the loans they hold or have held
///
/// The record collection can only be changed by a ledger while it commits a
/// borrow or return, which is why `Member` exposes no public mutators and does
/// not implement `Clone`.
#[derive(Debug, Serialize)]
pub struct Member {
    /// Identity of the member
    id: MemberId,
    /// Full name
    name: String,
    /// Contact address
    email: String,
    /// Category the policy was resolved from
    category: MemberCategory,
    /// Borrowing rules, fixed at creation
    policy: LendingPolicy,
    /// Loans in the order they were opened, active and returned
    records: Vec<BorrowRecord>,
}

impl Member {
    /// Create a member, resolving the lending policy from the category
    #[must_use]
    pub fn new(
        id: impl Into<MemberId>,
        name: impl Into<String>,
        email: impl Into<String>,
        category: MemberCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            policy: category.policy(),
            category,
            records: Vec::new(),
        }
    }

    /// Create a member with student borrowing rights
    #[must_use]
    pub fn student(
        id: impl Into<MemberId>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self::new(id, name, email, MemberCategory::Student)
    }

    /// Create a member with faculty borrowing rights
    #[must_use]
    pub fn faculty(
        id: impl Into<MemberId>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self::new(id, name, email, MemberCategory::Faculty)
    }

    /// Get the member id
    #[must_use]
    pub fn id(&self) -> &MemberId {
        &self.id
    }

    /// Get the full name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the contact address
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Get the category the policy was resolved from
    #[must_use]
    pub fn category(&self) -> MemberCategory {
        self.category
    }

    /// Get the borrowing rules
    #[must_use]
    pub fn policy(&self) -> LendingPolicy {
        self.policy
    }

    /// Every loan this member has taken out, oldest first
    #[must_use]
    pub fn records(&self) -> &[BorrowRecord] {
        &self.records
    }

    /// Loans not yet returned
    pub fn active_records(&self) -> impl Iterator<Item = &BorrowRecord> {
        self.records.iter().filter(|record| record.is_active())
    }

    /// Number of loans not yet returned, across every library
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_records().count()
    }

    /// Whether the policy allows one more active loan
    #[must_use]
    pub fn can_borrow_more(&self) -> bool {
        let limit = usize::try_from(self.policy.max_active_loans()).unwrap_or(usize::MAX);
        self.active_count() < limit
    }

    /// The active loan of `catalog_id` from `library_id`, if any
    #[must_use]
    pub fn active_record(
        &self,
        library_id: &LibraryId,
        catalog_id: &CatalogId,
    ) -> Option<&BorrowRecord> {
        self.active_records()
            .find(|record| record.library_id() == library_id && record.catalog_id() == catalog_id)
    }

    /// Fines accrued so far on active loans that are already past due
    #[must_use]
    pub fn accrued_fines(&self, as_of: NaiveDate) -> Decimal {
        self.active_records()
            .map(|record| self.policy.fine_for(record, as_of))
            .fold(Decimal::ZERO, |total, fine| total.saturating_add(fine))
    }

    /// Add a freshly opened loan
    pub(crate) fn attach(&mut self, record: BorrowRecord) {
        self.records.push(record);
    }

    /// Whether this member still holds `loan_id` of `library_id` as an active loan
    pub(crate) fn holds(&self, library_id: &LibraryId, loan_id: LoanId) -> bool {
        self.active_records().any(|record| record.same_loan(library_id, loan_id))
    }

    /// Close an active loan, returning the updated record
    ///
    /// Returns `None` and changes nothing if the member holds no such active loan.
    pub(crate) fn close(
        &mut self,
        library_id: &LibraryId,
        loan_id: LoanId,
        returned_on: NaiveDate,
    ) -> Option<BorrowRecord> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.is_active() && record.same_loan(library_id, loan_id))?;
        record.mark_returned(returned_on).then(|| record.clone())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    /// Date `offset` days after the first of January 2024
    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.checked_add_days(chrono::Days::new(offset)))
            .unwrap_or_default()
    }

    /// Helper function to open a loan for `member` on day `borrowed`
    fn loan(member: &Member, raw: u64, title: &str, borrowed: u64) -> BorrowRecord {
        let policy = member.policy();
        BorrowRecord::open(
            LoanId::new(raw),
            LibraryId::new("central"),
            CatalogId::new(title),
            member.id().clone(),
            day(borrowed),
            policy.due_date(day(borrowed)).unwrap_or_default(),
        )
    }

    #[test]
    fn test_policy_resolved_from_category() {
        let student = Member::student("S001", "Alice Johnson", "alice@email.com");
        let faculty = Member::faculty("F001", "Dr. Bob Smith", "bob@university.edu");

        assert_eq!(student.policy(), LendingPolicy::STUDENT);
        assert_eq!(faculty.policy(), LendingPolicy::FACULTY);
        assert_eq!(faculty.category().label(), "faculty");
    }

    #[test]
    fn test_can_borrow_more_tracks_active_records() {
        let policy = LendingPolicy::new(2, 7, dec!(0.25)).unwrap_or(LendingPolicy::STUDENT);
        let mut member =
            Member::new("C001", "Carol", "carol@email.com", MemberCategory::Custom(policy));

        let first = loan(&member, 1, "a", 0);
        let second = loan(&member, 2, "b", 0);
        member.attach(first);
        assert!(member.can_borrow_more());
        member.attach(second);
        assert!(!member.can_borrow_more());

        let closed = member.close(&LibraryId::new("central"), LoanId::new(1), day(3));
        assert!(closed.is_some_and(|record| record.return_date() == Some(day(3))));
        assert!(member.can_borrow_more());
        assert_eq!(member.records().len(), 2);
        assert_eq!(member.active_count(), 1);
    }

    #[test]
    fn test_close_is_one_shot() {
        let mut member = Member::student("S001", "Alice Johnson", "alice@email.com");
        let record = loan(&member, 7, "a", 0);
        member.attach(record);

        let library = LibraryId::new("central");
        assert!(member.holds(&library, LoanId::new(7)));
        assert!(member.close(&library, LoanId::new(7), day(5)).is_some());
        assert!(!member.holds(&library, LoanId::new(7)));
        assert!(member.close(&library, LoanId::new(7), day(9)).is_none());
        assert_eq!(member.records().first().and_then(BorrowRecord::return_date), Some(day(5)));
    }

    #[test]
    fn test_accrued_fines() {
        let mut member = Member::student("S001", "Alice Johnson", "alice@email.com");
        let record = loan(&member, 1, "a", 0);
        member.attach(record);

        assert_eq!(member.accrued_fines(day(14)), Decimal::ZERO);
        assert_eq!(member.accrued_fines(day(20)), dec!(3.00));
    }
}
