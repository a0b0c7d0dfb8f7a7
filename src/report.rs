use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    catalog::{CatalogEntry, CatalogId},
    ledger::{LibraryId, StockLevel},
    member::MemberId,
    record::{BorrowRecord, LoanId},
};

/// An active loan as shown in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanSummary {
    /// Loan number
    pub loan_id: LoanId,
    /// Borrower
    pub member_id: MemberId,
    /// Day the copy left the library
    pub borrow_date: NaiveDate,
    /// Last day without a fine
    pub due_date: NaiveDate,
}

impl LoanSummary {
    /// Summarize a borrow record
    #[must_use]
    pub fn from_record(record: &BorrowRecord) -> Self {
        Self {
            loan_id: record.loan_id(),
            member_id: record.member_id().clone(),
            borrow_date: record.borrow_date(),
            due_date: record.due_date(),
        }
    }
}

/// One title's inventory in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleSnapshot {
    /// Title id
    pub catalog_id: CatalogId,
    /// Display title
    pub title: String,
    /// Author
    pub author: String,
    /// Copy counts
    pub stock: StockLevel,
    /// Copies currently out, oldest loan first
    pub loans: Vec<LoanSummary>,
}

impl TitleSnapshot {
    /// Build a title row from its catalog entry, counts and loans
    pub(crate) fn new(entry: &CatalogEntry, stock: StockLevel, loans: Vec<LoanSummary>) -> Self {
        Self {
            catalog_id: entry.id().clone(),
            title: entry.title().to_string(),
            author: entry.author().to_string(),
            stock,
            loans,
        }
    }
}

/// Point-in-time view of one ledger, taken under a single read lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    /// Library the snapshot was taken from
    pub library_id: LibraryId,
    /// Every registered title, ordered by id
    pub titles: Vec<TitleSnapshot>,
}

impl LedgerSnapshot {
    /// Assemble a snapshot
    pub(crate) fn new(library_id: LibraryId, titles: Vec<TitleSnapshot>) -> Self {
        Self { library_id, titles }
    }

    /// Render the snapshot as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the snapshot cannot be encoded.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Loans past their due date as of `today`
    pub fn overdue(
        &self,
        today: NaiveDate,
    ) -> impl Iterator<Item = (&TitleSnapshot, &LoanSummary)> {
        self.titles.iter().flat_map(move |title| {
            title
                .loans
                .iter()
                .filter(move |loan| loan.due_date < today)
                .map(move |loan| (title, loan))
        })
    }
}

impl fmt::Display for LedgerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Inventory of {} ===", self.library_id)?;
        if self.titles.is_empty() {
            return writeln!(f, "  (No titles registered)");
        }

        for title in &self.titles {
            writeln!(
                f,
                "{} \"{}\" by {}: {}/{} available, {} on loan",
                title.catalog_id,
                title.title,
                title.author,
                title.stock.available,
                title.stock.total,
                title.stock.on_loan
            )?;
            for loan in &title.loans {
                writeln!(
                    f,
                    "  loan {} to {} since {}, due {}",
                    loan.loan_id, loan.member_id, loan.borrow_date, loan.due_date
                )?;
            }
        }
        Ok(())
    }
}
