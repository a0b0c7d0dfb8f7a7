use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{catalog::CatalogId, ledger::LibraryId, member::MemberId, record::LoanId};

/// Events that change a ledger's inventory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum LoanEvent {
    /// Copies were added to the catalog
    Registered { copies: u32, total: u32 },
    /// A copy left the library
    Borrowed { member_id: MemberId, loan_id: LoanId, on: NaiveDate, due: NaiveDate },
    /// A copy came back, possibly late
    Returned { member_id: MemberId, loan_id: LoanId, on: NaiveDate, fine: Decimal },
}

/// A committed change to one title's inventory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoanTransition {
    /// Position in the ledger's commit order, starting at 1
    pub sequence: u64,
    /// Ledger that committed the change
    pub library_id: LibraryId,
    /// Title whose inventory changed
    pub catalog_id: CatalogId,
    /// What happened
    pub event: LoanEvent,
    /// Copies on the shelf once the change was applied
    pub available_after: u32,
}
