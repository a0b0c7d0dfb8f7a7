//! Concurrent lending ledger for a library circulation desk.
//!
//! Each library owns a [`LendingLedger`] that tracks how many copies of every
//! title are on the shelf, which members hold the rest, and what they owe when
//! they bring them back late. Borrowing and returning are atomic transitions,
//! so any number of threads can share one ledger without ever lending the same
//! copy twice.
//!
//! A [`LibraryDirectory`] ties several ledgers and their members together.

pub mod catalog;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod ledger;
pub mod member;
pub mod observers;
pub mod policy;
pub mod record;
pub mod report;

pub use catalog::{CatalogEntry, CatalogId};
pub use config::LedgerConfig;
pub use directory::LibraryDirectory;
pub use error::{ConfigError, LedgerError, Missing};
pub use events::{LoanEvent, LoanTransition};
pub use ledger::{LendingLedger, LibraryId, ReturnReceipt, StockLevel};
pub use member::{Member, MemberId};
pub use observers::{LoanObserver, OverdueNotifier, TransitionLogger};
pub use policy::{LendingPolicy, MemberCategory};
pub use record::{BorrowRecord, LoanId, LoanState};
pub use report::LedgerSnapshot;
