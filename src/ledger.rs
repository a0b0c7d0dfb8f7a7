use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::{CatalogEntry, CatalogId},
    config::LedgerConfig,
    error::{LedgerError, Missing},
    events::{LoanEvent, LoanTransition},
    member::{Member, MemberId},
    observers::LoanObserver,
    record::{BorrowRecord, LoanId},
    report::{LedgerSnapshot, LoanSummary, TitleSnapshot},
};

/// Unique identifier of a library
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct LibraryId(String);

impl LibraryId {
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

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LibraryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Copy counts of one title at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    /// Copies ever registered
    pub total: u32,
    /// Copies on the shelf
    pub available: u32,
    /// Copies out on active loans
    pub on_loan: usize,
}

/// Outcome of a successful return
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnReceipt {
    /// The loan, now closed
    pub record: BorrowRecord,
    /// Fine owed for returning late; zero when on time
    pub fine: Decimal,
}

/// Registered and shelved copies of one title
#[derive(Debug, Clone, Copy, Default)]
struct Copies {
    /// Copies ever registered
    total: u32,
    /// Copies on the shelf
    available: u32,
}

/// Everything guarded by the ledger lock
#[derive(Debug, Default)]
struct LedgerState {
    /// Registered titles, ordered by id
    catalog: BTreeMap<CatalogId, CatalogEntry>,
    /// Copy counts per title
    stock: HashMap<CatalogId, Copies>,
    /// Active loans per title, in the order they were opened
    active_loans: HashMap<CatalogId, Vec<BorrowRecord>>,
    /// Most recent committed transitions, oldest first
    history: VecDeque<LoanTransition>,
    /// Last loan number handed out
    last_loan: u64,
    /// Last transition sequence number handed out
    last_sequence: u64,
}

impl LedgerState {
    /// Hand out the next loan number
    fn issue_loan_id(&mut self) -> LoanId {
        self.last_loan = self.last_loan.saturating_add(1);
        LoanId::new(self.last_loan)
    }

    /// Stamp a transition with the next sequence number and append it to the history
    fn commit(
        &mut self,
        library_id: &LibraryId,
        catalog_id: &CatalogId,
        event: LoanEvent,
        available_after: u32,
        capacity: usize,
    ) -> LoanTransition {
        self.last_sequence = self.last_sequence.saturating_add(1);
        let transition = LoanTransition {
            sequence: self.last_sequence,
            library_id: library_id.clone(),
            catalog_id: catalog_id.clone(),
            event,
            available_after,
        };

        self.history.push_back(transition.clone());
        while self.history.len() > capacity {
            self.history.pop_front();
        }

        transition
    }

    /// Copy counts for a title, with the number of active loans
    fn stock_level(&self, catalog_id: &CatalogId) -> Option<StockLevel> {
        let copies = self.stock.get(catalog_id)?;
        Some(StockLevel {
            total: copies.total,
            available: copies.available,
            on_loan: self.active_loans.get(catalog_id).map_or(0, Vec::len),
        })
    }
}

/// Per-library authority over copy inventory and active loans
///
/// Every borrow, return and registration runs as a single transition under one
/// write lock, so concurrent callers can never both take the last copy and the
/// copy counts always add up. Reads take the shared lock and may be stale as
/// soon as they return.
pub struct LendingLedger {
    /// Identity of the library
    library_id: LibraryId,
    /// Tunables
    config: LedgerConfig,
    /// Inventory, loan index and history
    state: RwLock<LedgerState>,
    /// Registered transition observers
    observers: Vec<Box<dyn LoanObserver>>,
}

// Manual implementation of Debug for LendingLedger
impl fmt::Debug for LendingLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LendingLedger")
            .field("library_id", &self.library_id)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("observers_count", &self.observers.len())
            .finish()
    }
}

impl LendingLedger {
    /// Create an empty ledger for a library
    #[must_use]
    pub fn new(library_id: impl Into<LibraryId>, config: LedgerConfig) -> Self {
        Self {
            library_id: library_id.into(),
            config,
            state: RwLock::new(LedgerState::default()),
            observers: Vec::new(),
        }
    }

    /// Register an observer to be notified of committed transitions
    pub fn register_observer(&mut self, observer: Box<dyn LoanObserver>) {
        self.observers.push(observer);
    }

    /// Builder form of [`register_observer`](Self::register_observer)
    #[must_use]
    pub fn with_observer(mut self, observer: impl LoanObserver + 'static) -> Self {
        self.register_observer(Box::new(observer));
        self
    }

    /// Get the id of the library this ledger belongs to
    #[must_use]
    pub fn library_id(&self) -> &LibraryId {
        &self.library_id
    }

    /// Get the settings this ledger was created with
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Add a title, or add copies to one already registered
    ///
    /// Counts accumulate across registrations. The metadata of the first
    /// registration is kept.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidArgument` if `copy_count` is zero or the
    /// title's total would overflow.
    pub fn register(&self, entry: CatalogEntry, copy_count: u32) -> Result<(), LedgerError> {
        if copy_count == 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "copy count for {} must be positive",
                entry.id()
            )));
        }

        let transition = {
            let mut guard = self.write_state();
            let state = &mut *guard;
            let catalog_id = entry.id().clone();

            let current = state.stock.get(&catalog_id).copied().unwrap_or_default();
            let (Some(total), Some(available)) =
                (current.total.checked_add(copy_count), current.available.checked_add(copy_count))
            else {
                return Err(LedgerError::InvalidArgument(format!(
                    "registering {copy_count} more copies of {catalog_id} overflows the copy count"
                )));
            };

            state.catalog.entry(catalog_id.clone()).or_insert(entry);
            state.stock.insert(catalog_id.clone(), Copies { total, available });
            state.active_loans.entry(catalog_id.clone()).or_default();

            state.commit(
                &self.library_id,
                &catalog_id,
                LoanEvent::Registered { copies: copy_count, total },
                available,
                self.config.history_capacity,
            )
        };

        self.notify(&transition);
        Ok(())
    }

    /// Whether at least one copy is on the shelf right now
    ///
    /// The answer may be stale by the time the caller acts on it; `borrow`
    /// re-checks availability itself. Unknown titles are never available.
    #[must_use]
    pub fn is_available(&self, catalog_id: &CatalogId) -> bool {
        self.read_state().stock.get(catalog_id).is_some_and(|copies| copies.available > 0)
    }

    /// Lend a copy of `catalog_id` to `member` on `today`
    ///
    /// On success the new active record is stored both in the ledger's loan
    /// index and in the member's records, and a copy of it is returned.
    ///
    /// # Errors
    ///
    /// Checked in this order, with nothing modified on failure:
    /// - `LedgerError::NotFound` if the title is not registered
    /// - `LedgerError::QuotaExceeded` if the member is at their loan limit
    /// - `LedgerError::AlreadyBorrowed` if the member already has this title
    /// - `LedgerError::Unavailable` if every copy is on loan
    pub fn borrow(
        &self,
        catalog_id: &CatalogId,
        member: &mut Member,
        today: NaiveDate,
    ) -> Result<BorrowRecord, LedgerError> {
        let outcome = {
            let mut guard = self.write_state();
            self.check_out(&mut guard, catalog_id, member, today)
        };

        match outcome {
            Ok((record, transition)) => {
                self.notify(&transition);
                Ok(record)
            }
            Err(error) => {
                self.log_denial("borrow", catalog_id, member.id(), &error);
                Err(error)
            }
        }
    }

    /// Take back `member`'s copy of `catalog_id` on `today`
    ///
    /// Closes the loan in both the ledger and the member's records, puts the
    /// copy back on the shelf and reports the fine owed under the member's
    /// policy.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if the title is not registered and
    /// `LedgerError::NoActiveLoan` if the member has no active loan for it.
    /// Nothing is modified on failure.
    pub fn return_copy(
        &self,
        catalog_id: &CatalogId,
        member: &mut Member,
        today: NaiveDate,
    ) -> Result<ReturnReceipt, LedgerError> {
        let outcome = {
            let mut guard = self.write_state();
            self.check_in(&mut guard, catalog_id, member, today)
        };

        match outcome {
            Ok((receipt, transition)) => {
                self.notify(&transition);
                Ok(receipt)
            }
            Err(error) => {
                self.log_denial("return", catalog_id, member.id(), &error);
                Err(error)
            }
        }
    }

    /// All registered titles, ordered by id
    #[must_use]
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.read_state().catalog.values().cloned().collect()
    }

    /// Titles whose title, author or any category contains `query`, ignoring case
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<CatalogEntry> {
        self.read_state().catalog.values().filter(|entry| entry.matches(query)).cloned().collect()
    }

    /// Copy counts of a title, or `None` if it is not registered
    #[must_use]
    pub fn stock(&self, catalog_id: &CatalogId) -> Option<StockLevel> {
        self.read_state().stock_level(catalog_id)
    }

    /// Active loans of a title, oldest first
    #[must_use]
    pub fn active_loans(&self, catalog_id: &CatalogId) -> Vec<BorrowRecord> {
        self.read_state().active_loans.get(catalog_id).cloned().unwrap_or_default()
    }

    /// The most recent committed transitions, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<LoanTransition> {
        self.read_state().history.iter().cloned().collect()
    }

    /// Point-in-time view of every title and its active loans
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.read_state();
        let titles = state
            .catalog
            .values()
            .map(|entry| {
                let loans: Vec<LoanSummary> = state
                    .active_loans
                    .get(entry.id())
                    .map(|loans| loans.iter().map(LoanSummary::from_record).collect())
                    .unwrap_or_default();
                let stock = state.stock_level(entry.id()).unwrap_or_default();
                TitleSnapshot::new(entry, stock, loans)
            })
            .collect();

        LedgerSnapshot::new(self.library_id.clone(), titles)
    }

    /// Check the ledger's bookkeeping against its invariants
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvariantViolation` describing the first breach:
    /// copies not conserved, a loan filed under the wrong title or library, a
    /// closed loan left in the index, or a member holding a title twice.
    pub fn verify_invariants(&self) -> Result<(), LedgerError> {
        let state = self.read_state();

        for (catalog_id, copies) in &state.stock {
            if !state.catalog.contains_key(catalog_id) {
                return Err(LedgerError::InvariantViolation(format!(
                    "{catalog_id} has stock but no catalog entry"
                )));
            }

            let loans = state.active_loans.get(catalog_id).map_or(&[][..], Vec::as_slice);
            let on_loan = u64::try_from(loans.len()).unwrap_or(u64::MAX);
            if u64::from(copies.available).saturating_add(on_loan) != u64::from(copies.total) {
                return Err(LedgerError::InvariantViolation(format!(
                    "{catalog_id}: {} available + {on_loan} on loan != {} total",
                    copies.available, copies.total
                )));
            }

            let mut borrowers = HashSet::new();
            for record in loans {
                if !record.is_active() {
                    return Err(LedgerError::InvariantViolation(format!(
                        "loan {} of {catalog_id} is closed but still indexed",
                        record.loan_id()
                    )));
                }
                if record.catalog_id() != catalog_id || record.library_id() != &self.library_id {
                    return Err(LedgerError::InvariantViolation(format!(
                        "loan {} is filed under {catalog_id} in {} but belongs to {} in {}",
                        record.loan_id(),
                        self.library_id,
                        record.catalog_id(),
                        record.library_id()
                    )));
                }
                if !borrowers.insert(record.member_id()) {
                    return Err(LedgerError::InvariantViolation(format!(
                        "member {} holds {catalog_id} more than once",
                        record.member_id()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Validate and apply a borrow while the write lock is held
    fn check_out(
        &self,
        state: &mut LedgerState,
        catalog_id: &CatalogId,
        member: &mut Member,
        today: NaiveDate,
    ) -> Result<(BorrowRecord, LoanTransition), LedgerError> {
        let available = state
            .stock
            .get(catalog_id)
            .map(|copies| copies.available)
            .ok_or_else(|| LedgerError::NotFound(Missing::Title(catalog_id.clone())))?;

        let policy = member.policy();
        if !member.can_borrow_more() {
            return Err(LedgerError::QuotaExceeded {
                member: member.id().clone(),
                limit: policy.max_active_loans(),
            });
        }

        let already_indexed = state
            .active_loans
            .get(catalog_id)
            .is_some_and(|loans| loans.iter().any(|record| record.member_id() == member.id()));
        if already_indexed || member.active_record(&self.library_id, catalog_id).is_some() {
            return Err(LedgerError::AlreadyBorrowed {
                member: member.id().clone(),
                catalog_id: catalog_id.clone(),
            });
        }

        let remaining = available
            .checked_sub(1)
            .ok_or_else(|| LedgerError::Unavailable { catalog_id: catalog_id.clone() })?;
        let due_date = policy.due_date(today)?;

        // Validation is complete; everything below mutates
        let loan_id = state.issue_loan_id();
        let record = BorrowRecord::open(
            loan_id,
            self.library_id.clone(),
            catalog_id.clone(),
            member.id().clone(),
            today,
            due_date,
        );

        if let Some(copies) = state.stock.get_mut(catalog_id) {
            copies.available = remaining;
        }
        state.active_loans.entry(catalog_id.clone()).or_default().push(record.clone());
        member.attach(record.clone());

        let transition = state.commit(
            &self.library_id,
            catalog_id,
            LoanEvent::Borrowed {
                member_id: member.id().clone(),
                loan_id,
                on: today,
                due: due_date,
            },
            remaining,
            self.config.history_capacity,
        );

        Ok((record, transition))
    }

    /// Validate and apply a return while the write lock is held
    fn check_in(
        &self,
        state: &mut LedgerState,
        catalog_id: &CatalogId,
        member: &mut Member,
        today: NaiveDate,
    ) -> Result<(ReturnReceipt, LoanTransition), LedgerError> {
        let available = state
            .stock
            .get(catalog_id)
            .map(|copies| copies.available)
            .ok_or_else(|| LedgerError::NotFound(Missing::Title(catalog_id.clone())))?;

        // Earliest borrow date wins, then the lowest loan number
        let position = state.active_loans.get(catalog_id).and_then(|loans| {
            loans
                .iter()
                .enumerate()
                .filter(|(_, record)| {
                    record.member_id() == member.id()
                        && member.holds(&self.library_id, record.loan_id())
                })
                .min_by_key(|(_, record)| (record.borrow_date(), record.loan_id()))
                .map(|(position, record)| (position, record.loan_id()))
        });

        let no_active_loan = || LedgerError::NoActiveLoan {
            member: member.id().clone(),
            catalog_id: catalog_id.clone(),
        };
        let (position, loan_id) = position.ok_or_else(no_active_loan)?;
        let restored = available.checked_add(1).ok_or_else(|| {
            LedgerError::InvariantViolation(format!("available copies of {catalog_id} overflow"))
        })?;

        // Validation is complete; everything below mutates
        let returned = member
            .close(&self.library_id, loan_id, today)
            .ok_or_else(|| LedgerError::NoActiveLoan {
                member: member.id().clone(),
                catalog_id: catalog_id.clone(),
            })?;

        if let Some(loans) = state.active_loans.get_mut(catalog_id) {
            if position < loans.len() {
                loans.remove(position);
            }
        }
        if let Some(copies) = state.stock.get_mut(catalog_id) {
            copies.available = restored;
        }

        let fine = member.policy().fine_for(&returned, today);
        let transition = state.commit(
            &self.library_id,
            catalog_id,
            LoanEvent::Returned { member_id: member.id().clone(), loan_id, on: today, fine },
            restored,
            self.config.history_capacity,
        );

        Ok((ReturnReceipt { record: returned, fine }, transition))
    }

    /// Log a denied transition at debug level, if enabled
    fn log_denial(
        &self,
        operation: &str,
        catalog_id: &CatalogId,
        member_id: &MemberId,
        error: &LedgerError,
    ) {
        if self.config.log_denials {
            tracing::debug!(
                library = %self.library_id,
                catalog_id = %catalog_id,
                member = %member_id,
                operation,
                reason = %error,
                "transition denied"
            );
        }
    }

    /// Notify every observer of a committed transition
    fn notify(&self, transition: &LoanTransition) {
        for observer in &self.observers {
            observer.on_transition(transition);
        }
    }

    /// Shared access to the state, recovering from a poisoned lock
    ///
    /// Transitions validate before they mutate, so a panicking holder cannot
    /// leave a half-applied change behind.
    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the state, recovering from a poisoned lock
    fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
