use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::NaiveDate;

use crate::{
    catalog::{CatalogEntry, CatalogId},
    error::{LedgerError, Missing},
    ledger::{LendingLedger, LibraryId, ReturnReceipt},
    member::{Member, MemberId},
    record::BorrowRecord,
};

/// Registry of libraries and members
///
/// Forwards borrows and returns to the named library's ledger. Each member sits
/// behind its own mutex; a call always locks the member before the ledger, so
/// two directory calls can never wait on each other in opposite order.
#[derive(Debug, Default)]
pub struct LibraryDirectory {
    /// Ledgers by library id
    libraries: BTreeMap<LibraryId, Arc<LendingLedger>>,
    /// Members by member id
    members: BTreeMap<MemberId, Arc<Mutex<Member>>>,
}

impl LibraryDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a library
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidArgument` if a library with the same id is
    /// already registered. Its loans stay with the ledger already in place.
    pub fn add_library(
        &mut self,
        ledger: LendingLedger,
    ) -> Result<Arc<LendingLedger>, LedgerError> {
        match self.libraries.entry(ledger.library_id().clone()) {
            Entry::Occupied(slot) => {
                tracing::warn!(library = %slot.key(), "duplicate library rejected");
                Err(LedgerError::InvalidArgument(format!(
                    "library {} is already registered",
                    slot.key()
                )))
            }
            Entry::Vacant(slot) => Ok(Arc::clone(slot.insert(Arc::new(ledger)))),
        }
    }

    /// Add a member
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidArgument` if a member with the same id is
    /// already registered. The registered member keeps its loans.
    pub fn add_member(&mut self, member: Member) -> Result<Arc<Mutex<Member>>, LedgerError> {
        match self.members.entry(member.id().clone()) {
            Entry::Occupied(slot) => {
                tracing::warn!(member = %slot.key(), "duplicate member rejected");
                Err(LedgerError::InvalidArgument(format!(
                    "member {} is already registered",
                    slot.key()
                )))
            }
            Entry::Vacant(slot) => Ok(Arc::clone(slot.insert(Arc::new(Mutex::new(member))))),
        }
    }

    /// Look up a library's ledger
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if no library has this id.
    pub fn library(&self, library_id: &LibraryId) -> Result<&Arc<LendingLedger>, LedgerError> {
        self.libraries
            .get(library_id)
            .ok_or_else(|| LedgerError::NotFound(Missing::Library(library_id.clone())))
    }

    /// Look up a member
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if no member has this id.
    pub fn member(&self, member_id: &MemberId) -> Result<&Arc<Mutex<Member>>, LedgerError> {
        self.members
            .get(member_id)
            .ok_or_else(|| LedgerError::NotFound(Missing::Member(member_id.clone())))
    }

    /// Every registered library, ordered by id
    pub fn libraries(&self) -> impl Iterator<Item = &Arc<LendingLedger>> {
        self.libraries.values()
    }

    /// Run `f` with shared access to a member
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if no member has this id.
    pub fn with_member<R>(
        &self,
        member_id: &MemberId,
        f: impl FnOnce(&Member) -> R,
    ) -> Result<R, LedgerError> {
        let member = lock(self.member(member_id)?);
        Ok(f(&*member))
    }

    /// Borrow a title from a library on behalf of a member
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` for an unknown library or member, and
    /// otherwise whatever [`LendingLedger::borrow`] returns.
    pub fn borrow(
        &self,
        library_id: &LibraryId,
        member_id: &MemberId,
        catalog_id: &CatalogId,
        today: NaiveDate,
    ) -> Result<BorrowRecord, LedgerError> {
        let ledger = self.library(library_id)?;
        let member = self.member(member_id)?;
        let mut member = lock(member);
        ledger.borrow(catalog_id, &mut member, today)
    }

    /// Return a title to a library on behalf of a member
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` for an unknown library or member, and
    /// otherwise whatever [`LendingLedger::return_copy`] returns.
    pub fn return_copy(
        &self,
        library_id: &LibraryId,
        member_id: &MemberId,
        catalog_id: &CatalogId,
        today: NaiveDate,
    ) -> Result<ReturnReceipt, LedgerError> {
        let ledger = self.library(library_id)?;
        let member = self.member(member_id)?;
        let mut member = lock(member);
        ledger.return_copy(catalog_id, &mut member, today)
    }

    /// Search one library's catalog
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if no library has this id.
    pub fn search(
        &self,
        library_id: &LibraryId,
        query: &str,
    ) -> Result<Vec<CatalogEntry>, LedgerError> {
        Ok(self.library(library_id)?.search(query))
    }

    /// Search every library, listing each matching title once, ordered by id
    #[must_use]
    pub fn search_all(&self, query: &str) -> Vec<CatalogEntry> {
        let mut found = BTreeMap::new();
        for ledger in self.libraries.values() {
            for entry in ledger.search(query) {
                found.entry(entry.id().clone()).or_insert(entry);
            }
        }
        found.into_values().collect()
    }
}

/// Lock a member, recovering from a poisoned mutex
fn lock(member: &Mutex<Member>) -> MutexGuard<'_, Member> {
    member.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::{
        config::LedgerConfig,
        policy::{LendingPolicy, MemberCategory},
    };

    /// Date `offset` days after the first of January 2024
    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.checked_add_days(chrono::Days::new(offset)))
            .unwrap_or_default()
    }

    /// Helper function to set up two libraries sharing one title and one student
    fn setup_directory() -> Result<LibraryDirectory, LedgerError> {
        let mut directory = LibraryDirectory::new();

        let first = LendingLedger::new("Library 1", LedgerConfig::default());
        first.register(
            CatalogEntry::new(
                "978-0134685991",
                "Effective Java",
                "Joshua Bloch",
                ["Programming", "Java"],
            ),
            1,
        )?;
        let second = LendingLedger::new("Library 2", LedgerConfig::default());
        second.register(
            CatalogEntry::new(
                "978-0201616224",
                "Design Patterns",
                "Gang of Four",
                ["Programming", "Design"],
            ),
            1,
        )?;
        // Same title held by both libraries
        second.register(
            CatalogEntry::new(
                "978-0134685991",
                "Effective Java",
                "Joshua Bloch",
                ["Programming", "Java"],
            ),
            2,
        )?;

        directory.add_library(first)?;
        directory.add_library(second)?;
        directory.add_member(Member::student("S001", "Alice Johnson", "alice@email.com"))?;
        Ok(directory)
    }

    #[test]
    fn test_search_all_deduplicates() -> Result<(), LedgerError> {
        let directory = setup_directory()?;

        let found = directory.search_all("programming");
        let ids: Vec<&str> = found.iter().map(|entry| entry.id().as_str()).collect();
        assert_eq!(ids, ["978-0134685991", "978-0201616224"]);

        assert_eq!(directory.search(&LibraryId::new("Library 1"), "design")?.len(), 0);
        Ok(())
    }

    #[test]
    fn test_unknown_library_and_member() -> Result<(), LedgerError> {
        let directory = setup_directory()?;
        let title = CatalogId::new("978-0134685991");

        let nowhere = LibraryId::new("Nowhere");
        let result = directory.borrow(&nowhere, &MemberId::new("S001"), &title, day(0));
        assert_eq!(result, Err(LedgerError::NotFound(Missing::Library(nowhere))));

        let stranger = MemberId::new("X999");
        let result = directory.borrow(&LibraryId::new("Library 1"), &stranger, &title, day(0));
        assert_eq!(result, Err(LedgerError::NotFound(Missing::Member(stranger))));

        assert!(directory.search(&LibraryId::new("Nowhere"), "java").is_err());
        Ok(())
    }

    #[test]
    fn test_same_title_held_from_two_libraries() -> Result<(), LedgerError> {
        let directory = setup_directory()?;
        let java = CatalogId::new("978-0134685991");
        let alice = MemberId::new("S001");

        directory.borrow(&LibraryId::new("Library 1"), &alice, &java, day(0))?;
        // Each library tracks its own copies, so the same title may be held from both
        directory.borrow(&LibraryId::new("Library 2"), &alice, &java, day(0))?;

        assert_eq!(directory.with_member(&alice, Member::active_count)?, 2);

        let receipt =
            directory.return_copy(&LibraryId::new("Library 2"), &alice, &java, day(3))?;
        assert_eq!(receipt.fine, Decimal::ZERO);
        assert_eq!(receipt.record.library_id(), &LibraryId::new("Library 2"));
        assert_eq!(directory.with_member(&alice, Member::active_count)?, 1);

        assert!(directory.library(&LibraryId::new("Library 1"))?.verify_invariants().is_ok());
        assert!(directory.library(&LibraryId::new("Library 2"))?.verify_invariants().is_ok());
        Ok(())
    }

    #[test]
    fn test_quota_spans_libraries() -> Result<(), LedgerError> {
        let mut directory = setup_directory()?;
        let java = CatalogId::new("978-0134685991");
        let visitor = MemberId::new("V001");
        let single_loan = LendingPolicy::new(1, 7, Decimal::ZERO)?;
        directory.add_member(Member::new(
            visitor.clone(),
            "Visiting Reader",
            "visitor@email.com",
            MemberCategory::Custom(single_loan),
        ))?;

        directory.borrow(&LibraryId::new("Library 1"), &visitor, &java, day(0))?;
        let result = directory.borrow(&LibraryId::new("Library 2"), &visitor, &java, day(0));
        assert_eq!(
            result,
            Err(LedgerError::QuotaExceeded { member: visitor.clone(), limit: 1 })
        );

        let second = directory.library(&LibraryId::new("Library 2"))?;
        assert!(second.is_available(&java));
        assert_eq!(second.stock(&java).map(|stock| stock.on_loan), Some(0));
        assert_eq!(directory.with_member(&visitor, Member::active_count)?, 1);
        Ok(())
    }

    #[test]
    fn test_duplicate_member_rejected() -> Result<(), LedgerError> {
        let mut directory = setup_directory()?;
        let library = LibraryId::new("Library 1");
        let java = CatalogId::new("978-0134685991");
        let alice = MemberId::new("S001");

        directory.borrow(&library, &alice, &java, day(0))?;

        let duplicate = Member::student("S001", "Alice Again", "alice2@email.com");
        let result = directory.add_member(duplicate);
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));

        // The registered member keeps the loan and can still bring it back
        let name = directory.with_member(&alice, |member| member.name().to_string())?;
        assert_eq!(name, "Alice Johnson");
        directory.return_copy(&library, &alice, &java, day(1))?;

        let ledger = directory.library(&library)?;
        assert!(ledger.is_available(&java));
        assert!(ledger.verify_invariants().is_ok());
        Ok(())
    }

    #[test]
    fn test_duplicate_library_rejected() -> Result<(), LedgerError> {
        let mut directory = setup_directory()?;
        let library = LibraryId::new("Library 1");
        let java = CatalogId::new("978-0134685991");
        let alice = MemberId::new("S001");

        directory.borrow(&library, &alice, &java, day(0))?;

        let duplicate = LendingLedger::new("Library 1", LedgerConfig::default());
        let result = directory.add_library(duplicate);
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
        assert_eq!(directory.libraries().count(), 2);

        // The loan still belongs to the original ledger
        let ledger = directory.library(&library)?;
        assert_eq!(ledger.stock(&java).map(|stock| stock.on_loan), Some(1));
        directory.return_copy(&library, &alice, &java, day(1))?;
        assert!(ledger.is_available(&java));
        assert_eq!(directory.with_member(&alice, Member::active_count)?, 0);
        Ok(())
    }
}
