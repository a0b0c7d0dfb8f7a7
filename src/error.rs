use std::{fmt, io};

use crate::{catalog::CatalogId, ledger::LibraryId, member::MemberId};

/// The kind of identifier a lookup failed on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    /// No title with this id is registered in the ledger
    Title(CatalogId),
    /// No library with this id is registered in the directory
    Library(LibraryId),
    /// No member with this id is registered in the directory
    Member(MemberId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title(id) => write!(f, "title {id}"),
            Self::Library(id) => write!(f, "library {id}"),
            Self::Member(id) => write!(f, "member {id}"),
        }
    }
}

/// Errors produced by ledger and directory operations
///
/// A failed operation never leaves partial state behind: every variant is
/// returned before the ledger or the member is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Malformed input, such as registering zero copies
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Unknown title, library or member
    #[error("not found: {0}")]
    NotFound(Missing),
    /// The member already holds as many active loans as the policy allows
    #[error("member {member} has reached the limit of {limit} active loans")]
    QuotaExceeded { member: MemberId, limit: u32 },
    /// The member already holds an active loan for this title
    #[error("member {member} already has {catalog_id} on loan")]
    AlreadyBorrowed { member: MemberId, catalog_id: CatalogId },
    /// Every copy of the title is on loan
    #[error("no copies of {catalog_id} are available")]
    Unavailable { catalog_id: CatalogId },
    /// The member has no active loan for this title
    #[error("member {member} has no active loan for {catalog_id}")]
    NoActiveLoan { member: MemberId, catalog_id: CatalogId },
    /// The ledger's bookkeeping disagrees with itself
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    /// Whether this is an expected, non-exceptional denial rather than a caller error
    #[must_use]
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded { .. }
                | Self::AlreadyBorrowed { .. }
                | Self::Unavailable { .. }
                | Self::NoActiveLoan { .. }
        )
    }
}

/// Errors raised while loading a [`LedgerConfig`](crate::config::LedgerConfig)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
    /// The config file is not valid JSON for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
