use std::{
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// Unique identifier of a title, typically its ISBN
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct CatalogId(String);

impl CatalogId {
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

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CatalogId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Bibliographic record of a title
///
/// Entries are immutable once created. Two entries are equal when their ids
/// are equal, whatever their metadata says.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogEntry {
    /// Identity of the title
    id: CatalogId,
    /// Display title
    title: String,
    /// Author as printed on the title page
    author: String,
    /// Subject categories
    categories: BTreeSet<String>,
}

impl CatalogEntry {
    /// Create a new catalog entry
    #[must_use]
    pub fn new<I, S>(
        id: impl Into<CatalogId>,
        title: impl Into<String>,
        author: impl Into<String>,
        categories: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    /// Get the catalog id
    #[must_use]
    pub fn id(&self) -> &CatalogId {
        &self.id
    }

    /// Get the title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Get the author
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Get the categories, in sorted order
    #[must_use]
    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Case-insensitive substring match against title, author or any category
    ///
    /// An empty query matches every entry.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.author.to_lowercase().contains(&needle)
            || self.categories.iter().any(|category| category.to_lowercase().contains(&needle))
    }
}

impl PartialEq for CatalogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CatalogEntry {}

impl Hash for CatalogEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl From<String> for CatalogId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    /// Helper function for a well-known entry
    fn effective_java() -> CatalogEntry {
        CatalogEntry::new(
            "978-0134685991",
            "Effective Java",
            "Joshua Bloch",
            ["Programming", "Java"],
        )
    }

    #[test]
    fn test_matches_title_author_and_category() {
        let entry = effective_java();

        assert!(entry.matches("java"));
        assert!(entry.matches("BLOCH"));
        assert!(entry.matches("programming"));
        assert!(entry.matches(""));
        assert!(!entry.matches("design"));
    }

    #[test]
    fn test_identity_ignores_metadata() {
        let original = effective_java();
        let retitled =
            CatalogEntry::new("978-0134685991", "Effective Java, 3rd Ed.", "J. Bloch", ["Java"]);

        assert_eq!(original, retitled);

        let set: HashSet<CatalogEntry> = [original, retitled].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}
