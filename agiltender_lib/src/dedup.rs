//! Known-identifier filter for incremental crawls.

use std::collections::BTreeSet;

/// Identifiers the pipeline already has: merged into the database or
/// staged in the page store. `--only-missing` consults this set before
/// paying for a detail fetch.
#[derive(Debug, Default, Clone)]
pub struct KnownIds {
    ids: BTreeSet<String>,
}

impl KnownIds {
    pub fn from_sets(db_ids: BTreeSet<String>, staged_ids: BTreeSet<String>) -> Self {
        let mut ids = db_ids;
        ids.extend(staged_ids);
        Self { ids }
    }

    pub fn contains(&self, idn: &str) -> bool {
        self.ids.contains(idn)
    }

    /// Records an identifier fetched in this run, so repeated listing rows
    /// within the same crawl are skipped too.
    pub fn insert(&mut self, idn: impl Into<String>) {
        self.ids.insert(idn.into());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn union_of_db_and_store() {
        let known = KnownIds::from_sets(
            set(&["1057-1-AG26", "1057-2-AG26"]),
            set(&["1057-2-AG26", "1057-3-AG26"]),
        );
        assert_eq!(known.len(), 3);
        assert!(known.contains("1057-1-AG26"));
        assert!(known.contains("1057-3-AG26"));
        assert!(!known.contains("1057-4-AG26"));
    }

    #[test]
    fn inserts_are_visible() {
        let mut known = KnownIds::default();
        assert!(known.is_empty());
        known.insert("1057-9-AG26");
        assert!(known.contains("1057-9-AG26"));
    }
}
