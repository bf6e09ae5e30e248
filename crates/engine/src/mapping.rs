//! Source-to-target table name mapping.

use rustc_hash::FxHashMap;
use walplayer_core::{ReplayError, Result};

/// Maps source table names to the tables their edits are replayed into.
///
/// An empty mapper replays every table under its own name. A non-empty mapper
/// only admits its listed sources; entries for other tables are dropped.
#[derive(Debug, Clone, Default)]
pub struct TableNameMapper {
    pairs: Vec<(String, String)>,
    index: FxHashMap<String, usize>,
}

impl TableNameMapper {
    /// Mapper that passes every table through unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build a mapper from explicit `(source, target)` pairs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a source table appears twice.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut mapper = Self::default();
        for (source, target) in pairs {
            if mapper.index.contains_key(&source) {
                return Err(ReplayError::config(format!(
                    "table '{}' is mapped more than once",
                    source
                )));
            }
            mapper.index.insert(source.clone(), mapper.pairs.len());
            mapper.pairs.push((source, target));
        }
        Ok(mapper)
    }

    /// Build a mapper from positional source and target lists.
    ///
    /// With no targets each source maps to itself.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::MappingArity`] when targets are given and the
    /// lists differ in length.
    pub fn from_lists(sources: &[String], targets: &[String]) -> Result<Self> {
        if targets.is_empty() {
            return Self::new(sources.iter().map(|s| (s.clone(), s.clone())));
        }
        if sources.len() != targets.len() {
            return Err(ReplayError::MappingArity {
                sources: sources.len(),
                targets: targets.len(),
            });
        }
        Self::new(sources.iter().cloned().zip(targets.iter().cloned()))
    }

    /// Target table for `source`, or `None` if the table is not replayed.
    pub fn resolve<'a>(&'a self, source: &'a str) -> Option<&'a str> {
        if self.pairs.is_empty() {
            return Some(source);
        }
        self.index
            .get(source)
            .map(|&slot| self.pairs[slot].1.as_str())
    }

    /// Whether every table maps to itself and none are dropped.
    pub fn is_identity(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Configured `(source, target)` pairs in declaration order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Distinct target tables in declaration order.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::with_capacity(self.pairs.len());
        for (_, target) in &self.pairs {
            if !targets.contains(&target.as_str()) {
                targets.push(target);
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identity_passes_everything() {
        let mapper = TableNameMapper::identity();
        assert!(mapper.is_identity());
        assert_eq!(mapper.resolve("anything"), Some("anything"));
        assert!(mapper.targets().is_empty());
    }

    #[test]
    fn test_positional_mapping() {
        let mapper =
            TableNameMapper::from_lists(&names(&["t1", "t2"]), &names(&["u1", "u2"])).unwrap();
        assert_eq!(mapper.resolve("t1"), Some("u1"));
        assert_eq!(mapper.resolve("t2"), Some("u2"));
        assert_eq!(mapper.resolve("t3"), None);
        assert_eq!(mapper.targets(), vec!["u1", "u2"]);
    }

    #[test]
    fn test_sources_without_targets_map_to_themselves() {
        let mapper = TableNameMapper::from_lists(&names(&["t1"]), &[]).unwrap();
        assert!(!mapper.is_identity());
        assert_eq!(mapper.resolve("t1"), Some("t1"));
        assert_eq!(mapper.resolve("other"), None);
    }

    #[test]
    fn test_no_sources_is_identity() {
        let mapper = TableNameMapper::from_lists(&[], &[]).unwrap();
        assert!(mapper.is_identity());
        assert_eq!(mapper.resolve("t9"), Some("t9"));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = TableNameMapper::from_lists(&names(&["a", "b"]), &names(&["x"])).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::MappingArity {
                sources: 2,
                targets: 1
            }
        ));
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let err = TableNameMapper::from_lists(&names(&["a", "a"]), &names(&["x", "y"])).unwrap_err();
        assert!(matches!(err, ReplayError::Config(_)));
    }

    #[test]
    fn test_many_to_one_targets_deduplicated() {
        let mapper =
            TableNameMapper::from_lists(&names(&["a", "b"]), &names(&["merged", "merged"]))
                .unwrap();
        assert_eq!(mapper.resolve("a"), Some("merged"));
        assert_eq!(mapper.resolve("b"), Some("merged"));
        assert_eq!(mapper.targets(), vec!["merged"]);
    }
}
