//! Registry validation of package names.
//!
//! The registry is advisory: when it cannot be reached every candidate is
//! treated as valid and the outcome is flagged with `error`, so offline work
//! is never blocked.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::sources::RegistryIndex;

/// Result of validating a set of names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: BTreeSet<String>,
    pub invalid: BTreeSet<String>,
    /// The registry could not be consulted
    pub error: bool,
    pub message: String,
}

/// Index state for the session.
enum IndexState {
    NotFetched,
    Fetched(BTreeSet<String>),
    Failed(String),
}

/// Validates names against a registry index, caching per invocation.
pub struct RegistryValidator {
    index: Box<dyn RegistryIndex>,
    offline: bool,
    state: IndexState,
    cache: HashMap<String, bool>,
}

impl RegistryValidator {
    pub fn new(index: Box<dyn RegistryIndex>) -> Self {
        RegistryValidator {
            index,
            offline: false,
            state: IndexState::NotFetched,
            cache: HashMap::new(),
        }
    }

    /// Skip the network entirely.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Number of names with a cached verdict.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Fetch the index once per session; a failure is remembered too.
    fn ensure_index(&mut self) {
        if !matches!(self.state, IndexState::NotFetched) {
            return;
        }
        tracing::debug!("fetching package index from {}", self.index.describe());
        self.state = match self.index.fetch_names() {
            Ok(names) => IndexState::Fetched(names),
            Err(e) => {
                tracing::debug!("registry unavailable: {:#}", e);
                IndexState::Failed(format!("{:#}", e))
            }
        };
    }

    /// Partition `candidates` into valid and invalid names.
    pub fn validate<'a, I>(&mut self, candidates: I) -> ValidationOutcome
    where
        I: IntoIterator<Item = &'a String>,
    {
        let candidates: BTreeSet<String> = candidates.into_iter().cloned().collect();
        let mut outcome = ValidationOutcome::default();

        if self.offline {
            outcome.valid = candidates;
            outcome.error = true;
            outcome.message = "offline: registry validation skipped".to_string();
            return outcome;
        }

        let uncached: Vec<&String> = candidates
            .iter()
            .filter(|n| !self.cache.contains_key(*n))
            .collect();
        if !uncached.is_empty() {
            self.ensure_index();
        }

        let mut provisional = 0;
        for name in &candidates {
            let verdict = match self.cache.get(name) {
                Some(v) => Some(*v),
                None => match &self.state {
                    IndexState::Fetched(names) => {
                        let v = names.contains(name);
                        self.cache.insert(name.clone(), v);
                        Some(v)
                    }
                    _ => None,
                },
            };
            match verdict {
                Some(false) => {
                    outcome.invalid.insert(name.clone());
                }
                Some(true) => {
                    outcome.valid.insert(name.clone());
                }
                None => {
                    provisional += 1;
                    outcome.valid.insert(name.clone());
                }
            }
        }

        if let IndexState::Failed(reason) = &self.state {
            if provisional > 0 {
                outcome.error = true;
                outcome.message = format!(
                    "registry unavailable, {} names treated as valid: {}",
                    provisional, reason
                );
                return outcome;
            }
        }

        outcome.message = format!(
            "{} valid, {} not found in registry",
            outcome.valid.len(),
            outcome.invalid.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    use anyhow::{bail, Result};

    use crate::sources::StaticIndex;

    /// Index that counts fetches and can be made to fail.
    struct CountingIndex {
        names: BTreeSet<String>,
        fail: bool,
        fetches: Rc<Cell<usize>>,
    }

    impl RegistryIndex for CountingIndex {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        fn fetch_names(&self) -> Result<BTreeSet<String>> {
            self.fetches.set(self.fetches.get() + 1);
            if self.fail {
                bail!("operation timed out");
            }
            Ok(self.names.clone())
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_partition() {
        let mut validator = RegistryValidator::new(Box::new(StaticIndex::new(["alpha", "beta"])));
        let outcome = validator.validate(&names(&["alpha", "beta", "gamma"]));
        assert!(!outcome.error);
        assert_eq!(outcome.valid.len(), 2);
        assert!(outcome.invalid.contains("gamma"));
    }

    #[test]
    fn test_index_fetched_once_and_cached() {
        let fetches = Rc::new(Cell::new(0));
        let index = CountingIndex {
            names: ["alpha".to_string()].into(),
            fail: false,
            fetches: Rc::clone(&fetches),
        };
        let mut validator = RegistryValidator::new(Box::new(index));

        validator.validate(&names(&["alpha", "zeta"]));
        validator.validate(&names(&["alpha", "omega"]));
        validator.validate(&names(&["alpha"]));
        assert_eq!(fetches.get(), 1);
        assert_eq!(validator.cached(), 3);
    }

    #[test]
    fn test_timeout_treats_everything_as_valid() {
        let fetches = Rc::new(Cell::new(0));
        let index = CountingIndex {
            names: BTreeSet::new(),
            fail: true,
            fetches: Rc::clone(&fetches),
        };
        let mut validator = RegistryValidator::new(Box::new(index));

        let outcome = validator.validate(&names(&["alpha", "beta"]));
        assert!(outcome.error);
        assert!(outcome.invalid.is_empty());
        assert_eq!(outcome.valid.len(), 2);
        assert!(outcome.message.contains("timed out"));

        // Nothing is cached as invalid and the failing fetch is not retried
        assert_eq!(validator.cached(), 0);
        validator.validate(&names(&["gamma"]));
        assert_eq!(fetches.get(), 1);
    }

    #[test]
    fn test_offline_skips_network() {
        let fetches = Rc::new(Cell::new(0));
        let index = CountingIndex {
            names: BTreeSet::new(),
            fail: false,
            fetches: Rc::clone(&fetches),
        };
        let mut validator = RegistryValidator::new(Box::new(index)).offline(true);
        let outcome = validator.validate(&names(&["alpha"]));
        assert!(outcome.error);
        assert!(outcome.valid.contains("alpha"));
        assert_eq!(fetches.get(), 0);
    }

    #[test]
    fn test_empty_candidates_never_fetch() {
        let fetches = Rc::new(Cell::new(0));
        let index = CountingIndex {
            names: BTreeSet::new(),
            fail: true,
            fetches: Rc::clone(&fetches),
        };
        let mut validator = RegistryValidator::new(Box::new(index));
        let outcome = validator.validate(&Vec::<String>::new());
        assert!(!outcome.error);
        assert_eq!(fetches.get(), 0);
    }
}
