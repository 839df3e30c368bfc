//! Loading and indexing of counter definitions.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::error::Result;
use crate::types::CounterDefinition;

/// The validated, immutable set of counter definitions.
#[derive(Debug, Clone)]
pub struct CounterSet {
    counters: Vec<CounterDefinition>,
}

/// File shape: either a bare JSON array or a `{ "counters": [...] }` wrapper.
#[derive(Deserialize)]
#[serde(untagged)]
enum CounterFile {
    Bare(Vec<CounterDefinition>),
    Wrapped { counters: Vec<CounterDefinition> },
}

impl CounterSet {
    /// Build a set from in-memory definitions, validating each one.
    ///
    /// Definitions keep their load order. Duplicate names within one
    /// index-type namespace are rejected; the same name appearing under
    /// different index types is legal but logged as a merge hazard.
    pub fn from_definitions(counters: Vec<CounterDefinition>) -> Result<Self> {
        let mut scoped = HashSet::new();
        let mut by_name: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, counter) in counters.iter().enumerate() {
            counter.validate(index)?;
            if !scoped.insert((counter.index_type_name.clone(), counter.name.clone())) {
                return Err(ConfigError::DuplicateCounter {
                    index_type: counter.index_type_name.clone(),
                    name: counter.name.clone(),
                });
            }
            *by_name.entry(counter.name.as_str()).or_insert(0) += 1;
        }
        for (name, occurrences) in by_name {
            if occurrences > 1 {
                tracing::warn!(
                    counter = name,
                    occurrences = occurrences,
                    "Counter name appears under multiple index types; merged results are last-write-wins"
                );
            }
        }
        Ok(Self { counters })
    }

    /// Load a set from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let parsed: CounterFile =
            serde_json::from_str(&text).map_err(|e| ConfigError::InvalidJson {
                file: path.display().to_string(),
                error: e.to_string(),
            })?;
        let counters = match parsed {
            CounterFile::Bare(counters) => counters,
            CounterFile::Wrapped { counters } => counters,
        };
        Self::from_definitions(counters)
    }

    /// All definitions, in load order.
    pub fn counters(&self) -> &[CounterDefinition] {
        &self.counters
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Distinct index-type names referenced by the set.
    pub fn index_type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .counters
            .iter()
            .map(|c| c.index_type_name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
#[path = "loader.test.rs"]
mod tests;
