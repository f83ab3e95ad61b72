//! Write-once allow-list of datasource identities.

use crate::error::{DatasourceError, DatasourceResult};
use std::collections::HashSet;
use std::sync::OnceLock;

/// The only place identities are minted. Populated once at startup; every
/// operation naming an identity outside this set is rejected.
#[derive(Debug, Default)]
pub struct RegisteredIdentities {
    set: OnceLock<HashSet<String>>,
}

impl RegisteredIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the set. Fails if it was already populated.
    pub fn initialize<I, S>(&self, identities: I) -> DatasourceResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = identities.into_iter().map(Into::into).collect();
        self.set.set(set).map_err(|_| DatasourceError::AlreadyInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.set.get().is_some()
    }

    /// Exact, case-sensitive membership. Always false before initialization.
    pub fn contains(&self, identity: &str) -> bool {
        self.set.get().is_some_and(|set| set.contains(identity))
    }

    pub fn len(&self) -> usize {
        self.set.get().map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of the identities.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut out: Vec<String> = self.set.get().into_iter().flatten().cloned().collect();
        out.sort();
        out
    }
}
