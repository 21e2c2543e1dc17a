//! In-memory directory.
//!
//! Holds entries in a map keyed by DN and applies writes to them. Search
//! returns every entry below the base DN; the filter is not evaluated.
//! Failures can be injected to exercise the error paths of callers.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::changeset::{describe, Changeset, Modification};
use super::entry::{AttributeMap, DirectoryEntry};
use super::{describe_attributes, DirectoryClient};
use crate::errors::DirectoryError;

const MEMORY_URL: &str = "memory://";

/// A write accepted by a [`MemoryDirectory`] or recorded by a
/// [`DryRunDirectory`](super::DryRunDirectory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteRecord {
    Add {
        dn: String,
        attributes: AttributeMap,
    },
    Modify {
        dn: String,
        modifications: Vec<Modification>,
    },
}

impl WriteRecord {
    pub fn dn(&self) -> &str {
        match self {
            Self::Add { dn, .. } | Self::Modify { dn, .. } => dn,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, DirectoryEntry>,
    writes: Vec<WriteRecord>,
    searches: usize,
    unavailable: bool,
    failing_dns: HashSet<String>,
    failing_bases: HashSet<String>,
}

/// Directory held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: Mutex<MemoryState>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        let directory = Self::new();
        for entry in entries {
            directory.insert(entry);
        }
        directory
    }

    /// Insert or replace an entry without recording a write.
    pub fn insert(&self, entry: DirectoryEntry) {
        self.lock().entries.insert(entry.dn.clone(), entry);
    }

    pub fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        self.lock().entries.get(dn).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes accepted so far, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn search_count(&self) -> usize {
        self.lock().searches
    }

    /// Make every operation fail as if the server were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Reject every search whose base is exactly `base_dn` (compared
    /// case-insensitively) as a server-side search failure.
    pub fn fail_searches_under(&self, base_dn: &str) {
        self.lock().failing_bases.insert(base_dn.to_ascii_lowercase());
    }

    /// Reject every add or modify targeting `dn`.
    pub fn fail_writes_to(&self, dn: impl Into<String>) {
        self.lock().failing_dns.insert(dn.into());
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn unavailable() -> DirectoryError {
    DirectoryError::Connection {
        url: MEMORY_URL.into(),
        detail: "directory marked unavailable".into(),
    }
}

fn is_below(dn: &str, base_dn: &str) -> bool {
    dn.to_ascii_lowercase()
        .ends_with(&base_dn.to_ascii_lowercase())
}

fn apply(entry: &mut DirectoryEntry, modification: &Modification) {
    match modification {
        Modification::Add { attr, values } => entry
            .attrs
            .entry(attr.clone())
            .or_default()
            .extend(values.iter().cloned()),
        Modification::Delete { attr } => {
            entry.attrs.retain(|key, _| !key.eq_ignore_ascii_case(attr));
        }
        Modification::Replace { attr, values } => {
            entry.attrs.retain(|key, _| !key.eq_ignore_ascii_case(attr));
            entry.attrs.insert(attr.clone(), values.clone());
        }
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn search(
        &self,
        base_dn: &str,
        filter: &str,
        _attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(unavailable());
        }
        state.searches += 1;
        if state.failing_bases.contains(&base_dn.to_ascii_lowercase()) {
            return Err(DirectoryError::Search {
                base_dn: base_dn.into(),
                filter: filter.into(),
                detail: "size limit exceeded".into(),
            });
        }
        let entries: Vec<DirectoryEntry> = state
            .entries
            .values()
            .filter(|entry| is_below(&entry.dn, base_dn))
            .cloned()
            .collect();
        debug!(base_dn, count = entries.len(), "memory search");
        Ok(entries)
    }

    async fn add_entry(&self, dn: &str, attributes: &AttributeMap) -> Result<(), DirectoryError> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(unavailable());
        }
        let add_error = |detail: &str| DirectoryError::Add {
            dn: dn.into(),
            attributes: describe_attributes(attributes),
            detail: detail.into(),
        };
        if state.failing_dns.contains(dn) {
            return Err(add_error("rejected by injected failure"));
        }
        if state.entries.contains_key(dn) {
            return Err(add_error("entry already exists"));
        }

        let entry = DirectoryEntry {
            dn: dn.into(),
            attrs: attributes.clone(),
            bin_attrs: BTreeMap::new(),
        };
        state.entries.insert(dn.into(), entry);
        state.writes.push(WriteRecord::Add {
            dn: dn.into(),
            attributes: attributes.clone(),
        });
        Ok(())
    }

    async fn modify_entry(&self, dn: &str, changeset: &Changeset) -> Result<(), DirectoryError> {
        let modifications = changeset.modifications();
        if modifications.is_empty() {
            return Ok(());
        }

        let mut state = self.lock();
        if state.unavailable {
            return Err(unavailable());
        }
        let modify_error = |detail: &str| DirectoryError::Modify {
            dn: dn.into(),
            changes: describe(&modifications),
            detail: detail.into(),
        };
        if state.failing_dns.contains(dn) {
            return Err(modify_error("rejected by injected failure"));
        }

        let Some(entry) = state.entries.get_mut(dn) else {
            return Err(modify_error("entry does not exist"));
        };
        for modification in &modifications {
            apply(entry, modification);
        }
        state.writes.push(WriteRecord::Modify {
            dn: dn.into(),
            modifications,
        });
        Ok(())
    }
}
