//! Next-free numeric identifier (`uidNumber`) for new target accounts.
//!
//! The allocator holds no reservation: every call rescans the target
//! directory. Callers must keep allocation and the following add strictly
//! sequential, otherwise two callers can observe the same maximum.

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::accounts::target_attrs;
use crate::config::TargetConfig;
use crate::directory::DirectoryClient;
use crate::errors::AllocationError;

/// Outcome of an identifier scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    /// One greater than the largest identifier in use.
    Next(u32),
    /// No identifier in use to increment from.
    NoPrecedent,
}

/// Scans a directory subtree for the largest numeric identifier.
#[derive(Debug, Clone)]
pub struct IdentifierAllocator {
    base_dn: String,
    filter: String,
}

impl IdentifierAllocator {
    pub fn new(base_dn: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            filter: filter.into(),
        }
    }

    pub fn from_config(config: &TargetConfig) -> Self {
        Self::new(config.identifier_base_dn(), config.identifier_filter.clone())
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Scan `directory` and return the next free identifier.
    ///
    /// Identifiers are compared numerically. Values that do not parse as an
    /// unsigned integer are logged and ignored.
    #[instrument(skip(self, directory), fields(base_dn = %self.base_dn))]
    pub async fn next_identifier(
        &self,
        directory: &dyn DirectoryClient,
    ) -> Result<Allocation, AllocationError> {
        let entries = directory
            .search(&self.base_dn, &self.filter, &[target_attrs::UID_NUMBER])
            .await?;

        let mut highest: Option<u32> = None;
        for entry in &entries {
            let Some(values) = entry.values(target_attrs::UID_NUMBER) else {
                continue;
            };
            for value in values {
                match value.trim().parse::<u32>() {
                    Ok(n) => highest = Some(highest.map_or(n, |h| h.max(n))),
                    Err(_) => warn!(dn = %entry.dn, value = %value, "ignoring non-numeric uidNumber"),
                }
            }
        }

        match highest {
            Some(max) => {
                let next = max.checked_add(1).ok_or(AllocationError::Exhausted)?;
                debug!(scanned = entries.len(), max, next, "allocated identifier");
                Ok(Allocation::Next(next))
            }
            None => {
                debug!(scanned = entries.len(), "no identifiers in use");
                Ok(Allocation::NoPrecedent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryEntry, MemoryDirectory};
    use crate::errors::DirectoryError;

    const BASE: &str = "dc=example,dc=com";

    fn directory_with(uid_numbers: &[&str]) -> MemoryDirectory {
        MemoryDirectory::with_entries(uid_numbers.iter().enumerate().map(|(i, n)| {
            DirectoryEntry::new(format!("uid=user{i},ou=people,{BASE}"))
                .with_attr("uid", [format!("user{i}")])
                .with_attr("uidNumber", [n.to_string()])
        }))
    }

    fn allocator() -> IdentifierAllocator {
        IdentifierAllocator::new(BASE, "(&(objectClass=posixAccount)(uidNumber=*))")
    }

    #[tokio::test]
    async fn test_next_is_max_plus_one() {
        let dir = directory_with(&["5", "9", "3"]);
        assert_eq!(allocator().next_identifier(&dir).await.unwrap(), Allocation::Next(10));
    }

    #[tokio::test]
    async fn test_ordering_is_numeric() {
        let dir = directory_with(&["9", "10", "100", "20"]);
        assert_eq!(allocator().next_identifier(&dir).await.unwrap(), Allocation::Next(101));
    }

    #[tokio::test]
    async fn test_empty_directory_has_no_precedent() {
        let dir = MemoryDirectory::new();
        assert_eq!(
            allocator().next_identifier(&dir).await.unwrap(),
            Allocation::NoPrecedent
        );
    }

    #[tokio::test]
    async fn test_non_numeric_values_are_ignored() {
        let dir = directory_with(&["abc", "7", ""]);
        assert_eq!(allocator().next_identifier(&dir).await.unwrap(), Allocation::Next(8));

        let dir = directory_with(&["abc"]);
        assert_eq!(
            allocator().next_identifier(&dir).await.unwrap(),
            Allocation::NoPrecedent
        );
    }

    #[tokio::test]
    async fn test_search_failure_is_an_error() {
        let dir = directory_with(&["5"]);
        dir.set_unavailable(true);
        let result = allocator().next_identifier(&dir).await;
        assert!(matches!(
            result,
            Err(AllocationError::Search(DirectoryError::Connection { .. }))
        ));
    }

    #[tokio::test]
    async fn test_exhausted() {
        let max = u32::MAX.to_string();
        let dir = directory_with(&[max.as_str()]);
        assert!(matches!(
            allocator().next_identifier(&dir).await,
            Err(AllocationError::Exhausted)
        ));
    }
}
