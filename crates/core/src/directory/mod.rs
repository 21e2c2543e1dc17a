//! Directory access.
//!
//! [`DirectoryClient`] is the capability the rest of the crate consumes:
//! search, add and modify. [`LdapDirectory`] talks to a real server through
//! `ldap3`, [`MemoryDirectory`] keeps entries in memory, and
//! [`DryRunDirectory`] wraps another client and records writes instead of
//! sending them.

pub mod changeset;
pub mod dry_run;
pub mod entry;
pub mod ldap;
pub mod memory;

use async_trait::async_trait;

pub use changeset::{Changeset, Modification};
pub use dry_run::DryRunDirectory;
pub use entry::{AttributeMap, DirectoryEntry};
pub use ldap::LdapDirectory;
pub use memory::{MemoryDirectory, WriteRecord};

use crate::errors::DirectoryError;

/// Request every user attribute.
pub const ALL_ATTRIBUTES: &[&str] = &["*"];

/// Operations the reconciliation engine needs from a directory.
///
/// Every call is self-contained: implementations that hold network
/// connections open and release them within the call.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Subtree search under `base_dn`. Zero matches is `Ok(vec![])`.
    async fn search(
        &self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Create a new entry with a full initial attribute set.
    async fn add_entry(&self, dn: &str, attributes: &AttributeMap) -> Result<(), DirectoryError>;

    /// Apply the minimal diff described by `changeset` to an existing entry.
    async fn modify_entry(&self, dn: &str, changeset: &Changeset) -> Result<(), DirectoryError>;
}

/// Short description of an attribute set for diagnostics. Password values
/// are never included.
pub fn describe_attributes(attributes: &AttributeMap) -> String {
    attributes.keys().cloned().collect::<Vec<_>>().join(",")
}
