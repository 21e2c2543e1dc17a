//! ldapsync core library.
//!
//! One-way reconciliation of user accounts from an Active Directory style
//! server into an OpenLDAP style server: configuration, directory clients,
//! attribute encoding conversions, identifier allocation, and the
//! reconciliation engine.

pub mod accounts;
pub mod allocator;
pub mod codec;
pub mod config;
pub mod directory;
pub mod engine;
pub mod errors;
pub mod report;
pub mod shutdown;

// Re-exports for convenience.
pub use allocator::{Allocation, IdentifierAllocator};
pub use config::AppConfig;
pub use directory::{DirectoryClient, DirectoryEntry, LdapDirectory, MemoryDirectory};
pub use engine::ReconciliationEngine;
pub use report::{AccountOutcome, PassReport};
