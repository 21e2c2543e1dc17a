//! Read-through wrapper that records writes instead of sending them.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use super::changeset::{describe, Changeset};
use super::entry::{AttributeMap, DirectoryEntry};
use super::memory::WriteRecord;
use super::{describe_attributes, DirectoryClient};
use crate::errors::DirectoryError;

/// Wraps a directory so searches hit the real server while adds and
/// modifies are only logged and recorded.
#[derive(Debug)]
pub struct DryRunDirectory<D> {
    inner: D,
    recorded: Mutex<Vec<WriteRecord>>,
}

impl<D> DryRunDirectory<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Writes that would have been sent, in order.
    pub fn recorded(&self) -> Vec<WriteRecord> {
        self.recorded
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    fn record(&self, write: WriteRecord) {
        match self.recorded.lock() {
            Ok(mut writes) => writes.push(write),
            Err(poisoned) => poisoned.into_inner().push(write),
        }
    }
}

#[async_trait]
impl<D: DirectoryClient> DirectoryClient for DryRunDirectory<D> {
    async fn search(
        &self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.inner.search(base_dn, filter, attributes).await
    }

    async fn add_entry(&self, dn: &str, attributes: &AttributeMap) -> Result<(), DirectoryError> {
        info!(dn, attributes = %describe_attributes(attributes), "dry run: would add entry");
        self.record(WriteRecord::Add {
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
        info!(dn, changes = %describe(&modifications), "dry run: would modify entry");
        self.record(WriteRecord::Modify {
            dn: dn.into(),
            modifications,
        });
        Ok(())
    }
}
