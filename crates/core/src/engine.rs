//! One-way account reconciliation from the source to the target directory.
//!
//! A pass:
//!
//! 1. Fetch every source account and every target account, once.
//! 2. Index the target accounts by username.
//! 3. Walk the source accounts in fetch order and, for each, skip it,
//!    update its password in the target, or create it in the target.
//!
//! Failures are confined to the account they happen on. A pass aborts only
//! when both fetches come back empty, or when the target listing fails while
//! there are source accounts to reconcile.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::accounts::{source_attrs, target_attrs, SourceAccount, TargetAccount};
use crate::allocator::{Allocation, IdentifierAllocator};
use crate::codec::encode_password;
use crate::config::AppConfig;
use crate::directory::{Changeset, DirectoryClient, DirectoryEntry, ALL_ATTRIBUTES};
use crate::errors::{AccountError, AllocationError, DirectoryError, SyncError};
use crate::report::{AccountOutcome, PassReport, SkipReason};
use crate::shutdown::{is_shutdown_requested, ShutdownFlag};

/// Seconds a source password change must be ahead of the target's recorded
/// change before the password is pushed again.
pub const SKEW_TOLERANCE: i64 = 1;

/// Target accounts keyed by username.
pub type TargetIndex = HashMap<String, TargetAccount>;

/// Mutable state carried from one account to the next within a pass.
#[derive(Debug, Default)]
struct PassState {
    /// Highest identifier handed out so far in this pass.
    last_allocated: Option<u32>,
}

/// Reconciles source accounts into the target directory.
pub struct ReconciliationEngine<'a, S, T> {
    config: &'a AppConfig,
    source: S,
    target: T,
    allocator: IdentifierAllocator,
}

impl<'a, S, T> ReconciliationEngine<'a, S, T>
where
    S: DirectoryClient,
    T: DirectoryClient,
{
    pub fn new(config: &'a AppConfig, source: S, target: T) -> Self {
        info!("initializing reconciliation engine");
        Self {
            config,
            source,
            target,
            allocator: IdentifierAllocator::from_config(&config.target),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn allocator(&self) -> &IdentifierAllocator {
        &self.allocator
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Run one reconciliation pass.
    ///
    /// Per-account failures are recorded in the report and do not stop the
    /// pass. `shutdown` is checked before each account.
    pub async fn run_pass(&self, shutdown: &ShutdownFlag) -> Result<PassReport, SyncError> {
        let mut report = PassReport::start();

        let source_result = self
            .fetch(
                "source",
                &self.source,
                &self.config.source.base_dn,
                &self.config.source.account_filter,
            )
            .await;
        let target_result = self
            .fetch(
                "target",
                &self.target,
                &self.config.target.base_dn,
                &self.config.target.account_filter,
            )
            .await;

        let source_entries = source_result.as_deref().unwrap_or_default();
        let target_entries = target_result.as_deref().unwrap_or_default();

        if source_entries.is_empty() && target_entries.is_empty() {
            error!("neither directory returned any accounts, aborting pass");
            return Err(SyncError::NothingToReconcile {
                source_base_dn: self.config.source.base_dn.clone(),
                target_base_dn: self.config.target.base_dn.clone(),
            });
        }

        // An empty index would turn every existing account into a create.
        let target_entries = match target_result {
            Ok(entries) => entries,
            Err(source) => {
                error!(
                    source_accounts = source_entries.len(),
                    "target listing failed, aborting pass before any write"
                );
                return Err(SyncError::TargetUnavailable {
                    base_dn: self.config.target.base_dn.clone(),
                    source,
                });
            }
        };
        let source_entries = source_result.unwrap_or_default();

        report.source_accounts = source_entries.len();
        report.target_accounts = target_entries.len();

        let index = build_index(&target_entries);
        info!(
            source = source_entries.len(),
            target = index.len(),
            "starting reconciliation pass"
        );

        let mut state = PassState::default();
        for entry in &source_entries {
            if is_shutdown_requested(shutdown) {
                warn!(
                    processed = report.accounts.len(),
                    remaining = source_entries.len() - report.accounts.len(),
                    "shutdown requested, stopping pass early"
                );
                report.cancelled = true;
                break;
            }

            let (account, outcome) = self.reconcile_account(entry, &index, &mut state).await;
            log_outcome(&account, &outcome);
            report.push(account, outcome);
        }

        report.finish();
        let summary = report.summary();
        info!(
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = report.cancelled,
            "reconciliation pass completed"
        );
        Ok(report)
    }

    async fn fetch(
        &self,
        side: &'static str,
        directory: &dyn DirectoryClient,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        match directory.search(base_dn, filter, ALL_ATTRIBUTES).await {
            Ok(entries) => {
                info!(side, base_dn, count = entries.len(), "fetched accounts");
                Ok(entries)
            }
            Err(e) => {
                error!(side, base_dn, error = %e, "failed to fetch accounts");
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Per-account decision
    // -----------------------------------------------------------------------

    async fn reconcile_account(
        &self,
        entry: &DirectoryEntry,
        index: &TargetIndex,
        state: &mut PassState,
    ) -> (String, AccountOutcome) {
        let Some(account) = SourceAccount::from_entry(entry) else {
            return (entry.dn.clone(), AccountOutcome::Skipped(SkipReason::MissingUsername));
        };
        let username = account.username().to_string();

        if self.config.sync.excluded_usernames.contains(account.username()) {
            return (username, AccountOutcome::Skipped(SkipReason::Excluded));
        }

        let Some(hash) = account.password_hash(&self.config.sync.password_hash_attribute) else {
            return (username, AccountOutcome::Skipped(SkipReason::NoPasswordHash));
        };

        let result = match index.get(account.username()) {
            Some(existing) => self.update_password(&account, hash, existing).await,
            None => self.create_account(&account, hash, state).await,
        };

        let outcome = result.unwrap_or_else(AccountOutcome::Failed);
        (username, outcome)
    }

    /// Push the source password to an existing target account when the
    /// source change is newer than the target's by more than the tolerance.
    async fn update_password(
        &self,
        account: &SourceAccount<'_>,
        hash: &str,
        existing: &TargetAccount,
    ) -> Result<AccountOutcome, AccountError> {
        let changed_at = account.password_changed_at()?;

        if let Some(current) = existing.password_changed_at {
            if changed_at <= current.saturating_add(SKEW_TOLERANCE) {
                debug!(
                    username = account.username(),
                    source = changed_at,
                    target = current,
                    "password unchanged"
                );
                return Ok(AccountOutcome::Unchanged);
            }
        }

        let encoded = encode_password(hash).map_err(|e| account.codec_error(e))?;

        let mut changeset = Changeset::new();
        changeset.set(
            target_attrs::PASSWORD,
            existing.password_hashes.clone(),
            vec![encoded],
        );
        changeset.set(
            target_attrs::PWD_LAST_SET,
            existing.raw_password_changed_at.clone(),
            vec![changed_at.to_string()],
        );

        debug!(
            username = account.username(),
            changed_at = %format_unix(changed_at),
            changes = %changeset.describe(),
            "updating password"
        );
        self.target.modify_entry(&existing.dn, &changeset).await?;

        Ok(AccountOutcome::Updated {
            dn: existing.dn.clone(),
        })
    }

    /// Create a target account from the template and the source profile.
    async fn create_account(
        &self,
        account: &SourceAccount<'_>,
        hash: &str,
        state: &mut PassState,
    ) -> Result<AccountOutcome, AccountError> {
        let username = account.username();
        let mut attributes = self.config.sync.new_account_template.clone();

        for attr in source_attrs::PROFILE {
            attributes.insert(attr.into(), account.required_values(attr)?.to_vec());
        }
        attributes.insert(
            target_attrs::HOME_DIRECTORY.into(),
            vec![format!("/home/{username}")],
        );
        attributes.insert(
            target_attrs::HOME_PHONE.into(),
            account.required_values(source_attrs::PHONE)?.to_vec(),
        );
        attributes.insert(
            target_attrs::PWD_LAST_SET.into(),
            vec![account.password_changed_at()?.to_string()],
        );
        attributes.insert(target_attrs::USERNAME.into(), vec![username.into()]);
        attributes.insert(
            target_attrs::PASSWORD.into(),
            vec![encode_password(hash).map_err(|e| account.codec_error(e))?],
        );

        let uid_number = self
            .allocate_identifier(state.last_allocated)
            .await
            .map_err(|source| AccountError::Allocation {
                username: username.into(),
                source,
            })?;
        attributes.insert(target_attrs::UID_NUMBER.into(), vec![uid_number.to_string()]);

        let dn = self.config.target.account_dn(username);
        self.target.add_entry(&dn, &attributes).await?;
        state.last_allocated = Some(uid_number);

        Ok(AccountOutcome::Created { dn, uid_number })
    }

    /// Fresh scan of the target, never below an identifier already handed
    /// out in this pass.
    async fn allocate_identifier(&self, last_allocated: Option<u32>) -> Result<u32, AllocationError> {
        let floor = last_allocated
            .map(|n| n.checked_add(1).ok_or(AllocationError::Exhausted))
            .transpose()?;

        let scanned = match self.allocator.next_identifier(&self.target).await? {
            Allocation::Next(n) => Some(n),
            Allocation::NoPrecedent => self.config.target.first_identifier,
        };

        match (scanned, floor) {
            (Some(scanned), Some(floor)) => Ok(scanned.max(floor)),
            (Some(next), None) | (None, Some(next)) => Ok(next),
            (None, None) => Err(AllocationError::NoPrecedent {
                base_dn: self.allocator.base_dn().into(),
                filter: self.allocator.filter().into(),
            }),
        }
    }
}

/// Index target accounts by username. Entries without a username are
/// ignored; on duplicate usernames the first entry wins.
pub fn build_index(entries: &[DirectoryEntry]) -> TargetIndex {
    let mut index = TargetIndex::with_capacity(entries.len());
    for entry in entries {
        let Some(account) = TargetAccount::from_entry(entry) else {
            warn!(dn = %entry.dn, "target entry has no uid, ignoring");
            continue;
        };
        match index.entry(account.username.clone()) {
            Entry::Occupied(existing) => warn!(
                username = %account.username,
                kept = %existing.get().dn,
                ignored = %account.dn,
                "duplicate uid in target directory"
            ),
            Entry::Vacant(slot) => {
                slot.insert(account);
            }
        }
    }
    index
}

fn log_outcome(account: &str, outcome: &AccountOutcome) {
    match outcome {
        AccountOutcome::Created { dn, uid_number } => {
            info!(account, dn = %dn, uid_number, "created account")
        }
        AccountOutcome::Updated { dn } => info!(account, dn = %dn, "updated password"),
        AccountOutcome::Unchanged => debug!(account, "up to date"),
        AccountOutcome::Skipped(SkipReason::MissingUsername) => {
            warn!(dn = account, "source entry has no username, skipping")
        }
        AccountOutcome::Skipped(reason) => debug!(account, reason = %reason, "skipped"),
        AccountOutcome::Failed(err) => error!(account, error = %err, "account failed"),
    }
}

fn format_unix(seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| seconds.to_string())
}
