//! Outcome of a reconciliation pass.
//!
//! These types bridge the engine and the CLI's table / JSON output.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::errors::AccountError;

// ---------------------------------------------------------------------------
// Per-account outcome
// ---------------------------------------------------------------------------

/// Why an account was left alone without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The source entry has no username.
    MissingUsername,
    /// The username is on the exclusion list.
    Excluded,
    /// The source entry carries no password hash.
    NoPasswordHash,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingUsername => write!(f, "missing username"),
            Self::Excluded => write!(f, "excluded"),
            Self::NoPasswordHash => write!(f, "no password hash"),
        }
    }
}

/// What the engine did with one source account.
#[derive(Debug)]
pub enum AccountOutcome {
    Created { dn: String, uid_number: u32 },
    Updated { dn: String },
    Unchanged,
    Skipped(SkipReason),
    Failed(AccountError),
}

impl AccountOutcome {
    /// Short status word.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Unchanged => "unchanged",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }

    /// Human-readable detail for the status.
    pub fn detail(&self) -> String {
        match self {
            Self::Created { dn, uid_number } => format!("{dn} (uidNumber {uid_number})"),
            Self::Updated { dn } => dn.clone(),
            Self::Unchanged => String::new(),
            Self::Skipped(reason) => reason.to_string(),
            Self::Failed(err) => err.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl Serialize for AccountOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AccountOutcome", 2)?;
        state.serialize_field("status", self.status())?;
        state.serialize_field("detail", &self.detail())?;
        state.end()
    }
}

/// One row of a pass report.
#[derive(Debug, Serialize)]
pub struct AccountReport {
    /// Username, or the entry DN when the username is missing.
    pub account: String,
    pub outcome: AccountOutcome,
}

// ---------------------------------------------------------------------------
// Pass report
// ---------------------------------------------------------------------------

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Everything that happened in one reconciliation pass.
#[derive(Debug, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub source_accounts: usize,
    pub target_accounts: usize,
    /// The pass stopped early because shutdown was requested.
    pub cancelled: bool,
    pub accounts: Vec<AccountReport>,
}

impl PassReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            source_accounts: 0,
            target_accounts: 0,
            cancelled: false,
            accounts: Vec::new(),
        }
    }

    pub fn push(&mut self, account: impl Into<String>, outcome: AccountOutcome) {
        self.accounts.push(AccountReport {
            account: account.into(),
            outcome,
        });
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Outcome recorded for `account`, if it was processed.
    pub fn outcome_of(&self, account: &str) -> Option<&AccountOutcome> {
        self.accounts
            .iter()
            .find(|r| r.account == account)
            .map(|r| &r.outcome)
    }

    pub fn summary(&self) -> PassSummary {
        let mut summary = PassSummary::default();
        for report in &self.accounts {
            match report.outcome {
                AccountOutcome::Created { .. } => summary.created += 1,
                AccountOutcome::Updated { .. } => summary.updated += 1,
                AccountOutcome::Unchanged => summary.unchanged += 1,
                AccountOutcome::Skipped(_) => summary.skipped += 1,
                AccountOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut report = PassReport::start();
        report.push("alice", AccountOutcome::Created {
            dn: "uid=alice".into(),
            uid_number: 10,
        });
        report.push("bob", AccountOutcome::Unchanged);
        report.push("carol", AccountOutcome::Skipped(SkipReason::Excluded));
        report.push(
            "dave",
            AccountOutcome::Failed(AccountError::MissingAttribute {
                username: "dave".into(),
                attribute: "mail".into(),
            }),
        );
        report.finish();

        assert_eq!(
            report.summary(),
            PassSummary {
                created: 1,
                updated: 0,
                unchanged: 1,
                skipped: 1,
                failed: 1,
            }
        );
        assert!(report.completed_at.is_some());
        assert!(report.outcome_of("dave").unwrap().is_failure());
        assert!(report.outcome_of("zoe").is_none());
    }

    #[test]
    fn test_outcome_serializes_status_and_detail() {
        let json = serde_json::to_value(AccountOutcome::Skipped(SkipReason::NoPasswordHash)).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["detail"], "no password hash");
    }
}
