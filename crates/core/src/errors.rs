//! Error types for the ldapsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

// ---------------------------------------------------------------------------
// Directory errors
// ---------------------------------------------------------------------------

/// Errors from directory operations (connect, bind, search, add, modify).
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The server could not be reached or the session broke down.
    #[error("cannot connect to directory '{url}': {detail}")]
    Connection { url: String, detail: String },

    /// The server rejected the bind credentials (LDAP result code 49).
    #[error("invalid credentials for '{bind_dn}' on '{url}'")]
    InvalidCredentials { url: String, bind_dn: String },

    /// The server rejected a search after the connection was established.
    #[error("search under '{base_dn}' with filter '{filter}' failed: {detail}")]
    Search {
        base_dn: String,
        filter: String,
        detail: String,
    },

    /// A modify request was rejected.
    #[error("modify of '{dn}' failed ({changes}): {detail}")]
    Modify {
        dn: String,
        changes: String,
        detail: String,
    },

    /// An add request was rejected.
    #[error("add of '{dn}' failed ({attributes}): {detail}")]
    Add {
        dn: String,
        attributes: String,
        detail: String,
    },
}

impl DirectoryError {
    /// The DN the failed write targeted, if this was a write.
    pub fn dn(&self) -> Option<&str> {
        match self {
            Self::Modify { dn, .. } | Self::Add { dn, .. } => Some(dn),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

/// Errors converting attribute values between directory encodings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The source password digest is not valid hex.
    #[error("password digest is not valid hex: {0}")]
    InvalidHex(String),

    /// The target password value is not valid base64 after the scheme tag.
    #[error("password hash is not valid base64: {0}")]
    InvalidBase64(String),

    /// The target password value does not start with the expected scheme.
    #[error("password hash does not start with scheme '{0}'")]
    MissingScheme(String),

    /// A timestamp attribute is not a decimal integer.
    #[error("invalid timestamp value '{0}'")]
    InvalidTimestamp(String),
}

// ---------------------------------------------------------------------------
// Identifier allocation errors
// ---------------------------------------------------------------------------

/// Errors from the numeric identifier allocator.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Scanning the target directory failed.
    #[error("identifier scan failed: {0}")]
    Search(#[from] DirectoryError),

    /// No existing identifiers to increment from and no configured start.
    #[error("no existing identifiers under '{base_dn}' matching '{filter}' and no first_identifier configured")]
    NoPrecedent { base_dn: String, filter: String },

    /// The largest identifier in use is already the maximum value.
    #[error("identifier space exhausted")]
    Exhausted,
}

// ---------------------------------------------------------------------------
// Per-account errors
// ---------------------------------------------------------------------------

/// A failure confined to a single account during a reconciliation pass.
#[derive(Debug, Error)]
pub enum AccountError {
    /// A source attribute required for this operation is absent.
    #[error("account '{username}' is missing required attribute '{attribute}'")]
    MissingAttribute { username: String, attribute: String },

    /// A source attribute could not be translated to the target encoding.
    #[error("account '{username}': {source}")]
    Codec {
        username: String,
        #[source]
        source: CodecError,
    },

    /// No identifier could be allocated for a new account.
    #[error("account '{username}': {source}")]
    Allocation {
        username: String,
        #[source]
        source: AllocationError,
    },

    /// The directory rejected the write.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Pass-level errors
// ---------------------------------------------------------------------------

/// Errors that abort a whole reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Neither directory returned any accounts.
    #[error("nothing to reconcile: no accounts from source '{source_base_dn}' or target '{target_base_dn}'")]
    NothingToReconcile {
        source_base_dn: String,
        target_base_dn: String,
    },

    /// The target listing failed while the source had accounts. Without it
    /// existing accounts cannot be told apart from new ones.
    #[error("cannot list target accounts under '{base_dn}', no accounts were created or updated")]
    TargetUnavailable {
        base_dn: String,
        #[source]
        source: DirectoryError,
    },
}

impl SyncError {
    /// Neither directory had anything to offer.
    pub fn is_nothing_to_reconcile(&self) -> bool {
        matches!(self, Self::NothingToReconcile { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = DirectoryError::Search {
            base_dn: "ou=people,dc=example,dc=com".into(),
            filter: "(uid=*)".into(),
            detail: "busy".into(),
        };
        assert_eq!(
            err.to_string(),
            "search under 'ou=people,dc=example,dc=com' with filter '(uid=*)' failed: busy"
        );

        let err = AccountError::MissingAttribute {
            username: "alice".into(),
            attribute: "mail".into(),
        };
        assert!(err.to_string().contains("'mail'"));

        let err = ConfigError::EnvVarMissing {
            var: "LDAPSYNC_TARGET_PASSWORD".into(),
            field: "target.bind_password_env".into(),
        };
        assert!(err.to_string().contains("LDAPSYNC_TARGET_PASSWORD"));
    }

    #[test]
    fn test_write_errors_carry_dn() {
        let err = DirectoryError::Modify {
            dn: "uid=dave,ou=people".into(),
            changes: "replace userPassword".into(),
            detail: "insufficient access".into(),
        };
        assert_eq!(err.dn(), Some("uid=dave,ou=people"));

        let err = DirectoryError::Connection {
            url: "ldap://x".into(),
            detail: "refused".into(),
        };
        assert_eq!(err.dn(), None);
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let err: CoreError = CodecError::InvalidHex("zz".into()).into();
        assert!(matches!(err, CoreError::Codec(_)));

        let err: CoreError = AllocationError::Exhausted.into();
        assert!(matches!(err, CoreError::Allocation(_)));
    }

    #[test]
    fn test_target_unavailable_keeps_cause() {
        use std::error::Error as _;

        let err = SyncError::TargetUnavailable {
            base_dn: "ou=people,dc=example,dc=com".into(),
            source: DirectoryError::Search {
                base_dn: "ou=people,dc=example,dc=com".into(),
                filter: "(objectClass=posixAccount)".into(),
                detail: "size limit exceeded".into(),
            },
        };
        assert!(!err.is_nothing_to_reconcile());
        assert!(err.source().unwrap().to_string().contains("size limit exceeded"));
    }
}
