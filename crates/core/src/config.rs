//! TOML-based configuration system for ldapsync.
//!
//! Bind passwords are never stored in the file. Each directory section names
//! an environment variable in `bind_password_env`, and the actual secret is
//! resolved at runtime via [`AppConfig::resolve_env_vars`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::directory::AttributeMap;
use crate::errors::ConfigError;

/// Placeholder substituted with the account's username in DN templates.
pub const USERNAME_PLACEHOLDER: &str = "{username}";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Authoritative (Active Directory style) directory.
    pub source: SourceConfig,

    /// Directory that receives accounts (OpenLDAP style).
    pub target: TargetConfig,

    /// Reconciliation behaviour.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Directory connection
// ---------------------------------------------------------------------------

/// How to reach and authenticate against one directory server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Server URL (`ldap://`, `ldaps://` or `ldapi://`).
    pub url: String,

    /// Bind DN. The session binds anonymously when absent.
    #[serde(default)]
    pub bind_dn: Option<String>,

    /// Environment variable holding the bind password.
    #[serde(default)]
    pub bind_password_env: Option<String>,

    /// Seconds to wait for the TCP/TLS connection (default 10).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Resolved bind password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub bind_password: Option<String>,
}

fn default_connect_timeout() -> u64 {
    10
}

impl DirectoryConfig {
    /// Bind credentials, when both halves are available.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.bind_dn, &self.bind_password) {
            (Some(dn), Some(pw)) => Some((dn.as_str(), pw.as_str())),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Source directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(flatten)]
    pub directory: DirectoryConfig,

    /// Search base for user accounts.
    pub base_dn: String,

    /// Filter selecting the accounts to sync.
    #[serde(default = "default_source_filter")]
    pub account_filter: String,
}

fn default_source_filter() -> String {
    "(&(objectClass=user)(sAMAccountName=*))".into()
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Target directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(flatten)]
    pub directory: DirectoryConfig,

    /// Search base for existing accounts.
    pub base_dn: String,

    /// Filter selecting existing accounts.
    #[serde(default = "default_target_filter")]
    pub account_filter: String,

    /// DN for new entries; `{username}` is replaced with the escaped username.
    pub account_dn_template: String,

    /// Search base for the identifier scan (defaults to `base_dn`).
    #[serde(default)]
    pub identifier_base_dn: Option<String>,

    /// Filter for the identifier scan.
    #[serde(default = "default_identifier_filter")]
    pub identifier_filter: String,

    /// Identifier handed out when the target holds no accounts yet.
    #[serde(default)]
    pub first_identifier: Option<u32>,
}

fn default_target_filter() -> String {
    "(objectClass=posixAccount)".into()
}
fn default_identifier_filter() -> String {
    "(&(objectClass=posixAccount)(uidNumber=*))".into()
}

impl TargetConfig {
    /// Base DN for the identifier scan.
    pub fn identifier_base_dn(&self) -> &str {
        self.identifier_base_dn.as_deref().unwrap_or(&self.base_dn)
    }

    /// Build the DN of a new account from the template.
    pub fn account_dn(&self, username: &str) -> String {
        self.account_dn_template
            .replace(USERNAME_PLACEHOLDER, &ldap3::dn_escape(username))
    }
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

/// Reconciliation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Source attribute carrying the hex SHA-1 password digest.
    #[serde(default = "default_hash_attribute")]
    pub password_hash_attribute: String,

    /// Usernames that are never touched.
    #[serde(default)]
    pub excluded_usernames: BTreeSet<String>,

    /// Initial attribute set for every new account.
    #[serde(default)]
    pub new_account_template: AttributeMap,
}

fn default_hash_attribute() -> String {
    "division".into()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            password_hash_attribute: default_hash_attribute(),
            excluded_usernames: BTreeSet::new(),
            new_account_template: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily rolling log file, in addition to stderr.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the bind password of each directory from its
    /// `bind_password_env` variable.
    ///
    /// A variable that is referenced but unset is an error: binding with a
    /// DN and no password would silently fall back to an anonymous bind.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        self.source.directory.bind_password = resolve_required_env(
            self.source.directory.bind_password_env.as_deref(),
            "source.bind_password_env",
        )?;
        self.target.directory.bind_password = resolve_required_env(
            self.target.directory.bind_password_env.as_deref(),
            "target.bind_password_env",
        )?;

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_directory(&self.source.directory, "source")?;
        validate_directory(&self.target.directory, "target")?;

        for (field, value) in [
            ("source.base_dn", &self.source.base_dn),
            ("source.account_filter", &self.source.account_filter),
            ("target.base_dn", &self.target.base_dn),
            ("target.account_filter", &self.target.account_filter),
            ("target.identifier_filter", &self.target.identifier_filter),
            ("sync.password_hash_attribute", &self.sync.password_hash_attribute),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }

        if !self.target.account_dn_template.contains(USERNAME_PLACEHOLDER) {
            return Err(invalid(
                "target.account_dn_template",
                "must contain the {username} placeholder",
            ));
        }

        if self.target.first_identifier == Some(0) {
            return Err(invalid("target.first_identifier", "must be > 0"));
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_directory(dir: &DirectoryConfig, section: &str) -> Result<(), ConfigError> {
    let url_ok = ["ldap://", "ldaps://", "ldapi://"]
        .iter()
        .any(|scheme| dir.url.starts_with(scheme));
    if !url_ok {
        return Err(invalid(
            &format!("{section}.url"),
            "must start with ldap://, ldaps:// or ldapi://",
        ));
    }
    if dir.bind_dn.is_some() && dir.bind_password_env.is_none() {
        return Err(invalid(
            &format!("{section}.bind_password_env"),
            "required when bind_dn is set",
        ));
    }
    if dir.connect_timeout_secs == 0 {
        return Err(invalid(
            &format!("{section}.connect_timeout_secs"),
            "must be > 0",
        ));
    }
    Ok(())
}

fn invalid(field: &str, detail: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        detail: detail.into(),
    }
}

/// Read an environment variable if one is named. A named variable that is
/// unset or empty is an error.
fn resolve_required_env(env_name: Option<&str>, field: &str) -> Result<Option<String>, ConfigError> {
    let Some(env_name) = env_name else {
        return Ok(None);
    };
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Ok(Some(val))
        }
        _ => {
            warn!(field, env_name, "env var not set");
            Err(ConfigError::EnvVarMissing {
                var: env_name.into(),
                field: field.into(),
            })
        }
    }
}

/// A commented sample configuration, written by `ldapsync init`.
pub fn sample_config() -> &'static str {
    r#"# ldapsync configuration

[source]
url = "ldap://ad.example.com"
bind_dn = "CN=ldapsync,OU=Service Accounts,DC=example,DC=com"
bind_password_env = "LDAPSYNC_SOURCE_PASSWORD"
base_dn = "OU=Staff,DC=example,DC=com"
account_filter = "(&(objectClass=user)(sAMAccountName=*))"

[target]
url = "ldap://openldap.example.com"
bind_dn = "cn=admin,dc=example,dc=com"
bind_password_env = "LDAPSYNC_TARGET_PASSWORD"
base_dn = "ou=people,dc=example,dc=com"
account_filter = "(objectClass=posixAccount)"
account_dn_template = "uid={username},ou=people,dc=example,dc=com"
identifier_base_dn = "dc=example,dc=com"
identifier_filter = "(&(objectClass=posixAccount)(uidNumber=*))"
# first_identifier = 10000

[sync]
password_hash_attribute = "division"
excluded_usernames = ["Administrator", "Guest", "krbtgt"]

[sync.new_account_template]
objectClass = ["top", "person", "organizationalPerson", "inetOrgPerson", "posixAccount", "sambaSamAccount"]
gidNumber = ["100"]
loginShell = ["/bin/bash"]
sambaSID = ["S-1-5-21-0-0-0-513"]

[logging]
level = "info"
# directory = "/var/log/ldapsync"
"#
}
