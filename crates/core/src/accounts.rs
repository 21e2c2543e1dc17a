//! Logical account views over raw directory entries.
//!
//! Attribute names follow the two schemas involved: Active Directory on the
//! source side, RFC 2307 `posixAccount` plus Samba's `sambaSamAccount` on
//! the target side.

use tracing::warn;

use crate::codec::{convert_timestamp, parse_ticks};
use crate::directory::DirectoryEntry;
use crate::errors::{AccountError, CodecError};

/// Source attribute names.
pub mod source_attrs {
    pub const USERNAME: &str = "sAMAccountName";
    pub const PWD_LAST_SET: &str = "pwdLastSet";
    pub const COMMON_NAME: &str = "cn";
    pub const GIVEN_NAME: &str = "givenName";
    pub const SURNAME: &str = "sn";
    pub const PHONE: &str = "telephoneNumber";
    pub const MAIL: &str = "mail";

    /// Profile attributes copied verbatim onto a new target account.
    pub const PROFILE: [&str; 5] = [COMMON_NAME, GIVEN_NAME, SURNAME, PHONE, MAIL];
}

/// Target attribute names.
pub mod target_attrs {
    pub const USERNAME: &str = "uid";
    pub const UID_NUMBER: &str = "uidNumber";
    pub const PASSWORD: &str = "userPassword";
    pub const PWD_LAST_SET: &str = "sambaPwdLastSet";
    pub const HOME_DIRECTORY: &str = "homeDirectory";
    pub const HOME_PHONE: &str = "homePhone";
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Borrowed view of an account in the source directory.
///
/// Attributes are read on demand, so an account that is skipped early never
/// has its password material touched.
#[derive(Debug, Clone, Copy)]
pub struct SourceAccount<'e> {
    entry: &'e DirectoryEntry,
    username: &'e str,
}

impl<'e> SourceAccount<'e> {
    /// `None` when the entry carries no username.
    pub fn from_entry(entry: &'e DirectoryEntry) -> Option<Self> {
        let username = entry.first(source_attrs::USERNAME)?;
        Some(Self { entry, username })
    }

    pub fn username(&self) -> &'e str {
        self.username
    }

    pub fn dn(&self) -> &'e str {
        &self.entry.dn
    }

    /// Hex password digest held in `attribute`.
    pub fn password_hash(&self, attribute: &str) -> Option<&'e str> {
        self.entry.first(attribute)
    }

    /// Password change time converted to Unix seconds.
    pub fn password_changed_at(&self) -> Result<i64, AccountError> {
        let raw = self.required(source_attrs::PWD_LAST_SET)?;
        parse_ticks(raw)
            .and_then(convert_timestamp)
            .map_err(|source| self.codec_error(source))
    }

    /// All values of a required attribute.
    pub fn required_values(&self, attribute: &str) -> Result<&'e [String], AccountError> {
        match self.entry.values(attribute) {
            Some(values) if !values.is_empty() => Ok(values),
            _ => Err(AccountError::MissingAttribute {
                username: self.username.into(),
                attribute: attribute.into(),
            }),
        }
    }

    fn required(&self, attribute: &str) -> Result<&'e str, AccountError> {
        self.required_values(attribute)
            .map(|values| values[0].as_str())
    }

    pub(crate) fn codec_error(&self, source: CodecError) -> AccountError {
        AccountError::Codec {
            username: self.username.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Owned view of an account already present in the target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAccount {
    pub dn: String,
    pub username: String,
    /// Every stored `userPassword` value.
    pub password_hashes: Vec<String>,
    /// Raw `sambaPwdLastSet` values, as stored.
    pub raw_password_changed_at: Vec<String>,
    /// `sambaPwdLastSet` in Unix seconds, when present and numeric.
    pub password_changed_at: Option<i64>,
}

impl TargetAccount {
    /// `None` when the entry carries no username.
    pub fn from_entry(entry: &DirectoryEntry) -> Option<Self> {
        let username = entry.first(target_attrs::USERNAME)?.to_string();

        let raw_password_changed_at = entry
            .values(target_attrs::PWD_LAST_SET)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let password_changed_at = match raw_password_changed_at.first() {
            Some(raw) => match parse_ticks(raw) {
                Ok(seconds) => Some(seconds),
                Err(e) => {
                    warn!(dn = %entry.dn, error = %e, "ignoring unparseable target timestamp");
                    None
                }
            },
            None => None,
        };

        Some(Self {
            dn: entry.dn.clone(),
            username,
            password_hashes: entry
                .values(target_attrs::PASSWORD)
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            raw_password_changed_at,
            password_changed_at,
        })
    }
}
