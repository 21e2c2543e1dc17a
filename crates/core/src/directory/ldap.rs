//! `ldap3`-backed directory client.
//!
//! Each operation opens its own session (connect, optional simple bind),
//! performs the request and unbinds. Sessions are released on every exit
//! path: explicitly via [`LdapSession::close`], and from `Drop` when an
//! early return or panic skips the explicit close.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry};
use tracing::{debug, info, instrument, warn};

use super::changeset::{describe as describe_modifications, Changeset, Modification};
use super::entry::{AttributeMap, DirectoryEntry};
use super::{describe_attributes, DirectoryClient};
use crate::config::DirectoryConfig;
use crate::errors::DirectoryError;

const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_ALREADY_EXISTS: u32 = 68;

/// Directory client for a single LDAP server.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    url: String,
    bind: Option<(String, String)>,
    connect_timeout: Duration,
}

impl LdapDirectory {
    /// Create a client from a directory section of the configuration.
    ///
    /// This does not connect; every operation opens its own session.
    pub fn new(config: &DirectoryConfig) -> Self {
        let client = Self {
            url: config.url.clone(),
            bind: config
                .credentials()
                .map(|(dn, pw)| (dn.to_string(), pw.to_string())),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        };
        info!(
            url = %client.url,
            anonymous = client.bind.is_none(),
            "created LdapDirectory"
        );
        client
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect and bind. Anonymous when no credentials are configured.
    async fn open(&self) -> Result<LdapSession, DirectoryError> {
        debug!(url = %self.url, "connecting to LDAP server");

        let settings = LdapConnSettings::new().set_conn_timeout(self.connect_timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(|e| self.connection_error(e))?;

        let url = self.url.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(url = %url, error = %e, "LDAP connection driver error");
            }
        });

        let mut session = LdapSession::new(ldap, self.url.clone());

        if let Some((bind_dn, password)) = &self.bind {
            debug!(bind_dn = %bind_dn, "performing LDAP simple bind");
            let result = session
                .ldap
                .simple_bind(bind_dn, password)
                .await
                .map_err(|e| self.connection_error(e))?;
            match result.rc {
                RC_SUCCESS => {}
                RC_INVALID_CREDENTIALS => {
                    return Err(DirectoryError::InvalidCredentials {
                        url: self.url.clone(),
                        bind_dn: bind_dn.clone(),
                    })
                }
                _ => {
                    return Err(DirectoryError::Connection {
                        url: self.url.clone(),
                        detail: format!("bind failed: {}", result_detail(&result)),
                    })
                }
            }
        }

        Ok(session)
    }

    fn connection_error(&self, e: LdapError) -> DirectoryError {
        DirectoryError::Connection {
            url: self.url.clone(),
            detail: e.to_string(),
        }
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    #[instrument(skip(self, attributes), fields(url = %self.url))]
    async fn search(
        &self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let mut session = self.open().await?;
        let result = session.ldap.search(base_dn, Scope::Subtree, filter, attributes).await;
        session.close().await;

        let ldap3::SearchResult(entries, status) =
            result.map_err(|e| self.connection_error(e))?;

        if status.rc != RC_SUCCESS {
            let detail = if status.rc == RC_NO_SUCH_OBJECT {
                "search base does not exist".to_string()
            } else {
                result_detail(&status)
            };
            return Err(DirectoryError::Search {
                base_dn: base_dn.into(),
                filter: filter.into(),
                detail,
            });
        }

        let entries: Vec<DirectoryEntry> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(DirectoryEntry::from)
            .collect();
        debug!(count = entries.len(), "search completed");
        Ok(entries)
    }

    #[instrument(skip(self, attributes), fields(url = %self.url))]
    async fn add_entry(&self, dn: &str, attributes: &AttributeMap) -> Result<(), DirectoryError> {
        let add_error = |detail: String| DirectoryError::Add {
            dn: dn.into(),
            attributes: describe_attributes(attributes),
            detail,
        };

        let attrs: Vec<(&str, HashSet<&str>)> = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.as_str(), values.iter().map(String::as_str).collect()))
            .collect();

        let mut session = self.open().await?;
        let result = session.ldap.add(dn, attrs).await;
        session.close().await;

        let status = result.map_err(|e| add_error(e.to_string()))?;
        match status.rc {
            RC_SUCCESS => {
                info!(dn, "LDAP entry created");
                Ok(())
            }
            RC_ALREADY_EXISTS => Err(add_error("entry already exists".into())),
            _ => Err(add_error(result_detail(&status))),
        }
    }

    #[instrument(skip(self, changeset), fields(url = %self.url))]
    async fn modify_entry(&self, dn: &str, changeset: &Changeset) -> Result<(), DirectoryError> {
        let modifications = changeset.modifications();
        if modifications.is_empty() {
            debug!(dn, "no attribute changes, skipping modify");
            return Ok(());
        }

        let modify_error = |detail: String| DirectoryError::Modify {
            dn: dn.into(),
            changes: describe_modifications(&modifications),
            detail,
        };

        let mods: Vec<Mod<&str>> = modifications.iter().map(to_ldap_mod).collect();

        let mut session = self.open().await?;
        let result = session.ldap.modify(dn, mods).await;
        session.close().await;

        let status = result.map_err(|e| modify_error(e.to_string()))?;
        match status.rc {
            RC_SUCCESS => {
                info!(dn, changes = %describe_modifications(&modifications), "LDAP entry modified");
                Ok(())
            }
            RC_NO_SUCH_OBJECT => Err(modify_error("entry does not exist".into())),
            _ => Err(modify_error(result_detail(&status))),
        }
    }
}

fn to_ldap_mod(modification: &Modification) -> Mod<&str> {
    match modification {
        Modification::Add { attr, values } => Mod::Add(
            attr.as_str(),
            values.iter().map(String::as_str).collect(),
        ),
        Modification::Delete { attr } => Mod::Delete(attr.as_str(), HashSet::new()),
        Modification::Replace { attr, values } => Mod::Replace(
            attr.as_str(),
            values.iter().map(String::as_str).collect(),
        ),
    }
}

fn result_detail(result: &LdapResult) -> String {
    if result.text.is_empty() {
        format!("result code {}", result.rc)
    } else {
        format!("result code {}: {}", result.rc, result.text)
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attrs: entry.attrs.into_iter().collect(),
            bin_attrs: entry.bin_attrs.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoped session
// ---------------------------------------------------------------------------

/// A connected (and possibly bound) LDAP handle that is always unbound.
struct LdapSession {
    ldap: Ldap,
    url: String,
    closed: bool,
}

impl LdapSession {
    fn new(ldap: Ldap, url: String) -> Self {
        Self {
            ldap,
            url,
            closed: false,
        }
    }

    /// Unbind and release the connection.
    async fn close(mut self) {
        self.closed = true;
        if let Err(e) = self.ldap.unbind().await {
            warn!(url = %self.url, error = %e, "error during LDAP unbind");
        }
    }
}

impl Drop for LdapSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let mut ldap = self.ldap.clone();
        let url = std::mem::take(&mut self.url);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = ldap.unbind().await {
                        debug!(url = %url, error = %e, "deferred LDAP unbind failed");
                    }
                });
            }
            Err(_) => warn!(url = %url, "no runtime available to unbind LDAP session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_entry_conversion() {
        let entry = SearchEntry {
            dn: "uid=alice,ou=people,dc=example,dc=com".into(),
            attrs: [("uid".to_string(), vec!["alice".to_string()])]
                .into_iter()
                .collect(),
            bin_attrs: [("jpegPhoto".to_string(), vec![vec![0xff, 0xd8]])]
                .into_iter()
                .collect(),
        };
        let entry = DirectoryEntry::from(entry);
        assert_eq!(entry.first("uid"), Some("alice"));
        assert_eq!(entry.bin_attrs["jpegPhoto"], vec![vec![0xff, 0xd8]]);
    }

    #[test]
    fn test_modifications_map_to_ldap_mods() {
        let add = Modification::Add {
            attr: "mail".into(),
            values: vec!["a@x".into()],
        };
        assert!(matches!(to_ldap_mod(&add), Mod::Add("mail", ref v) if v.contains("a@x")));

        let delete = Modification::Delete {
            attr: "homePhone".into(),
        };
        assert!(matches!(to_ldap_mod(&delete), Mod::Delete("homePhone", ref v) if v.is_empty()));
    }

    #[test]
    fn test_anonymous_when_no_password() {
        let config = DirectoryConfig {
            url: "ldap://localhost".into(),
            bind_dn: Some("cn=admin".into()),
            bind_password_env: None,
            connect_timeout_secs: 5,
            bind_password: None,
        };
        let client = LdapDirectory::new(&config);
        assert!(client.bind.is_none());
        assert_eq!(client.url(), "ldap://localhost");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let config = DirectoryConfig {
            url: "ldap://127.0.0.1:1".into(),
            bind_dn: None,
            bind_password_env: None,
            connect_timeout_secs: 2,
            bind_password: None,
        };
        let client = LdapDirectory::new(&config);
        let result = client.search("dc=example,dc=com", "(uid=*)", &["uid"]).await;
        assert!(matches!(result, Err(DirectoryError::Connection { .. })));
    }
}
