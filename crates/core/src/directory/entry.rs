//! Directory entries as returned by a search.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute name to ordered values.
pub type AttributeMap = BTreeMap<String, Vec<String>>;

/// One directory entry: a DN plus its multi-valued attributes.
///
/// Textual and binary values are kept apart, matching what the LDAP client
/// hands back for each search result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,
    #[serde(default)]
    pub attrs: AttributeMap,
    #[serde(default)]
    pub bin_attrs: BTreeMap<String, Vec<Vec<u8>>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Default::default()
        }
    }

    /// Builder-style setter for a textual attribute.
    pub fn with_attr<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attrs
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// All values of a textual attribute. Attribute names are matched
    /// case-insensitively.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        if let Some(values) = self.attrs.get(name) {
            return Some(values);
        }
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// First value of a textual attribute, if it has any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether the entry carries at least one value for `name`.
    pub fn has(&self, name: &str) -> bool {
        self.first(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let entry = DirectoryEntry::new("CN=Alice,OU=Staff,DC=example,DC=com")
            .with_attr("sAMAccountName", ["alice"])
            .with_attr("mail", ["alice@example.com", "a@example.com"]);

        assert_eq!(entry.first("samaccountname"), Some("alice"));
        assert_eq!(entry.values("MAIL").map(|v| v.len()), Some(2));
        assert_eq!(entry.first("mail"), Some("alice@example.com"));
    }

    #[test]
    fn test_empty_attribute_counts_as_absent() {
        let entry = DirectoryEntry::new("uid=bob").with_attr("division", Vec::<String>::new());
        assert!(!entry.has("division"));
        assert!(!entry.has("missing"));
    }
}
