//! Old/new attribute pairs and the minimal modification list between them.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::entry::AttributeMap;

/// One attribute-level change sent to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Modification {
    /// Attribute was absent and gains these values.
    Add { attr: String, values: Vec<String> },
    /// Attribute is removed entirely.
    Delete { attr: String },
    /// Attribute values are swapped for these.
    Replace { attr: String, values: Vec<String> },
}

impl Modification {
    pub fn attr(&self) -> &str {
        match self {
            Self::Add { attr, .. } | Self::Delete { attr } | Self::Replace { attr, .. } => attr,
        }
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { attr, values } => write!(f, "add {attr} ({} values)", values.len()),
            Self::Delete { attr } => write!(f, "delete {attr}"),
            Self::Replace { attr, values } => {
                write!(f, "replace {attr} ({} values)", values.len())
            }
        }
    }
}

/// Current and desired values for a set of attributes on one entry.
///
/// The directory client turns this into the smallest list of
/// [`Modification`]s; callers only state what they have and what they want.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    old: AttributeMap,
    new: AttributeMap,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current and desired values of `attr`. An empty `new`
    /// removes the attribute.
    pub fn set(&mut self, attr: impl Into<String>, old: Vec<String>, new: Vec<String>) -> &mut Self {
        let attr = attr.into();
        if !old.is_empty() {
            self.old.insert(attr.clone(), old);
        }
        self.new.insert(attr, new);
        self
    }

    pub fn old(&self) -> &AttributeMap {
        &self.old
    }

    pub fn new_values(&self) -> &AttributeMap {
        &self.new
    }

    /// Attribute-level diff between old and new values.
    ///
    /// Values are compared as sets and attribute names case-insensitively.
    /// Attributes only present in the old map are deleted.
    pub fn modifications(&self) -> Vec<Modification> {
        let mut mods = Vec::new();

        for (attr, new_values) in &self.new {
            let old_values = lookup(&self.old, attr);
            match (old_values, new_values.is_empty()) {
                (None, true) => {}
                (None, false) => mods.push(Modification::Add {
                    attr: attr.clone(),
                    values: new_values.clone(),
                }),
                (Some(_), true) => mods.push(Modification::Delete { attr: attr.clone() }),
                (Some(old_values), false) => {
                    if as_set(old_values) != as_set(new_values) {
                        mods.push(Modification::Replace {
                            attr: attr.clone(),
                            values: new_values.clone(),
                        });
                    }
                }
            }
        }

        for attr in self.old.keys() {
            if lookup(&self.new, attr).is_none() {
                mods.push(Modification::Delete { attr: attr.clone() });
            }
        }

        mods
    }

    pub fn is_noop(&self) -> bool {
        self.modifications().is_empty()
    }

    /// One-line description of the modifications, for diagnostics.
    pub fn describe(&self) -> String {
        describe(&self.modifications())
    }
}

/// Join modifications for a log line or error message.
pub fn describe(mods: &[Modification]) -> String {
    if mods.is_empty() {
        return "no changes".into();
    }
    mods.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn lookup<'a>(map: &'a AttributeMap, attr: &str) -> Option<&'a Vec<String>> {
    map.get(attr).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(attr))
            .map(|(_, values)| values)
    })
}

fn as_set(values: &[String]) -> BTreeSet<&str> {
    values.iter().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_changed_attribute_is_replaced() {
        let mut cs = Changeset::new();
        cs.set("userPassword", s(&["{SHA}old"]), s(&["{SHA}new"]));
        cs.set("sambaPwdLastSet", s(&["1000"]), s(&["1003"]));

        let mods = cs.modifications();
        assert_eq!(mods.len(), 2);
        assert!(mods.iter().all(|m| matches!(m, Modification::Replace { .. })));
    }

    #[test]
    fn test_unchanged_attribute_is_omitted() {
        let mut cs = Changeset::new();
        cs.set("userPassword", s(&["{SHA}same"]), s(&["{SHA}same"]));
        cs.set("sambaPwdLastSet", s(&["1000"]), s(&["1003"]));

        let mods = cs.modifications();
        assert_eq!(
            mods,
            vec![Modification::Replace {
                attr: "sambaPwdLastSet".into(),
                values: s(&["1003"]),
            }]
        );
    }

    #[test]
    fn test_value_order_does_not_matter() {
        let mut cs = Changeset::new();
        cs.set("mail", s(&["a@x", "b@x"]), s(&["b@x", "a@x"]));
        assert!(cs.is_noop());
        assert_eq!(cs.describe(), "no changes");
    }

    #[test]
    fn test_missing_old_value_is_added() {
        let mut cs = Changeset::new();
        cs.set("userPassword", Vec::new(), s(&["{SHA}new"]));
        assert_eq!(
            cs.modifications(),
            vec![Modification::Add {
                attr: "userPassword".into(),
                values: s(&["{SHA}new"]),
            }]
        );
    }

    #[test]
    fn test_empty_new_value_deletes() {
        let mut cs = Changeset::new();
        cs.set("homePhone", s(&["555"]), Vec::new());
        assert_eq!(
            cs.modifications(),
            vec![Modification::Delete {
                attr: "homePhone".into()
            }]
        );
        assert_eq!(cs.describe(), "delete homePhone");
    }
}
