//! Normalized fleet entity structs.

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A monitored target as reported by the `Targets` resource listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    #[serde(rename = "TARGET_GUID")]
    pub guid: String,
    #[serde(rename = "TARGET_NAME")]
    pub name: String,
    #[serde(rename = "TARGET_TYPE")]
    pub target_type: String,
    /// URL of the managing agent. Agent-less and root targets have none.
    #[serde(rename = "EMD_URL", default)]
    pub agent_url: Option<String>,
}

impl Target {
    pub fn new(
        guid: impl Into<String>,
        name: impl Into<String>,
        target_type: impl Into<String>,
        agent_url: Option<&str>,
    ) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            target_type: target_type.into(),
            agent_url: agent_url.map(str::to_string),
        }
    }
}

/// A single property attached to a target, as reported by `TargetProperties`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetProperty {
    #[serde(rename = "TARGET_GUID")]
    pub target_guid: String,
    #[serde(rename = "PROPERTY_NAME")]
    pub name: String,
    #[serde(rename = "PROPERTY_VALUE", default, deserialize_with = "null_as_empty")]
    pub value: String,
}

impl TargetProperty {
    pub fn new(
        target_guid: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            target_guid: target_guid.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Resource kinds the fleet collaborator can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Targets,
    TargetProperties,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Targets => "Targets",
            Self::TargetProperties => "TargetProperties",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target field used as a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    #[serde(rename = "TARGET_GUID", alias = "guid")]
    Guid,
    #[serde(rename = "TARGET_NAME", alias = "name")]
    Name,
    #[serde(rename = "TARGET_TYPE", alias = "type")]
    Type,
    #[serde(rename = "EMD_URL", alias = "agent")]
    Agent,
}

impl SortKey {
    /// Compare two targets on this field. Targets without an agent sort first.
    pub fn compare(self, a: &Target, b: &Target) -> Ordering {
        match self {
            Self::Guid => a.guid.cmp(&b.guid),
            Self::Name => a.name.cmp(&b.name),
            Self::Type => a.target_type.cmp(&b.target_type),
            Self::Agent => a.agent_url.cmp(&b.agent_url),
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Guid => "TARGET_GUID",
            Self::Name => "TARGET_NAME",
            Self::Type => "TARGET_TYPE",
            Self::Agent => "EMD_URL",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TARGET_GUID" | "GUID" => Ok(Self::Guid),
            "TARGET_NAME" | "NAME" => Ok(Self::Name),
            "TARGET_TYPE" | "TYPE" => Ok(Self::Type),
            "EMD_URL" | "AGENT" => Ok(Self::Agent),
            other => Err(format!(
                "unknown sort key '{other}': expected one of TARGET_GUID, TARGET_NAME, TARGET_TYPE, EMD_URL"
            )),
        }
    }
}

/// Regex patterns and sort order that select the working set.
///
/// Patterns are searched anywhere in the field, so `db` matches both
/// `db1` and `proddb`. Anchor with `^`/`$` for exact matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub agent: String,
    pub target_type: String,
    pub name: String,
    pub sort: Vec<SortKey>,
}

pub const MATCH_ANY: &str = ".*";

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            agent: MATCH_ANY.to_string(),
            target_type: MATCH_ANY.to_string(),
            name: MATCH_ANY.to_string(),
            sort: vec![SortKey::Type, SortKey::Name],
        }
    }
}

impl FilterSpec {
    pub fn agent(mut self, pattern: impl Into<String>) -> Self {
        self.agent = pattern.into();
        self
    }

    pub fn target_type(mut self, pattern: impl Into<String>) -> Self {
        self.target_type = pattern.into();
        self
    }

    pub fn name(mut self, pattern: impl Into<String>) -> Self {
        self.name = pattern.into();
        self
    }

    pub fn sort(mut self, keys: impl IntoIterator<Item = SortKey>) -> Self {
        self.sort = keys.into_iter().collect();
        self
    }
}

/// Property name to value assignments written to every target of the working set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMapping(BTreeMap<String, String>);

impl PropertyMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an assignment, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// Merge `other` into `self`; entries of `other` win.
    pub fn extend(&mut self, other: PropertyMapping) {
        self.0.extend(other.0);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a `NAME=VALUE` assignment. The value may itself contain `=`.
    pub fn parse_assignment(input: &str) -> Result<(String, String), String> {
        let (name, value) = input
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got '{input}'"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("property name is empty in '{input}'"));
        }
        Ok((name.to_string(), value.to_string()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_deserializes_with_missing_or_null_agent() {
        let with_null: Target = serde_json::from_value(json!({
            "TARGET_GUID": "G1",
            "TARGET_NAME": "oms",
            "TARGET_TYPE": "oracle_emrep",
            "EMD_URL": null,
            "IS_BROKEN": "0"
        }))
        .unwrap();
        assert_eq!(with_null.agent_url, None);

        let missing: Target = serde_json::from_value(json!({
            "TARGET_GUID": "G2",
            "TARGET_NAME": "grp",
            "TARGET_TYPE": "composite"
        }))
        .unwrap();
        assert_eq!(missing.agent_url, None);
    }

    #[test]
    fn property_null_value_reads_as_empty() {
        let prop: TargetProperty = serde_json::from_value(json!({
            "TARGET_GUID": "G1",
            "PROPERTY_NAME": "orcl_gtp_comment",
            "PROPERTY_VALUE": null
        }))
        .unwrap();
        assert_eq!(prop.value, "");
    }

    #[test]
    fn sort_key_parses_columns_and_aliases() {
        assert_eq!("TARGET_TYPE".parse::<SortKey>().unwrap(), SortKey::Type);
        assert_eq!("name".parse::<SortKey>().unwrap(), SortKey::Name);
        assert_eq!(" emd_url ".parse::<SortKey>().unwrap(), SortKey::Agent);
        assert!("TARGET_STATUS".parse::<SortKey>().is_err());
    }

    #[test]
    fn agent_sort_puts_agentless_first() {
        let a = Target::new("G1", "a", "t", Some("https://agent/em"));
        let b = Target::new("G2", "b", "t", None);
        assert_eq!(SortKey::Agent.compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn parse_assignment_keeps_equals_in_value() {
        assert_eq!(
            PropertyMapping::parse_assignment("orcl_gtp_comment=a=b").unwrap(),
            ("orcl_gtp_comment".to_string(), "a=b".to_string())
        );
        assert!(PropertyMapping::parse_assignment("novalue").is_err());
        assert!(PropertyMapping::parse_assignment("=x").is_err());
    }

    #[test]
    fn mapping_extend_later_wins() {
        let mut base: PropertyMapping = [("env", "dev"), ("site", "dc1")].into_iter().collect();
        base.extend([("env", "prod")].into_iter().collect());
        assert_eq!(base.get("env"), Some("prod"));
        assert_eq!(base.get("site"), Some("dc1"));
        assert_eq!(base.len(), 2);
    }
}
