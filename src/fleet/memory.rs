//! In-memory fleet.
//!
//! Serves a fixed target/property snapshot, records every call in order, and
//! applies property writes to its own snapshot so a reload observes them.
//! Writes can be made to fail for chosen targets.

use std::cell::RefCell;
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use super::{CollaboratorError, FleetApi};
use crate::model::{ResourceKind, Target, TargetProperty};

/// One call observed by a [`MemoryFleet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    List(ResourceKind),
    Set { separator: String, record: String },
}

#[derive(Debug, Default)]
pub struct MemoryFleet {
    targets: RefCell<Vec<Target>>,
    properties: RefCell<Vec<TargetProperty>>,
    calls: RefCell<Vec<RecordedCall>>,
    failing_targets: HashSet<String>,
    fail_listing: bool,
}

/// On-disk fixture layout accepted by [`MemoryFleet::from_fixture`].
#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    targets: Vec<Target>,
    #[serde(default)]
    properties: Vec<TargetProperty>,
}

impl MemoryFleet {
    pub fn new(targets: Vec<Target>, properties: Vec<TargetProperty>) -> Self {
        Self {
            targets: RefCell::new(targets),
            properties: RefCell::new(properties),
            ..Default::default()
        }
    }

    /// Load a JSON fixture of the form `{"targets": [...], "properties": [...]}`
    /// using the collaborator's column names.
    pub fn from_fixture(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&content)
            .with_context(|| format!("parsing fixture {}", path.display()))?;
        Ok(Self::new(fixture.targets, fixture.properties))
    }

    /// Make every write addressed to the named target fail.
    pub fn fail_writes_for(mut self, target_name: impl Into<String>) -> Self {
        self.failing_targets.insert(target_name.into());
        self
    }

    /// Make every listing fail, as an expired session would.
    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    /// Records submitted through `set_target_property_value`, in order.
    pub fn set_records(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Set { record, .. } => Some(record.clone()),
                RecordedCall::List(_) => None,
            })
            .collect()
    }

    pub fn list_count(&self, kind: ResourceKind) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| **call == RecordedCall::List(kind))
            .count()
    }

    pub fn properties(&self) -> Vec<TargetProperty> {
        self.properties.borrow().clone()
    }

    fn apply_record(&self, separator: &str, record: &str) -> Result<(), CollaboratorError> {
        let fields: Vec<&str> = record.split(separator).collect();
        let [name, target_type, property, value] = fields.as_slice() else {
            return Err(CollaboratorError::Rejected(format!(
                "malformed property record: expected 4 fields, got {}",
                fields.len()
            )));
        };

        if self.failing_targets.contains(*name) {
            return Err(CollaboratorError::Rejected(format!(
                "target {name}:{target_type} rejected property {property}"
            )));
        }

        let guid = self
            .targets
            .borrow()
            .iter()
            .find(|t| t.name == *name && t.target_type == *target_type)
            .map(|t| t.guid.clone())
            .ok_or_else(|| {
                CollaboratorError::Rejected(format!("target {name}:{target_type} does not exist"))
            })?;

        let mut properties = self.properties.borrow_mut();
        match properties
            .iter_mut()
            .find(|p| p.target_guid == guid && p.name == *property)
        {
            Some(existing) => existing.value = (*value).to_string(),
            None => properties.push(TargetProperty::new(guid, *property, *value)),
        }
        Ok(())
    }
}

impl FleetApi for MemoryFleet {
    fn list_resource(
        &self,
        kind: ResourceKind,
    ) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        self.calls.borrow_mut().push(RecordedCall::List(kind));
        if self.fail_listing {
            return Err(CollaboratorError::Rejected(
                "session expired, please log in again".to_string(),
            ));
        }
        let encoded = match kind {
            ResourceKind::Targets => serde_json::to_value(&*self.targets.borrow()),
            ResourceKind::TargetProperties => serde_json::to_value(&*self.properties.borrow()),
        };
        match encoded.map_err(|source| CollaboratorError::Decode { kind, source })? {
            serde_json::Value::Array(items) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    fn set_target_property_value(
        &self,
        separator: &str,
        record: &str,
    ) -> Result<(), CollaboratorError> {
        self.calls.borrow_mut().push(RecordedCall::Set {
            separator: separator.to_string(),
            record: record.to_string(),
        });
        self.apply_record(separator, record)
    }
}
