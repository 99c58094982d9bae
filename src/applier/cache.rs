//! Lazily loaded snapshot of the fleet's targets and target properties.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::fleet::{CollaboratorError, FleetApi};
use crate::model::{ResourceKind, Target, TargetProperty};

/// Target and property snapshot with a dirty flag.
///
/// `load` and `invalidate` are the only mutators. A new cache starts dirty, so
/// the first read fetches.
#[derive(Debug)]
pub struct TargetCache {
    dirty: bool,
    targets: Vec<Target>,
    properties: Vec<TargetProperty>,
}

impl Default for TargetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetCache {
    pub fn new() -> Self {
        Self {
            dirty: true,
            targets: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Fetch both listings if the cache is dirty; otherwise do nothing.
    ///
    /// The snapshot is replaced only when both listings succeed. On failure the
    /// cache stays dirty and the error is returned as reported.
    pub fn load<A: FleetApi + ?Sized>(&mut self, api: &A) -> Result<(), CollaboratorError> {
        if !self.dirty {
            return Ok(());
        }
        let targets: Vec<Target> = fetch(api, ResourceKind::Targets)?;
        let properties: Vec<TargetProperty> = fetch(api, ResourceKind::TargetProperties)?;
        debug!(
            targets = targets.len(),
            properties = properties.len(),
            "target cache loaded"
        );
        self.targets = targets;
        self.properties = properties;
        self.dirty = false;
        Ok(())
    }

    /// Mark the snapshot stale. Nothing is fetched until the next `load`.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn is_stale(&self) -> bool {
        self.dirty
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn properties(&self) -> &[TargetProperty] {
        &self.properties
    }

    /// Properties of one target, in listing order.
    pub fn properties_for<'a>(
        &'a self,
        guid: &'a str,
    ) -> impl Iterator<Item = &'a TargetProperty> + 'a {
        self.properties.iter().filter(move |p| p.target_guid == guid)
    }
}

fn fetch<A, T>(api: &A, kind: ResourceKind) -> Result<Vec<T>, CollaboratorError>
where
    A: FleetApi + ?Sized,
    T: DeserializeOwned,
{
    let rows = api.list_resource(kind)?;
    serde_json::from_value(serde_json::Value::Array(rows))
        .map_err(|source| CollaboratorError::Decode { kind, source })
}
