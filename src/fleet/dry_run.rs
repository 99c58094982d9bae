//! Read-through fleet wrapper that never writes.

use std::cell::Cell;

use tracing::info;

use super::{CollaboratorError, FleetApi};
use crate::model::ResourceKind;

/// Lists through the inner fleet; property writes are logged and counted only.
pub struct DryRunFleet<A> {
    inner: A,
    skipped: Cell<usize>,
}

impl<A: FleetApi> DryRunFleet<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            skipped: Cell::new(0),
        }
    }

    /// Number of writes that were suppressed.
    pub fn skipped_writes(&self) -> usize {
        self.skipped.get()
    }
}

impl<A: FleetApi> FleetApi for DryRunFleet<A> {
    fn list_resource(
        &self,
        kind: ResourceKind,
    ) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        self.inner.list_resource(kind)
    }

    fn set_target_property_value(
        &self,
        separator: &str,
        record: &str,
    ) -> Result<(), CollaboratorError> {
        self.skipped.set(self.skipped.get() + 1);
        info!(
            record = %record.replace(separator, " | "),
            "dry run: property write skipped"
        );
        Ok(())
    }
}
