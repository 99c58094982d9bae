//! Fleet collaborator layer.
//!
//! Everything the property pipeline needs from Enterprise Manager goes through
//! the [`FleetApi`] trait: two resource listings and one property write.
//!
//! - **[`emcli`]**: drives the `emcli` command-line client as a subprocess.
//! - **[`memory`]**: in-memory fleet for fixtures and tests; records writes.
//! - **[`dry_run`]**: wraps another fleet, reads through, logs writes instead
//!   of sending them.

pub mod dry_run;
pub mod emcli;
pub mod memory;

use thiserror::Error;

use crate::model::ResourceKind;

pub use dry_run::DryRunFleet;
pub use emcli::{EmcliClient, EmcliSettings};
pub use memory::{MemoryFleet, RecordedCall};

/// Failures reported by the fleet collaborator. Passed to callers unchanged.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("emcli {verb} failed ({status}): {message}")]
    CommandFailed {
        verb: String,
        status: String,
        message: String,
    },

    #[error("emcli {verb} returned unexpected output: {message}")]
    InvalidOutput { verb: String, message: String },

    #[error("failed to decode {kind} records: {source}")]
    Decode {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("emcli login failed: {0}")]
    Login(String),

    #[error("{0}")]
    Rejected(String),
}

/// The three operations the pipeline consumes from the management server.
pub trait FleetApi {
    /// List every record of a resource kind as raw JSON objects.
    fn list_resource(&self, kind: ResourceKind)
    -> Result<Vec<serde_json::Value>, CollaboratorError>;

    /// Apply one delimited property record (`name SEP type SEP property SEP value`).
    fn set_target_property_value(
        &self,
        separator: &str,
        record: &str,
    ) -> Result<(), CollaboratorError>;
}

impl<T: FleetApi + ?Sized> FleetApi for &T {
    fn list_resource(
        &self,
        kind: ResourceKind,
    ) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        (**self).list_resource(kind)
    }

    fn set_target_property_value(
        &self,
        separator: &str,
        record: &str,
    ) -> Result<(), CollaboratorError> {
        (**self).set_target_property_value(separator, record)
    }
}

impl<T: FleetApi + ?Sized> FleetApi for Box<T> {
    fn list_resource(
        &self,
        kind: ResourceKind,
    ) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        (**self).list_resource(kind)
    }

    fn set_target_property_value(
        &self,
        separator: &str,
        record: &str,
    ) -> Result<(), CollaboratorError> {
        (**self).set_target_property_value(separator, record)
    }
}
