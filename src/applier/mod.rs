//! Filter-then-apply pipeline over the fleet's targets.
//!
//! [`TargetPropertyApplier`] owns one [`cache::TargetCache`], the current
//! working set, and the property mapping to write:
//!
//! ```rust,ignore
//! use emprops::applier::TargetPropertyApplier;
//! use emprops::model::{FilterSpec, PropertyMapping};
//!
//! let mut applier = TargetPropertyApplier::new(fleet, std::io::stdout());
//! applier.props([("orcl_gtp_location", "DC1")].into_iter().collect());
//! applier.filter(&FilterSpec::default().target_type("oracle_database"), false)?;
//! let report = applier.set_properties(true)?;
//! ```
//!
//! Writes are not atomic across the batch. Under [`ApplyPolicy::FailFast`] the
//! first rejected record stops the batch and earlier records stay applied;
//! under [`ApplyPolicy::BestEffort`] rejections are collected in the
//! [`ApplyReport`].

pub mod apply;
pub mod cache;
pub mod display;
pub mod filter;

use std::io::{self, Write};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fleet::{CollaboratorError, FleetApi};
use crate::model::{FilterSpec, PropertyMapping, Target};

pub use apply::{ApplyFailure, ApplyPolicy, ApplyReport, DEFAULT_SEPARATOR, PropertyRecord};
pub use cache::TargetCache;
pub use filter::CompiledFilter;

#[derive(Error, Debug)]
pub enum ApplierError {
    #[error("invalid {filter} filter pattern: {source}")]
    InvalidPattern {
        filter: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("{field} '{value}' contains the field separator '{separator}'")]
    SeparatorCollision {
        field: &'static str,
        value: String,
        separator: String,
    },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl ApplierError {
    /// Problems detected locally, before any collaborator call.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern { .. }
                | Self::MissingConfiguration(_)
                | Self::SeparatorCollision { .. }
        )
    }
}

pub struct TargetPropertyApplier<A, W = io::Stdout> {
    api: A,
    out: W,
    cache: TargetCache,
    properties: PropertyMapping,
    policy: ApplyPolicy,
    separator: String,
    working_set: Vec<Target>,
    sorted: Vec<Target>,
}

impl<A: FleetApi, W: Write> TargetPropertyApplier<A, W> {
    /// Build an applier with an empty working set. Nothing is fetched until the
    /// first filter or show.
    pub fn new(api: A, out: W) -> Self {
        Self {
            api,
            out,
            cache: TargetCache::new(),
            properties: PropertyMapping::new(),
            policy: ApplyPolicy::default(),
            separator: DEFAULT_SEPARATOR.to_string(),
            working_set: Vec::new(),
            sorted: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: ApplyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Replace the property mapping written by [`Self::set_properties`].
    pub fn props(&mut self, mapping: PropertyMapping) {
        self.properties = mapping;
    }

    /// Working set in listing order; this is the order records are applied in.
    pub fn working_set(&self) -> &[Target] {
        &self.working_set
    }

    /// Working set in the filter's sort order; this is the order it is shown in.
    pub fn sorted_working_set(&self) -> &[Target] {
        &self.sorted
    }

    pub fn cache(&self) -> &TargetCache {
        &self.cache
    }

    pub fn into_parts(self) -> (A, W) {
        (self.api, self.out)
    }

    /// Select the working set from the cached targets.
    ///
    /// Patterns are compiled before the cache is touched, so a bad pattern
    /// costs no collaborator call. Returns the sorted working set.
    pub fn filter(&mut self, spec: &FilterSpec, show: bool) -> Result<&[Target], ApplierError> {
        let compiled = CompiledFilter::compile(spec)?;
        self.cache.load(&self.api)?;

        self.working_set = compiled.select(self.cache.targets()).cloned().collect();
        self.sorted = self.working_set.clone();
        filter::sort_targets(&mut self.sorted, &spec.sort);
        debug!(
            agent = %spec.agent,
            target_type = %spec.target_type,
            name = %spec.name,
            selected = self.working_set.len(),
            total = self.cache.targets().len(),
            "filtered targets"
        );

        if show {
            self.show()?;
        }
        Ok(&self.sorted)
    }

    /// Print the sorted working set with each target's custom group properties.
    /// Reloads the cache first if it is stale.
    pub fn show(&mut self) -> Result<(), ApplierError> {
        self.cache.load(&self.api)?;
        display::write_header(&mut self.out)?;
        for target in &self.sorted {
            display::write_target(
                &mut self.out,
                target,
                self.cache.properties_for(&target.guid),
            )?;
        }
        self.out.flush()?;
        Ok(())
    }

    /// Write every mapping entry to every target of the working set.
    ///
    /// Targets are iterated outer, properties inner. Each record's progress
    /// block is written to the output before the record is submitted, one
    /// blocking call at a time. The cache is marked stale before the first call.
    pub fn set_properties(&mut self, show: bool) -> Result<ApplyReport, ApplierError> {
        let records = self.plan()?;
        self.cache.invalidate();

        let mut report = ApplyReport::begin(
            self.policy,
            self.working_set.len(),
            self.properties.len(),
        );
        for record in records {
            record.write_progress(&mut self.out)?;
            self.out.flush()?;
            info!(
                target_name = %record.target_name,
                target_type = %record.target_type,
                property = %record.property,
                value = %record.value,
                "setting target property"
            );
            let encoded = record.encode(&self.separator);
            match self.api.set_target_property_value(&self.separator, &encoded) {
                Ok(()) => report.record_success(),
                Err(err) => match self.policy {
                    ApplyPolicy::FailFast => return Err(err.into()),
                    ApplyPolicy::BestEffort => {
                        warn!(
                            target_name = %record.target_name,
                            property = %record.property,
                            error = %err,
                            "property write rejected, continuing"
                        );
                        report.record_failure(record, err);
                    }
                },
            }
        }
        report.finish();
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "property batch finished"
        );

        if show {
            self.show()?;
        }
        Ok(report)
    }

    /// Validate the mapping and build every record of the batch.
    fn plan(&self) -> Result<Vec<PropertyRecord>, ApplierError> {
        if self.properties.is_empty() {
            return Err(ApplierError::MissingConfiguration(
                "the property mapping must contain at least one property".to_string(),
            ));
        }
        if let Some((name, _)) = self.properties.iter().find(|(name, _)| name.is_empty()) {
            return Err(ApplierError::MissingConfiguration(format!(
                "property name '{name}' is empty"
            )));
        }
        if let Some((name, _)) = self.properties.iter().find(|(_, value)| value.is_empty()) {
            return Err(ApplierError::MissingConfiguration(format!(
                "property '{name}' has an empty value"
            )));
        }
        if self.separator.is_empty() {
            return Err(ApplierError::MissingConfiguration(
                "the record field separator is empty".to_string(),
            ));
        }

        let records: Vec<PropertyRecord> = self
            .working_set
            .iter()
            .flat_map(|target| {
                self.properties
                    .iter()
                    .map(move |(name, value)| PropertyRecord::new(target, name, value))
            })
            .collect();
        for record in &records {
            record.check_separator(&self.separator)?;
        }
        Ok(records)
    }
}
