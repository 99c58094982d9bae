//! Property records, batch policy, and the apply report.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApplierError;
use crate::model::Target;

/// Field separator declared to the collaborator alongside each record.
pub const DEFAULT_SEPARATOR: &str = "@#&@#&&";

/// What to do when one record of a batch is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyPolicy {
    /// Stop at the first rejected record and return its error.
    #[default]
    FailFast,
    /// Keep going and collect rejections in the report.
    BestEffort,
}

impl fmt::Display for ApplyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => f.write_str("fail-fast"),
            Self::BestEffort => f.write_str("best-effort"),
        }
    }
}

impl FromStr for ApplyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(Self::FailFast),
            "best-effort" => Ok(Self::BestEffort),
            other => Err(format!(
                "unknown apply policy '{other}': expected fail-fast or best-effort"
            )),
        }
    }
}

/// One (target, property) assignment, kept structured until it is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyRecord {
    pub target_name: String,
    pub target_type: String,
    pub property: String,
    pub value: String,
}

impl PropertyRecord {
    pub fn new(target: &Target, property: &str, value: &str) -> Self {
        Self {
            target_name: target.name.clone(),
            target_type: target.target_type.clone(),
            property: property.to_string(),
            value: value.to_string(),
        }
    }

    fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("target name", self.target_name.as_str()),
            ("target type", self.target_type.as_str()),
            ("property name", self.property.as_str()),
            ("property value", self.value.as_str()),
        ]
    }

    /// Reject records whose fields contain the separator; they would not split back
    /// into the same four fields.
    pub fn check_separator(&self, separator: &str) -> Result<(), ApplierError> {
        match self.fields().into_iter().find(|(_, v)| v.contains(separator)) {
            Some((field, value)) => Err(ApplierError::SeparatorCollision {
                field,
                value: value.to_string(),
                separator: separator.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// `name SEP type SEP property SEP value`
    pub fn encode(&self, separator: &str) -> String {
        [
            self.target_name.as_str(),
            self.target_type.as_str(),
            self.property.as_str(),
            self.value.as_str(),
        ]
        .join(separator)
    }

    /// Operator audit block written before the record is submitted.
    pub fn write_progress<W: Write + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "Target: {} ({})", self.target_name, self.target_type)?;
        writeln!(out, "\tProperty: {}", self.property)?;
        writeln!(out, "\tValue: {}", self.value)?;
        writeln!(out)
    }
}

/// A record the collaborator rejected under [`ApplyPolicy::BestEffort`].
#[derive(Debug, Clone, Serialize)]
pub struct ApplyFailure {
    #[serde(flatten)]
    pub record: PropertyRecord,
    pub error: String,
}

/// Outcome of one `set_properties` batch.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub policy: ApplyPolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub targets: usize,
    pub properties: usize,
    pub attempted: usize,
    pub succeeded: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    pub fn begin(policy: ApplyPolicy, targets: usize, properties: usize) -> Self {
        Self {
            policy,
            started_at: Utc::now(),
            finished_at: None,
            targets,
            properties,
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, record: PropertyRecord, error: impl ToString) {
        self.attempted += 1;
        self.failures.push(ApplyFailure {
            record,
            error: error.to_string(),
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Records the batch was expected to submit.
    pub fn expected(&self) -> usize {
        self.targets * self.properties
    }

    /// Every expected record was submitted and accepted.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.succeeded == self.expected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PropertyRecord {
        let target = Target::new("G1", "db1", "oracle_database", Some("https://agent1/em"));
        PropertyRecord::new(&target, "env", "prod")
    }

    #[test]
    fn encodes_four_fields_in_order() {
        assert_eq!(
            record().encode(DEFAULT_SEPARATOR),
            "db1@#&@#&&oracle_database@#&@#&&env@#&@#&&prod"
        );
    }

    #[test]
    fn separator_inside_a_field_is_rejected() {
        let mut rec = record();
        rec.value = "a@#&@#&&b".to_string();
        let err = rec.check_separator(DEFAULT_SEPARATOR).unwrap_err();
        assert!(matches!(
            err,
            ApplierError::SeparatorCollision {
                field: "property value",
                ..
            }
        ));
        assert!(record().check_separator(DEFAULT_SEPARATOR).is_ok());
    }

    #[test]
    fn progress_block_lists_target_and_assignment() {
        let mut out = Vec::new();
        record().write_progress(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Target: db1 (oracle_database)\n\tProperty: env\n\tValue: prod\n\n"
        );
    }

    #[test]
    fn policy_parses_both_spellings() {
        assert_eq!("fail-fast".parse::<ApplyPolicy>().unwrap(), ApplyPolicy::FailFast);
        assert_eq!("BEST_EFFORT".parse::<ApplyPolicy>().unwrap(), ApplyPolicy::BestEffort);
        assert!("retry".parse::<ApplyPolicy>().is_err());
        assert_eq!(ApplyPolicy::BestEffort.to_string(), "best-effort");
    }

    #[test]
    fn report_completeness() {
        let mut report = ApplyReport::begin(ApplyPolicy::BestEffort, 2, 1);
        report.record_success();
        assert!(!report.is_complete());
        report.record_failure(record(), "rejected");
        report.finish();
        assert_eq!(report.attempted, 2);
        assert!(!report.is_complete());
        assert!(report.finished_at.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["policy"], "best-effort");
        assert_eq!(json["failures"][0]["target_name"], "db1");
        assert_eq!(json["failures"][0]["error"], "rejected");
    }
}
