//! Agent/type/name regex filtering and composite sorting of targets.

use std::cmp::Ordering;

use regex::Regex;

use super::ApplierError;
use crate::model::{FilterSpec, SortKey, Target};

/// The three compiled predicates of a [`FilterSpec`].
///
/// Every pattern is searched anywhere in its field (`Regex::is_match`), never
/// matched against the whole string.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    agent: Regex,
    target_type: Regex,
    name: Regex,
}

impl CompiledFilter {
    pub fn compile(spec: &FilterSpec) -> Result<Self, ApplierError> {
        Ok(Self {
            agent: compile_pattern("agent", &spec.agent)?,
            target_type: compile_pattern("type", &spec.target_type)?,
            name: compile_pattern("name", &spec.name)?,
        })
    }

    /// A target without an agent passes the agent predicate unconditionally.
    pub fn matches(&self, target: &Target) -> bool {
        self.target_type.is_match(&target.target_type)
            && self.name.is_match(&target.name)
            && target
                .agent_url
                .as_deref()
                .is_none_or(|url| self.agent.is_match(url))
    }

    pub fn select<'a>(&'a self, targets: &'a [Target]) -> impl Iterator<Item = &'a Target> + 'a {
        targets.iter().filter(move |t| self.matches(t))
    }
}

fn compile_pattern(filter: &'static str, pattern: &str) -> Result<Regex, ApplierError> {
    Regex::new(pattern).map_err(|source| ApplierError::InvalidPattern { filter, source })
}

/// Compare by each key in turn; later keys only break ties of earlier ones.
pub fn compare_by_keys(keys: &[SortKey], a: &Target, b: &Target) -> Ordering {
    keys.iter()
        .fold(Ordering::Equal, |ord, key| ord.then_with(|| key.compare(a, b)))
}

/// Stable composite sort. An empty key list keeps the input order.
pub fn sort_targets(targets: &mut [Target], keys: &[SortKey]) {
    targets.sort_by(|a, b| compare_by_keys(keys, a, b));
}
