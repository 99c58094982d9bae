pub mod types;

pub use types::{
    FilterSpec, MATCH_ANY, PropertyMapping, ResourceKind, SortKey, Target, TargetProperty,
};
