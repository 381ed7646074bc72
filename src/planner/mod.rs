//! Query variant generation.
//!
//! For one reference the planner produces, in order:
//! 1. one "{artist} {title} {marker}" per clean marker, if the reference is explicit
//! 2. one "{artist} {title} {suffix}" per precision suffix
//! 3. the bare "{artist} {title}" fallback, always last
//!
//! Variants are never deduplicated; a marker that coincides with a suffix
//! just produces the same search twice.

use crate::config::QueryConfig;
use crate::model::TrackReference;

#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    precision_suffixes: Vec<String>,
    clean_markers: Vec<String>,
}

impl QueryPlanner {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            precision_suffixes: config.precision_suffixes.clone(),
            clean_markers: config.clean_markers.clone(),
        }
    }

    /// Ordered search queries for `reference`. Never empty.
    pub fn plan_queries(&self, reference: &TrackReference) -> Vec<String> {
        let base = format!("{} {}", reference.artist.trim(), reference.title.trim());
        let clean = if reference.explicit {
            self.clean_markers.as_slice()
        } else {
            &[]
        };

        let mut queries: Vec<String> = clean
            .iter()
            .chain(&self.precision_suffixes)
            .filter(|qualifier| !qualifier.trim().is_empty())
            .map(|qualifier| format!("{} {}", base, qualifier.trim()))
            .collect();
        queries.push(base);
        queries
    }
}
