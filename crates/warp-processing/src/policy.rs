//! Accepted DRS versions per instrument.

use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Selects the data-reduction versions to keep for each instrument.
#[derive(Debug, Clone, Default)]
pub struct PipelineVersionPolicy {
    accepted: BTreeMap<String, String>,
}

impl PipelineVersionPolicy {
    /// Build a policy from an `instrument -> accepted version substring` table.
    pub fn new(accepted: BTreeMap<String, String>) -> Self {
        Self { accepted }
    }

    /// Accepted substring for `instrument`, if the policy knows it.
    pub fn accepted_substring(&self, instrument: &str) -> Option<&str> {
        self.accepted.get(instrument).map(String::as_str)
    }

    /// The subset of `observed` versions to keep for `instrument`.
    ///
    /// Fails open: an unknown instrument, or an accepted version that was never
    /// observed, keeps every observed version.
    pub fn get_latest_pipeline(&self, instrument: &str, observed: &[String]) -> Vec<String> {
        let Some(wanted) = self.accepted_substring(instrument) else {
            warn!(
                "No accepted pipeline version known for {}; keeping all {} versions",
                instrument,
                observed.len()
            );
            return observed.to_vec();
        };

        let kept: Vec<String> = observed
            .iter()
            .filter(|v| v.contains(wanted))
            .cloned()
            .collect();

        if kept.is_empty() {
            warn!(
                "Accepted pipeline {} not found for {} (observed {:?}); keeping all versions",
                wanted, instrument, observed
            );
            return observed.to_vec();
        }

        debug!("{}: keeping pipeline versions {:?}", instrument, kept);
        kept
    }
}
