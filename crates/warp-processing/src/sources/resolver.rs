use super::IdentityResolver;
use crate::error::{Result, RvError};
use tracing::{debug, info, warn};

/// Name directory used by [`CandidateResolver`].
pub trait CatalogDirectory: Send + Sync {
    /// All known aliases of `display_name` ("HD 10700", "HIP 8102", ...).
    fn aliases(&self, display_name: &str) -> Result<Vec<String>>;

    /// Archive identifier registered under `catalog_name`, if any.
    fn catalog_id(&self, catalog_name: &str) -> Result<Option<String>>;
}

/// Ordered candidate names for an archive lookup.
///
/// The display name comes first, then the first HD and HIP aliases, then
/// every alias. Whitespace is removed and duplicates keep their first position.
pub fn candidate_names(display_name: &str, aliases: &[String]) -> Vec<String> {
    let hd = aliases.iter().find(|a| a.starts_with("HD"));
    let hip = aliases.iter().find(|a| a.starts_with("HIP"));
    if hd.is_none() {
        warn!("No HD name found for {}", display_name);
    }
    if hip.is_none() {
        warn!("No HIP name found for {}", display_name);
    }

    let ordered = std::iter::once(display_name)
        .chain(hd.map(String::as_str))
        .chain(hip.map(String::as_str))
        .chain(aliases.iter().map(String::as_str));

    let mut names: Vec<String> = Vec::new();
    for name in ordered {
        let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
        if !compact.is_empty() && !names.contains(&compact) {
            names.push(compact);
        }
    }
    names
}

/// Resolver trying candidate names one after another.
pub struct CandidateResolver<C: CatalogDirectory> {
    directory: C,
}

impl<C: CatalogDirectory> CandidateResolver<C> {
    pub fn new(directory: C) -> Self {
        Self { directory }
    }
}

impl<C: CatalogDirectory> IdentityResolver for CandidateResolver<C> {
    fn resolve(&self, display_name: &str) -> Result<String> {
        let aliases = self.directory.aliases(display_name).unwrap_or_else(|e| {
            warn!("Alias lookup failed for {}: {}", display_name, e);
            Vec::new()
        });

        for name in candidate_names(display_name, &aliases) {
            debug!("Trying to find archive id for {} as {}", display_name, name);
            match self.directory.catalog_id(&name) {
                Ok(Some(id)) => {
                    info!("Resolved {} to archive id {} (via {})", display_name, id, name);
                    return Ok(id);
                }
                Ok(None) => {}
                Err(e) => debug!("Lookup of {} failed: {}", name, e),
            }
        }

        Err(RvError::NotFound(format!(
            "no archive id for '{}' under any known name",
            display_name
        )))
    }
}
