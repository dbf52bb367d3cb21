//! Resource tag maps.

use std::collections::BTreeMap;

pub type Tags = BTreeMap<String, String>;

/// Tags for a resource called `name`: a `Name` tag overlaid with `extra`.
///
/// Entries from `extra` win, so callers can still override `Name`.
pub fn named_tags(name: &str, extra: &Tags) -> Tags {
    let mut tags = Tags::new();
    tags.insert("Name".to_string(), name.to_string());
    tags.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    tags
}

/// Single-entry `Environment` tag map.
pub fn environment_tags(environment: &str) -> Tags {
    Tags::from([("Environment".to_string(), environment.to_string())])
}
