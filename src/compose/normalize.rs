//! Object name normalization
//!
//! Compose accepts names the Kubernetes object model rejects. Names are
//! rewritten once, at the boundary, and everything downstream assumes they
//! conform.

use super::config::Project;
use crate::error::{ChartError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Longest name accepted for a DNS-1123 label
pub const MAX_NAME_LEN: usize = 63;

fn dns_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex is valid")
    })
}

/// Rewrite every volume key, replacing `_` with `-`.
///
/// Keys are visited in ascending order. When a rewritten key lands on one
/// that already exists, the moved volume replaces it.
pub fn normalize_volume_names(project: &mut Project) {
    let keys: Vec<String> = project.volumes.keys().cloned().collect();
    for key in keys {
        let normalized = volume_name(&key);
        if normalized == key {
            continue;
        }
        if let Some(volume) = project.volumes.remove(&key) {
            if project.volumes.insert(normalized.clone(), volume).is_some() {
                tracing::debug!("Volume '{}' replaced existing '{}'", key, normalized);
            }
        }
    }
}

/// Normalized form of a volume name or volume mount source
pub fn volume_name(name: &str) -> String {
    name.replace('_', "-")
}

/// Normalized form of a service, config, secret or project name
pub fn object_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            '_' | '.' | ' ' => '-',
            other => other,
        })
        .collect()
}

/// Check a name against the DNS-1123 label grammar
pub fn validate_object_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ChartError::naming(kind, name, "name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ChartError::naming(
            kind,
            name,
            format!("must be at most {} characters", MAX_NAME_LEN),
        ));
    }
    if !dns_label().is_match(name) {
        return Err(ChartError::naming(
            kind,
            name,
            "must consist of lower case alphanumeric characters or '-', \
             and start and end with an alphanumeric character",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::config::VolumeConfig;

    fn volume(driver: &str) -> VolumeConfig {
        VolumeConfig {
            driver: Some(driver.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_underscores_become_hyphens() {
        let mut project = Project::new("web").with_volume("data_store", VolumeConfig::default());
        normalize_volume_names(&mut project);

        assert!(project.volumes.contains_key("data-store"));
        assert!(!project.volumes.contains_key("data_store"));
    }

    #[test]
    fn test_collision_last_write_wins() {
        let mut project = Project::new("web")
            .with_volume("a-b", volume("first"))
            .with_volume("a_b", volume("second"));
        normalize_volume_names(&mut project);

        assert_eq!(project.volumes.len(), 1);
        assert_eq!(
            project.volumes["a-b"].driver.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let mut once = Project::new("web")
            .with_volume("x_y_z", volume("a"))
            .with_volume("x-y_z", volume("b"))
            .with_volume("plain", volume("c"));
        normalize_volume_names(&mut once);

        let mut twice = once.clone();
        normalize_volume_names(&mut twice);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_object_name() {
        assert_eq!(object_name("My_App.v2"), "my-app-v2");
        assert_eq!(object_name("api"), "api");
    }

    #[test]
    fn test_validate_object_name() {
        assert!(validate_object_name("service", "api-1").is_ok());
        assert!(validate_object_name("service", "-api").is_err());
        assert!(validate_object_name("service", "api_1").is_err());
        assert!(validate_object_name("service", "").is_err());
        assert!(validate_object_name("service", &"a".repeat(64)).is_err());
    }
}
