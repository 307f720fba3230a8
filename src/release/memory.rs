//! In-process release manager
//!
//! Keeps releases in a map. Used for dry runs and tests.

use super::{Release, ReleaseManager};
use crate::chart::Chart;
use crate::error::{ChartError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Release manager that never leaves the process
#[derive(Debug)]
pub struct MemoryReleaseManager {
    namespace: String,
    releases: RwLock<BTreeMap<String, Release>>,
    /// Installed charts, by release name
    charts: RwLock<BTreeMap<String, Chart>>,
    calls: AtomicUsize,
}

impl Default for MemoryReleaseManager {
    fn default() -> Self {
        Self::new("default")
    }
}

impl MemoryReleaseManager {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            releases: RwLock::new(BTreeMap::new()),
            charts: RwLock::new(BTreeMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls made through [`ReleaseManager`]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Chart last installed as `name`
    pub fn chart(&self, name: &str) -> Result<Option<Chart>> {
        let charts = self
            .charts
            .read()
            .map_err(|_| ChartError::Lock("Failed to acquire read lock".to_string()))?;
        Ok(charts.get(name).cloned())
    }

    /// Seed a release directly, e.g. one in a given status
    pub fn insert(&self, release: Release) -> Result<()> {
        let mut releases = self
            .releases
            .write()
            .map_err(|_| ChartError::Lock("Failed to acquire write lock".to_string()))?;
        releases.insert(release.name.clone(), release);
        Ok(())
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReleaseManager for MemoryReleaseManager {
    fn name(&self) -> &str {
        "memory"
    }

    async fn install(&self, name: &str, chart: &Chart) -> Result<()> {
        self.record_call();
        let mut releases = self
            .releases
            .write()
            .map_err(|_| ChartError::Lock("Failed to acquire write lock".to_string()))?;

        let revision = releases.get(name).map(|r| r.revision + 1).unwrap_or(1);
        releases.insert(
            name.to_string(),
            Release {
                name: name.to_string(),
                namespace: self.namespace.clone(),
                status: "deployed".to_string(),
                revision,
                updated: Some(Utc::now()),
                chart: format!("{}-{}", chart.name(), chart.metadata.version),
            },
        );
        drop(releases);

        let mut charts = self
            .charts
            .write()
            .map_err(|_| ChartError::Lock("Failed to acquire write lock".to_string()))?;
        charts.insert(name.to_string(), chart.clone());

        tracing::info!("Installed release {} (revision {})", name, revision);
        Ok(())
    }

    async fn uninstall(&self, name: &str) -> Result<()> {
        self.record_call();
        let mut releases = self
            .releases
            .write()
            .map_err(|_| ChartError::Lock("Failed to acquire write lock".to_string()))?;

        if releases.remove(name).is_none() {
            return Err(ChartError::ReleaseNotFound(name.to_string()));
        }
        drop(releases);

        let mut charts = self
            .charts
            .write()
            .map_err(|_| ChartError::Lock("Failed to acquire write lock".to_string()))?;
        charts.remove(name);

        tracing::info!("Uninstalled release {}", name);
        Ok(())
    }

    async fn list_releases(&self) -> Result<Vec<Release>> {
        self.record_call();
        let releases = self
            .releases
            .read()
            .map_err(|_| ChartError::Lock("Failed to acquire read lock".to_string()))?;
        Ok(releases.values().cloned().collect())
    }
}
