//! Release management
//!
//! A [`ReleaseManager`] installs, removes and lists charts on a cluster. The
//! [`ReleaseDriver`] sits on top and turns Compose projects into releases.

pub mod driver;
pub mod helm;
pub mod memory;
pub mod settings;

pub use driver::{release_name, Context, ReleaseDriver};
pub use helm::HelmCli;
pub use memory::MemoryReleaseManager;
pub use settings::HelmSettings;

use crate::chart::Chart;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Release manager abstraction
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    /// Manager name for logs (e.g. "helm", "memory")
    fn name(&self) -> &str;

    /// Install the chart as release `name`, upgrading it if it already exists
    async fn install(&self, name: &str, chart: &Chart) -> Result<()>;

    /// Remove release `name`. Unknown releases give `ReleaseNotFound`.
    async fn uninstall(&self, name: &str) -> Result<()>;

    /// Every release the manager knows about
    async fn list_releases(&self) -> Result<Vec<Release>>;
}

/// A release as reported by the release manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Release name
    pub name: String,
    /// Namespace
    pub namespace: String,
    /// Raw status (`deployed`, `failed`, `pending-install`, ...)
    pub status: String,
    /// Revision number
    pub revision: u32,
    /// Last update
    pub updated: Option<DateTime<Utc>>,
    /// `<chart>-<version>`
    pub chart: String,
}

/// Condensed release status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackStatus {
    Running,
    Updating,
    Failed,
    Removing,
    Unknown,
}

impl StackStatus {
    /// Map a raw release status
    pub fn from_release_status(status: &str) -> Self {
        match status {
            "deployed" => StackStatus::Running,
            s if s.starts_with("pending") => StackStatus::Updating,
            "failed" => StackStatus::Failed,
            "uninstalling" => StackStatus::Removing,
            _ => StackStatus::Unknown,
        }
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackStatus::Running => write!(f, "running"),
            StackStatus::Updating => write!(f, "updating"),
            StackStatus::Failed => write!(f, "failed"),
            StackStatus::Removing => write!(f, "removing"),
            StackStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// One deployed project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSummary {
    /// Release name, which is the project name
    pub name: String,
    /// Condensed status
    pub status: StackStatus,
    /// Why the status is not `running`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StackSummary {
    /// Summarize a release
    pub fn from_release(release: &Release) -> Self {
        let status = StackStatus::from_release_status(&release.status);
        let reason = match status {
            StackStatus::Running => None,
            _ => Some(format!(
                "release {} is {} (revision {})",
                release.name, release.status, release.revision
            )),
        };
        Self {
            name: release.name.clone(),
            status,
            reason,
        }
    }

    /// Keep only the summaries for `project`, matched by release name
    pub fn filter_by_project(summaries: Vec<StackSummary>, project: &str) -> Vec<StackSummary> {
        let release = driver::release_name(project);
        summaries.into_iter().filter(|s| s.name == release).collect()
    }
}
