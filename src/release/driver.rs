//! Compose project lifecycle on top of a release manager

use super::settings::HelmSettings;
use super::{ReleaseManager, StackSummary};
use crate::chart::ChartAssembler;
use crate::compose::normalize::object_name;
use crate::compose::Project;
use crate::error::{ChartError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation handle passed to driver calls
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this context and every clone of it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Installs, removes and lists Compose projects as releases
pub struct ReleaseDriver<M: ReleaseManager> {
    manager: M,
    assembler: ChartAssembler,
    settings: HelmSettings,
}

impl<M: ReleaseManager> ReleaseDriver<M> {
    /// Create a driver, capturing the process environment once
    pub fn new(manager: M) -> Self {
        Self::with_settings(manager, HelmSettings::from_env())
    }

    /// Create a driver with explicit settings
    pub fn with_settings(manager: M, settings: HelmSettings) -> Self {
        Self {
            manager,
            assembler: ChartAssembler::new(),
            settings,
        }
    }

    /// Use a custom assembler (e.g. another chart version)
    pub fn with_assembler(mut self, assembler: ChartAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Settings captured at construction
    pub fn settings(&self) -> &HelmSettings {
        &self.settings
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Prepare the driver for use. Nothing needs connecting today; a
    /// cancelled context is still refused.
    pub async fn connect(&self, ctx: &Context) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(ChartError::Cancelled);
        }
        tracing::debug!(
            "Using {} release manager in namespace {}",
            self.manager.name(),
            self.settings.namespace
        );
        Ok(())
    }

    /// A fresh snapshot of the release manager environment
    pub fn default_environment(&self) -> HelmSettings {
        HelmSettings::from_env()
    }

    /// Assemble the project and install it as a release named after it.
    ///
    /// Mapping errors are returned unchanged and the release manager is not
    /// contacted.
    pub async fn install(&self, project: &mut Project) -> Result<()> {
        let chart = self.assembler.assemble(project)?;
        let release = release_name(&project.name);
        tracing::info!(
            "Installing {} ({} objects) into namespace {}",
            release,
            chart.templates.len(),
            self.settings.namespace
        );
        self.manager
            .install(&release, &chart)
            .await
            .map_err(|e| e.for_project(&project.name))
    }

    /// Remove the release for `project_name`. The name is normalized the
    /// same way [`ReleaseDriver::install`] names the release.
    pub async fn uninstall(&self, project_name: &str) -> Result<()> {
        let release = release_name(project_name);
        tracing::info!("Uninstalling {}", release);
        self.manager.uninstall(&release).await.map_err(|e| {
            if matches!(e, ChartError::ReleaseNotFound(_)) {
                e
            } else {
                e.for_project(project_name)
            }
        })
    }

    /// Every release the manager knows about. `project_name` is advisory and
    /// not used to filter; see [`StackSummary::filter_by_project`].
    pub async fn list(&self, project_name: &str) -> Result<Vec<StackSummary>> {
        let releases = self
            .manager
            .list_releases()
            .await
            .map_err(|e| e.for_project(project_name))?;
        Ok(releases.iter().map(StackSummary::from_release).collect())
    }
}

/// Release name used for a project
pub fn release_name(project_name: &str) -> String {
    object_name(project_name)
}
