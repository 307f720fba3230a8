//! Compose project to chart assembly

use super::bundle::{Chart, ChartFile, ChartMetadata, DEFAULT_CHART_VERSION};
use crate::compose::normalize::{normalize_volume_names, object_name};
use crate::compose::Project;
use crate::error::Result;
use crate::kube::map_project;
use std::path::{Path, PathBuf};

/// Builds charts out of Compose projects
#[derive(Debug, Clone)]
pub struct ChartAssembler {
    version: String,
}

impl Default for ChartAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartAssembler {
    pub fn new() -> Self {
        Self {
            version: DEFAULT_CHART_VERSION.to_string(),
        }
    }

    /// Use a chart version other than the default
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Chart version written to generated charts
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Normalize the project, map it and wrap the objects into a chart.
    ///
    /// Volume keys of `project` are rewritten in place.
    pub fn assemble(&self, project: &mut Project) -> Result<Chart> {
        normalize_volume_names(project);
        let manifests = map_project(project)?;

        let name = object_name(&project.name);
        let mut chart = Chart::new(ChartMetadata::new(&name, &self.version), manifests);
        chart.files.push(ChartFile {
            path: "README.md".to_string(),
            data: readme(&name, project),
        });

        tracing::debug!(
            "Assembled chart {} {} with {} templates",
            name,
            self.version,
            chart.templates.len()
        );
        Ok(chart)
    }

    /// Assemble the project and write it under the directory derived from
    /// `dest` (see [`derive_target_dir`]). Returns the chart directory.
    pub fn save_to_directory(&self, project: &mut Project, dest: &Path) -> Result<PathBuf> {
        self.write_chart(project, &derive_target_dir(dest))
    }

    /// Derive the output directory from a user supplied path and save there
    pub fn generate_chart(&self, project: &mut Project, path: &Path) -> Result<PathBuf> {
        let target = derive_target_dir(path);
        tracing::debug!("Generating chart into {}", target.display());
        self.write_chart(project, &target)
    }

    /// Save into `target` as given. Nothing is written if assembly fails.
    fn write_chart(&self, project: &mut Project, target: &Path) -> Result<PathBuf> {
        let chart = self.assemble(project)?;
        std::fs::create_dir_all(target)?;
        let dir = chart.save_dir(target)?;
        tracing::info!("Chart {} written to {}", chart.name(), dir.display());
        Ok(dir)
    }
}

/// Directory a chart is written into, given a path that may name a file.
///
/// Everything from the first `.` is dropped, then everything after the last
/// separator: `out/my.chart.tgz` and `out/charts` give `out`, while
/// `out/charts/` gives `out/charts`. A path with no separator gives `.`.
pub fn derive_target_dir(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    let stem = match text.split_once('.') {
        Some((prefix, _)) => prefix,
        None => &text,
    };
    let Some(last) = stem.rfind(std::path::is_separator) else {
        return PathBuf::from(".");
    };
    match stem[..=last].trim_end_matches(std::path::is_separator) {
        "" => PathBuf::from("/"),
        dir => PathBuf::from(dir),
    }
}

fn readme(name: &str, project: &Project) -> String {
    let mut out = format!(
        "# {}\n\nGenerated from the Compose project `{}`.\n\nServices:\n\n",
        name, project.name
    );
    for service in project.services.keys() {
        out.push_str(&format!("- {}\n", service));
    }
    out
}
