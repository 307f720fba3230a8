//! In-memory chart and its on-disk form
//!
//! A saved chart looks like:
//!
//! ```text
//! <name>/
//!   Chart.yaml
//!   values.yaml
//!   README.md
//!   templates/
//!     <kind>-<name>.yaml
//! ```

use crate::error::{ChartError, Result};
use crate::kube::Manifest;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Chart API version written to `Chart.yaml`
pub const CHART_API_VERSION: &str = "v2";
/// Chart version used when the caller does not pick one
pub const DEFAULT_CHART_VERSION: &str = "0.1.0";
/// Metadata file name
pub const CHART_FILE: &str = "Chart.yaml";
/// Values file name
pub const VALUES_FILE: &str = "values.yaml";
/// Template directory name
pub const TEMPLATES_DIR: &str = "templates";

/// Chart metadata (`Chart.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub api_version: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl ChartMetadata {
    /// Metadata for a chart generated from a Compose project
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            api_version: CHART_API_VERSION.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: Some(format!(
                "A generated Helm chart for {} from a Compose file",
                name
            )),
            keywords: vec![name.to_string()],
        }
    }
}

/// One manifest and the path it is stored under
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Path relative to the chart root
    pub path: String,
    pub manifest: Manifest,
}

impl Template {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            path: format!("{}/{}.yaml", TEMPLATES_DIR, manifest.file_stem()),
            manifest,
        }
    }

    /// Manifest as literal YAML
    pub fn render(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.manifest)?)
    }
}

/// Non-template file shipped with the chart
#[derive(Debug, Clone, PartialEq)]
pub struct ChartFile {
    pub path: String,
    pub data: String,
}

/// A deployable bundle
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub metadata: ChartMetadata,
    /// Ordered by kind, then name
    pub templates: Vec<Template>,
    /// Override keys; empty for generated charts
    pub values: BTreeMap<String, serde_yaml::Value>,
    pub files: Vec<ChartFile>,
}

impl Chart {
    /// Wrap manifests into a chart
    pub fn new(metadata: ChartMetadata, mut manifests: Vec<Manifest>) -> Self {
        manifests.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self {
            metadata,
            templates: manifests.into_iter().map(Template::new).collect(),
            values: BTreeMap::new(),
            files: Vec::new(),
        }
    }

    /// Chart name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Manifests in chart order
    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.templates.iter().map(|t| &t.manifest)
    }

    /// All manifests as one multi-document YAML stream
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        for template in &self.templates {
            out.push_str("---\n");
            out.push_str(&format!("# Source: {}\n", template.path));
            out.push_str(&template.render()?);
        }
        Ok(out)
    }

    fn values_yaml(&self) -> Result<String> {
        if self.values.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_yaml::to_string(&self.values)?)
    }

    /// Every file of the chart, paths relative to the chart root
    fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut entries = vec![
            (CHART_FILE.to_string(), serde_yaml::to_string(&self.metadata)?),
            (VALUES_FILE.to_string(), self.values_yaml()?),
        ];
        for file in &self.files {
            entries.push((file.path.clone(), file.data.clone()));
        }
        for template in &self.templates {
            entries.push((template.path.clone(), template.render()?));
        }
        Ok(entries)
    }

    /// Write the chart to `<parent>/<name>`, returning that directory.
    ///
    /// Templates left over from an earlier save are removed.
    pub fn save_dir(&self, parent: &Path) -> Result<PathBuf> {
        let dir = parent.join(self.name());
        let templates = dir.join(TEMPLATES_DIR);
        if templates.exists() {
            std::fs::remove_dir_all(&templates)?;
        }
        std::fs::create_dir_all(&templates)?;

        for (path, data) in self.entries()? {
            let target = dir.join(&path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, data)?;
        }

        tracing::debug!(
            "Saved chart {} with {} templates to {}",
            self.name(),
            self.templates.len(),
            dir.display()
        );
        Ok(dir)
    }

    /// Read a chart directory written by [`Chart::save_dir`]
    pub fn load_dir(dir: &Path) -> Result<Chart> {
        let metadata: ChartMetadata =
            serde_yaml::from_str(&std::fs::read_to_string(dir.join(CHART_FILE))?)?;

        let values_path = dir.join(VALUES_FILE);
        let values = if values_path.exists() {
            let content = std::fs::read_to_string(&values_path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        let mut files = Vec::new();
        let mut top_level: Vec<_> = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != CHART_FILE && name != VALUES_FILE)
            .collect();
        top_level.sort();
        for name in top_level {
            let data = std::fs::read_to_string(dir.join(&name))?;
            files.push(ChartFile { path: name, data });
        }

        let mut templates = Vec::new();
        let templates_dir = dir.join(TEMPLATES_DIR);
        if templates_dir.exists() {
            for entry in walkdir::WalkDir::new(&templates_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| ChartError::Serialization(e.into()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let is_yaml = entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml");
                if !is_yaml {
                    continue;
                }
                let content = std::fs::read_to_string(entry.path())?;
                let manifest: Manifest = serde_yaml::from_str(&content).map_err(|e| {
                    ChartError::Validation(format!(
                        "Template {} is not a supported manifest: {}",
                        entry.path().display(),
                        e
                    ))
                })?;
                let relative = entry
                    .path()
                    .strip_prefix(dir)
                    .unwrap_or(entry.path())
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                templates.push(Template {
                    path: relative,
                    manifest,
                });
            }
        }
        templates.sort_by(|a, b| a.manifest.sort_key().cmp(&b.manifest.sort_key()));

        Ok(Chart {
            metadata,
            templates,
            values,
            files,
        })
    }

    /// Write `<dest>/<name>-<version>.tgz`. Entries are prefixed with the
    /// chart name and carry a zero mtime, so equal charts give equal archives.
    pub fn package(&self, dest: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dest)?;
        let archive = dest.join(format!("{}-{}.tgz", self.name(), self.metadata.version));

        let encoder = GzEncoder::new(File::create(&archive)?, Compression::default());
        let mut tar = tar::Builder::new(encoder);

        for (path, data) in self.entries()? {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            tar.append_data(
                &mut header,
                format!("{}/{}", self.name(), path),
                data.as_bytes(),
            )?;
        }

        tar.into_inner()?.finish()?;
        tracing::debug!("Packaged chart {} into {}", self.name(), archive.display());
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::objects::{ConfigMap, ObjectMeta};
    use tempfile::tempdir;

    fn config_map(name: &str) -> Manifest {
        Manifest::ConfigMap(ConfigMap {
            api_version: "v1".to_string(),
            metadata: ObjectMeta::new(name, BTreeMap::new()),
            data: BTreeMap::from([("key".to_string(), "value".to_string())]),
        })
    }

    fn sample() -> Chart {
        let mut chart = Chart::new(
            ChartMetadata::new("web", DEFAULT_CHART_VERSION),
            vec![config_map("b"), config_map("a")],
        );
        chart.files.push(ChartFile {
            path: "README.md".to_string(),
            data: "generated\n".to_string(),
        });
        chart
    }

    #[test]
    fn test_templates_sorted_with_paths() {
        let chart = sample();
        let paths: Vec<_> = chart.templates.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, vec!["templates/configmap-a.yaml", "templates/configmap-b.yaml"]);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let chart = sample();

        let saved = chart.save_dir(dir.path()).unwrap();
        assert_eq!(saved, dir.path().join("web"));
        assert!(saved.join("Chart.yaml").exists());
        assert_eq!(std::fs::read_to_string(saved.join("values.yaml")).unwrap(), "");

        let loaded = Chart::load_dir(&saved).unwrap();
        assert_eq!(loaded, chart);
    }

    #[test]
    fn test_resave_drops_stale_templates() {
        let dir = tempdir().unwrap();
        sample().save_dir(dir.path()).unwrap();

        let smaller = Chart::new(
            ChartMetadata::new("web", DEFAULT_CHART_VERSION),
            vec![config_map("a")],
        );
        let saved = smaller.save_dir(dir.path()).unwrap();
        assert!(!saved.join("templates/configmap-b.yaml").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_templates_fail_load() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let saved = sample().save_dir(dir.path()).unwrap();
        let templates = saved.join(TEMPLATES_DIR);
        std::fs::set_permissions(&templates, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not bind a privileged user
        if std::fs::read_dir(&templates).is_err() {
            let err = Chart::load_dir(&saved).unwrap_err();
            assert!(matches!(err, ChartError::Serialization(_)));
        }

        std::fs::set_permissions(&templates, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_package_writes_prefixed_archive() {
        let dir = tempdir().unwrap();
        let archive = sample().package(dir.path()).unwrap();
        assert_eq!(archive.file_name().unwrap(), "web-0.1.0.tgz");

        let file = File::open(&archive).unwrap();
        let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let mut names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "web/Chart.yaml",
                "web/README.md",
                "web/templates/configmap-a.yaml",
                "web/templates/configmap-b.yaml",
                "web/values.yaml",
            ]
        );
    }
}
