//! helm CLI wrapper
//!
//! Drives the `helm` binary. Charts are saved to a scratch directory and
//! installed from there.

use super::settings::HelmSettings;
use super::{Release, ReleaseManager};
use crate::chart::Chart;
use crate::error::{ChartError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use uuid::Uuid;

/// Arguments of the list call. `--max 0` lifts helm's default page size.
const LIST_ARGS: &[&str] = &["list", "--all", "--max", "0", "--output", "json"];

/// Release manager backed by the helm CLI
#[derive(Debug, Clone)]
pub struct HelmCli {
    settings: HelmSettings,
    scratch_root: PathBuf,
}

/// One entry of `helm list --output json`
#[derive(Debug, Deserialize)]
struct HelmListEntry {
    name: String,
    namespace: String,
    revision: String,
    updated: String,
    status: String,
    chart: String,
}

impl HelmCli {
    pub fn new(settings: HelmSettings) -> Self {
        Self {
            settings,
            scratch_root: std::env::temp_dir(),
        }
    }

    /// Directory under which charts are staged before install
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Settings passed to every invocation
    pub fn settings(&self) -> &HelmSettings {
        &self.settings
    }

    /// Run a helm command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let global = self.settings.global_args();
        let mut cmd = Command::new(&self.settings.helm_bin);
        cmd.args(args);
        cmd.args(&global);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(
            "Running: {} {} --namespace {}",
            self.settings.helm_bin,
            args.join(" "),
            self.settings.namespace
        );

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ChartError::Transport(format!(
                    "helm binary '{}' not found",
                    self.settings.helm_bin
                ))
            } else {
                ChartError::Transport(format!(
                    "failed to run '{}': {}",
                    self.settings.helm_bin, e
                ))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(command_error(stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn scratch_dir(&self) -> PathBuf {
        self.scratch_root.join(format!("kompose-chart-{}", Uuid::new_v4()))
    }

    async fn install_from(&self, scratch: &Path, name: &str, chart: &Chart) -> Result<()> {
        let chart_dir = chart.save_dir(scratch)?;
        let chart_path = chart_dir.to_string_lossy().into_owned();
        self.run_command(&["upgrade", "--install", name, &chart_path]).await?;
        Ok(())
    }
}

#[async_trait]
impl ReleaseManager for HelmCli {
    fn name(&self) -> &str {
        "helm"
    }

    async fn install(&self, name: &str, chart: &Chart) -> Result<()> {
        let scratch = self.scratch_dir();
        let result = self.install_from(&scratch, name, chart).await;

        // Removed whether the save or the helm call failed
        if scratch.exists() {
            if let Err(e) = std::fs::remove_dir_all(&scratch) {
                tracing::warn!("Failed to remove {}: {}", scratch.display(), e);
            }
        }

        result?;
        tracing::info!("Installed release {}", name);
        Ok(())
    }

    async fn uninstall(&self, name: &str) -> Result<()> {
        match self.run_command(&["uninstall", name]).await {
            Ok(_) => {
                tracing::info!("Uninstalled release {}", name);
                Ok(())
            }
            Err(ChartError::Release(msg)) if is_release_missing(&msg) => {
                Err(ChartError::ReleaseNotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn list_releases(&self) -> Result<Vec<Release>> {
        let output = self.run_command(LIST_ARGS).await?;
        parse_list(&output)
    }
}

/// Classify a failed helm invocation by its stderr
fn command_error(stderr: &str) -> ChartError {
    let lower = stderr.to_lowercase();
    if lower.contains("kubernetes cluster unreachable")
        || lower.contains("connection refused")
        || lower.contains("no such host")
    {
        ChartError::Transport(stderr.to_string())
    } else {
        ChartError::Release(stderr.to_string())
    }
}

fn is_release_missing(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("release: not found") || lower.contains("release not loaded")
}

fn parse_list(output: &str) -> Result<Vec<Release>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<HelmListEntry> = serde_json::from_str(output)?;
    entries
        .into_iter()
        .map(|entry| {
            let revision = entry.revision.parse().map_err(|_| {
                ChartError::Release(format!(
                    "release {} has invalid revision '{}'",
                    entry.name, entry.revision
                ))
            })?;
            Ok(Release {
                updated: parse_timestamp(&entry.updated),
                name: entry.name,
                namespace: entry.namespace,
                status: entry.status,
                revision,
                chart: entry.chart,
            })
        })
        .collect()
}

/// helm prints Go's default time format: `2024-05-01 10:00:00.123 +0000 UTC`
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed: Vec<&str> = value.split_whitespace().take(3).collect();
    DateTime::parse_from_str(&trimmed.join(" "), "%Y-%m-%d %H:%M:%S%.f %z")
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::bundle::TEMPLATES_DIR;
    use crate::chart::{ChartFile, ChartMetadata, DEFAULT_CHART_VERSION};
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_list() {
        let output = r#"[{"name":"web","namespace":"default","revision":"3","updated":"2024-05-01 10:20:30.123456 +0200 CEST","status":"deployed","chart":"web-0.1.0","app_version":""}]"#;
        let releases = parse_list(output).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].name, "web");
        assert_eq!(releases[0].revision, 3);
        assert_eq!(releases[0].chart, "web-0.1.0");

        let updated = releases[0].updated.unwrap();
        assert_eq!(updated.day(), 1);
        assert_eq!(updated.hour(), 8);
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_list("").unwrap().is_empty());
        assert!(parse_list("[]").unwrap().is_empty());
    }

    #[test]
    fn test_command_error_classification() {
        assert!(matches!(
            command_error("Error: Kubernetes cluster unreachable: dial tcp"),
            ChartError::Transport(_)
        ));
        assert!(matches!(
            command_error("Error: INSTALLATION FAILED: bad manifest"),
            ChartError::Release(_)
        ));
        assert!(is_release_missing(
            "Error: uninstall: Release not loaded: web: release: not found"
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_transport_error() {
        let settings = HelmSettings {
            helm_bin: "/nonexistent/helm-binary".to_string(),
            ..Default::default()
        };
        let err = HelmCli::new(settings).list_releases().await.unwrap_err();
        assert!(matches!(err, ChartError::Transport(_)));
    }

    #[test]
    fn test_list_is_not_paged() {
        let max = LIST_ARGS.iter().position(|a| *a == "--max").unwrap();
        assert_eq!(LIST_ARGS[max + 1], "0");
        assert!(LIST_ARGS.contains(&"--all"));
    }

    /// A stand-in helm that records its arguments and exits with `status`
    #[cfg(unix)]
    fn fake_helm(dir: &Path, status: i32) -> HelmSettings {
        use std::os::unix::fs::PermissionsExt;

        let bin = dir.join("helm");
        let script = format!(
            "#!/bin/sh\necho \"$@\" > \"{}\"\necho '[]'\necho 'Error: INSTALLATION FAILED' >&2\nexit {}\n",
            dir.join("args").display(),
            status
        );
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        HelmSettings {
            helm_bin: bin.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_passes_max_zero() {
        let dir = tempfile::tempdir().unwrap();
        let helm = HelmCli::new(fake_helm(dir.path(), 0));

        assert!(helm.list_releases().await.unwrap().is_empty());
        let args = std::fs::read_to_string(dir.path().join("args")).unwrap();
        assert!(args.starts_with("list --all --max 0 --output json"), "{}", args);
    }

    fn web_chart() -> Chart {
        Chart::new(ChartMetadata::new("web", DEFAULT_CHART_VERSION), Vec::new())
    }

    #[tokio::test]
    async fn test_failed_save_leaves_no_scratch() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = HelmSettings {
            helm_bin: "/nonexistent/helm-binary".to_string(),
            ..Default::default()
        };
        let helm = HelmCli::new(settings).with_scratch_root(scratch.path());

        // A file named like the templates directory cannot be written
        let mut chart = web_chart();
        chart.files.push(ChartFile {
            path: TEMPLATES_DIR.to_string(),
            data: String::new(),
        });

        let err = helm.install("web", &chart).await.unwrap_err();
        assert!(matches!(err, ChartError::Serialization(_)));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_install_leaves_no_scratch() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let helm = HelmCli::new(fake_helm(bin.path(), 1)).with_scratch_root(scratch.path());

        let err = helm.install("web", &web_chart()).await.unwrap_err();
        assert!(matches!(err, ChartError::Release(_)));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);

        let args = std::fs::read_to_string(bin.path().join("args")).unwrap();
        assert!(args.starts_with("upgrade --install web "), "{}", args);
    }
}
