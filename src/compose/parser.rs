//! Compose file loader

use super::config::{
    CommandConfig, ComposeConfig, EnvironmentConfig, EnvValue, ExternalConfig, PortConfig,
    Project, VolumeMount,
};
use crate::error::{ChartError, Result};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default compose file names
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Compose file parser
pub struct ComposeParser;

impl ComposeParser {
    /// Find compose file in directory
    pub fn find_compose_file(dir: &Path) -> Option<PathBuf> {
        DEFAULT_COMPOSE_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Parse compose file from path
    pub fn parse_file(path: &Path) -> Result<ComposeConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChartError::ComposeParse(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_str(&content)
    }

    /// Parse compose file from string
    pub fn parse_str(content: &str) -> Result<ComposeConfig> {
        serde_yaml::from_str(content)
            .map_err(|e| ComposeParseError::from(e).into())
    }

    /// Parse multiple compose files (with merging)
    pub fn parse_files(paths: &[PathBuf]) -> Result<ComposeConfig> {
        let mut config = ComposeConfig::default();

        for path in paths {
            let file_config = Self::parse_file(path)?;
            config = Self::merge_configs(config, file_config);
        }

        Ok(config)
    }

    /// Merge two compose configurations. The overlay wins field by field for
    /// services and key by key for top-level resources.
    pub fn merge_configs(base: ComposeConfig, overlay: ComposeConfig) -> ComposeConfig {
        let mut result = base;

        if overlay.version.is_some() {
            result.version = overlay.version;
        }
        if overlay.name.is_some() {
            result.name = overlay.name;
        }

        for (name, service) in overlay.services {
            let Some(existing) = result.services.get_mut(&name) else {
                result.services.insert(name, service);
                continue;
            };

            macro_rules! overlay_fields {
                ($($field:ident),*) => {
                    $(if service.$field.is_some() {
                        existing.$field = service.$field;
                    })*
                };
            }
            overlay_fields!(
                image, build, command, entrypoint, hostname, env_file, expose, ports, volumes,
                networks, depends_on, deploy, healthcheck, labels, restart, working_dir, user,
                privileged, read_only, stdin_open, tty, secrets, configs
            );

            // environment merges per key
            match (existing.environment.take(), service.environment) {
                (Some(base_env), Some(overlay_env)) => {
                    let mut merged = base_env.to_pairs();
                    merged.extend(overlay_env.to_pairs());
                    existing.environment = Some(EnvironmentConfig::Map(
                        merged
                            .into_iter()
                            .map(|(k, v)| (k, Some(EnvValue::Str(v))))
                            .collect(),
                    ));
                }
                (base_env, overlay_env) => existing.environment = overlay_env.or(base_env),
            }
        }

        result.networks.extend(overlay.networks);
        result.volumes.extend(overlay.volumes);
        result.secrets.extend(overlay.secrets);
        result.configs.extend(overlay.configs);

        result
    }

    /// Validate compose configuration, returning non-fatal warnings
    pub fn validate(config: &ComposeConfig) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        for (name, service) in &config.services {
            if service.image.is_none() && service.build.is_none() {
                return Err(ChartError::ComposeParse(format!(
                    "Service '{}' must have either 'image' or 'build' specified",
                    name
                )));
            }

            for dep in service.dependency_names() {
                if !config.services.contains_key(&dep) {
                    return Err(ChartError::ComposeParse(format!(
                        "Service '{}' depends on unknown service '{}'",
                        name, dep
                    )));
                }
            }

            for net in service.network_names() {
                if net != "default" && !config.networks.contains_key(&net) {
                    warnings.push(format!(
                        "Service '{}' references undefined network '{}'",
                        name, net
                    ));
                }
            }

            if service.depends_on.is_some() {
                warnings.push(format!(
                    "Service '{}' declares depends_on; start order is not enforced in the cluster",
                    name
                ));
            }
        }

        Ok(warnings)
    }

    /// Interpolate environment variables in config
    pub fn interpolate(config: &mut ComposeConfig, env: &HashMap<String, String>) {
        if let Some(name) = config.name.as_mut() {
            *name = interpolate_string(name, env);
        }

        for service in config.services.values_mut() {
            if let Some(image) = service.image.as_mut() {
                *image = interpolate_string(image, env);
            }

            for cmd in [service.command.as_mut(), service.entrypoint.as_mut()]
                .into_iter()
                .flatten()
            {
                match cmd {
                    CommandConfig::Shell(s) => *s = interpolate_string(s, env),
                    CommandConfig::Exec(arr) => {
                        for item in arr.iter_mut() {
                            *item = interpolate_string(item, env);
                        }
                    }
                }
            }

            match service.environment.as_mut() {
                Some(EnvironmentConfig::Map(map)) => {
                    for value in map.values_mut().flatten() {
                        if let EnvValue::Str(v) = value {
                            *v = interpolate_string(v, env);
                        }
                    }
                }
                Some(EnvironmentConfig::Array(arr)) => {
                    for item in arr.iter_mut() {
                        *item = interpolate_string(item, env);
                    }
                }
                None => {}
            }

            for port in service.ports.iter_mut().flatten() {
                if let PortConfig::Short(spec) = port {
                    *spec = interpolate_string(spec, env);
                }
            }

            for mount in service.volumes.iter_mut().flatten() {
                if let VolumeMount::Short(spec) = mount {
                    *spec = interpolate_string(spec, env);
                }
            }
        }
    }

    /// Load, merge, interpolate and validate compose files into a project.
    ///
    /// The project name is taken from `name`, then the top-level `name`
    /// field, then the directory holding the first file.
    pub fn load_project(
        paths: &[PathBuf],
        name: Option<&str>,
        env: &HashMap<String, String>,
    ) -> Result<Project> {
        let first = paths
            .first()
            .ok_or_else(|| ChartError::ComposeParse("No compose file given".to_string()))?;

        let mut config = Self::parse_files(paths)?;
        Self::interpolate(&mut config, env);

        for warning in Self::validate(&config)? {
            tracing::warn!("{}", warning);
        }

        let working_dir = first
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let project_name = name
            .map(str::to_string)
            .or_else(|| config.name.clone())
            .or_else(|| {
                std::fs::canonicalize(&working_dir)
                    .ok()
                    .and_then(|p| p.file_name().map(|s| s.to_string_lossy().into_owned()))
            })
            .ok_or_else(|| ChartError::ComposeParse("Unable to determine project name".to_string()))?;

        let mut project = Project::from_config(&project_name, config, working_dir);
        Self::resolve_sources(&mut project, env)?;

        tracing::debug!(
            "Loaded project {} with {} services",
            project.name,
            project.services.len()
        );
        Ok(project)
    }

    /// Read config and secret sources and env files into the project, so
    /// that mapping needs no I/O.
    pub fn resolve_sources(project: &mut Project, env: &HashMap<String, String>) -> Result<()> {
        let base = project.working_dir.clone();

        for (name, config) in project.configs.iter_mut() {
            if config.content.is_some() || ExternalConfig::is_external(&config.external) {
                continue;
            }
            config.content = read_source(&base, name, &config.file, &config.environment, env)?;
        }

        for (name, secret) in project.secrets.iter_mut() {
            if secret.content.is_some() || ExternalConfig::is_external(&secret.external) {
                continue;
            }
            secret.content = read_source(&base, name, &secret.file, &secret.environment, env)?;
        }

        for service in project.services.values_mut() {
            let Some(env_file) = service.env_file.take() else {
                continue;
            };
            let mut merged = BTreeMap::new();
            for path in env_file.paths() {
                let content = std::fs::read_to_string(base.join(&path)).map_err(|e| {
                    ChartError::ComposeParse(format!("Failed to read env file {}: {}", path, e))
                })?;
                merged.extend(parse_env_file(&content));
            }
            if let Some(explicit) = &service.environment {
                merged.extend(explicit.to_pairs());
            }
            service.environment = Some(EnvironmentConfig::Map(
                merged
                    .into_iter()
                    .map(|(k, v)| (k, Some(EnvValue::Str(v))))
                    .collect(),
            ));
        }

        Ok(())
    }
}

/// serde_yaml error with the location folded into the message
struct ComposeParseError(String);

impl From<serde_yaml::Error> for ComposeParseError {
    fn from(e: serde_yaml::Error) -> Self {
        match e.location() {
            Some(loc) => ComposeParseError(format!(
                "Failed to parse YAML at line {} column {}: {}",
                loc.line(),
                loc.column(),
                e
            )),
            None => ComposeParseError(format!("Failed to parse YAML: {}", e)),
        }
    }
}

impl From<ComposeParseError> for ChartError {
    fn from(e: ComposeParseError) -> Self {
        ChartError::ComposeParse(e.0)
    }
}

fn read_source(
    base: &Path,
    name: &str,
    file: &Option<String>,
    variable: &Option<String>,
    env: &HashMap<String, String>,
) -> Result<Option<String>> {
    if let Some(file) = file {
        let path = base.join(file);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ChartError::ComposeParse(format!(
                "Failed to read source of '{}' from {}: {}",
                name,
                path.display(),
                e
            ))
        })?;
        return Ok(Some(content));
    }
    if let Some(variable) = variable {
        return env.get(variable).cloned().map(Some).ok_or_else(|| {
            ChartError::ComposeParse(format!(
                "Environment variable '{}' for '{}' is not set",
                variable, name
            ))
        });
    }
    Ok(None)
}

/// Parse `KEY=value` lines, skipping blanks and comments
fn parse_env_file(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| {
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(v);
            (k.trim().to_string(), v.to_string())
        })
        .collect()
}

fn interpolation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(?::?-([^}]*))?\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("static regex is valid")
    })
}

/// Interpolate environment variables in a string.
///
/// Handles `${VAR}`, `$VAR`, `${VAR:-default}`, `${VAR-default}` and the
/// `$$` escape. Unset variables without a default become empty.
fn interpolate_string(s: &str, env: &HashMap<String, String>) -> String {
    interpolation_pattern()
        .replace_all(s, |caps: &Captures| {
            if &caps[0] == "$$" {
                return "$".to_string();
            }
            let var = caps
                .get(1)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match (env.get(var), caps.get(2)) {
                (Some(value), Some(default)) if value.is_empty() && caps[0].contains(":-") => {
                    default.as_str().to_string()
                }
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => String::new(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_simple_compose() {
        let yaml = r#"
version: "3.8"
services:
  web:
    image: nginx:latest
    ports:
      - "80:80"
      - 443
  db:
    image: postgres:13
    environment:
      POSTGRES_PASSWORD: secret
      MAX_CONNECTIONS: 100
volumes:
  db_data:
"#;

        let config = ComposeParser::parse_str(yaml).unwrap();
        assert_eq!(config.services.len(), 2);
        assert!(config.services.contains_key("web"));
        assert!(config.volumes.contains_key("db_data"));

        let env = config.services["db"].environment.as_ref().unwrap().to_pairs();
        assert_eq!(env["MAX_CONNECTIONS"], "100");
    }

    #[test]
    fn test_validate_missing_image() {
        let yaml = r#"
services:
  web:
    ports:
      - "80:80"
"#;

        let config = ComposeParser::parse_str(yaml).unwrap();
        assert!(ComposeParser::validate(&config).is_err());
    }

    #[test]
    fn test_validate_unknown_dependency() {
        let yaml = r#"
services:
  web:
    image: nginx
    depends_on: [db]
"#;

        let config = ComposeParser::parse_str(yaml).unwrap();
        assert!(ComposeParser::validate(&config).is_err());
    }

    #[test]
    fn test_interpolate() {
        let mut env = HashMap::new();
        env.insert("TAG".to_string(), "1.0.0".to_string());
        env.insert("EMPTY".to_string(), String::new());

        assert_eq!(interpolate_string("nginx:${TAG}", &env), "nginx:1.0.0");
        assert_eq!(interpolate_string("nginx:$TAG", &env), "nginx:1.0.0");
        assert_eq!(interpolate_string("${MISSING:-alpine}", &env), "alpine");
        assert_eq!(interpolate_string("${EMPTY:-fallback}", &env), "fallback");
        assert_eq!(interpolate_string("${EMPTY-fallback}", &env), "");
        assert_eq!(interpolate_string("cost $$5", &env), "cost $5");
    }

    #[test]
    fn test_merge_overlay_wins() {
        let base = ComposeParser::parse_str(
            r#"
services:
  web:
    image: nginx:1
    environment:
      A: "1"
      B: "2"
"#,
        )
        .unwrap();
        let overlay = ComposeParser::parse_str(
            r#"
services:
  web:
    image: nginx:2
    environment:
      B: "3"
"#,
        )
        .unwrap();

        let merged = ComposeParser::merge_configs(base, overlay);
        let web = &merged.services["web"];
        assert_eq!(web.image.as_deref(), Some("nginx:2"));

        let env = web.environment.as_ref().unwrap().to_pairs();
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "3");
    }

    #[test]
    fn test_load_project_resolves_sources() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("nginx.conf"), "server {}").unwrap();
        std::fs::write(dir.path().join(".env.web"), "# comment\nMODE=\"prod\"\n").unwrap();
        std::fs::write(
            dir.path().join("compose.yaml"),
            r#"
name: shop
services:
  web:
    image: nginx:${TAG:-latest}
    env_file: .env.web
    environment:
      LEVEL: debug
configs:
  nginx_conf:
    file: ./nginx.conf
secrets:
  token:
    environment: API_TOKEN
"#,
        )
        .unwrap();

        let mut env = HashMap::new();
        env.insert("API_TOKEN".to_string(), "s3cr3t".to_string());

        let file = ComposeParser::find_compose_file(dir.path()).unwrap();
        let project = ComposeParser::load_project(&[file], None, &env).unwrap();

        assert_eq!(project.name, "shop");
        assert_eq!(project.services["web"].image.as_deref(), Some("nginx:latest"));
        assert_eq!(
            project.configs["nginx_conf"].content.as_deref(),
            Some("server {}")
        );
        assert_eq!(project.secrets["token"].content.as_deref(), Some("s3cr3t"));

        let env = project.services["web"].environment.as_ref().unwrap().to_pairs();
        assert_eq!(env["MODE"], "prod");
        assert_eq!(env["LEVEL"], "debug");
    }
}
