//! Compose project model
//!
//! Every map is a `BTreeMap` so that walking a project always visits keys in
//! the same order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Compose file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Compose file version (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Top-level project name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Services
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    /// Networks
    #[serde(default)]
    pub networks: BTreeMap<String, Option<NetworkConfig>>,
    /// Volumes
    #[serde(default)]
    pub volumes: BTreeMap<String, Option<VolumeConfig>>,
    /// Secrets
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretConfig>,
    /// Configs
    #[serde(default)]
    pub configs: BTreeMap<String, ConfigConfig>,
}

/// A named Compose project, ready for mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Project {
    /// Project name
    pub name: String,
    /// Directory relative paths are resolved against
    pub working_dir: PathBuf,
    /// Services
    pub services: BTreeMap<String, ServiceConfig>,
    /// Networks
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Volumes
    pub volumes: BTreeMap<String, VolumeConfig>,
    /// Secrets
    pub secrets: BTreeMap<String, SecretConfig>,
    /// Configs
    pub configs: BTreeMap<String, ConfigConfig>,
}

impl Project {
    /// Create an empty project
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Build a project out of a parsed compose file
    pub fn from_config(name: &str, config: ComposeConfig, working_dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            working_dir,
            services: config.services,
            networks: config
                .networks
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or_default()))
                .collect(),
            volumes: config
                .volumes
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or_default()))
                .collect(),
            secrets: config.secrets,
            configs: config.configs,
        }
    }

    /// Add a service
    pub fn with_service(mut self, name: &str, service: ServiceConfig) -> Self {
        self.services.insert(name.to_string(), service);
        self
    }

    /// Add a volume
    pub fn with_volume(mut self, name: &str, volume: VolumeConfig) -> Self {
        self.volumes.insert(name.to_string(), volume);
        self
    }

    /// Add a config
    pub fn with_config(mut self, name: &str, config: ConfigConfig) -> Self {
        self.configs.insert(name.to_string(), config);
        self
    }

    /// Add a secret
    pub fn with_secret(mut self, name: &str, secret: SecretConfig) -> Self {
        self.secrets.insert(name.to_string(), secret);
        self
    }
}

/// Service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Image name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Build configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    /// Command to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandConfig>,
    /// Entrypoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<CommandConfig>,
    /// Hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentConfig>,
    /// Environment file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<EnvFileConfig>,
    /// Exposed ports (container only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<Vec<PortNumber>>,
    /// Port mappings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortConfig>>,
    /// Volume mounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<VolumeMount>>,
    /// Networks to connect to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networks: Option<NetworksConfig>,
    /// Service dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOnConfig>,
    /// Deploy configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,
    /// Healthcheck configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthcheckConfig>,
    /// Labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelsConfig>,
    /// Restart policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// User
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Privileged mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    /// Read only root filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Stdin open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin_open: Option<bool>,
    /// TTY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<bool>,
    /// Secrets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<FileRef>>,
    /// Configs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs: Option<Vec<FileRef>>,
}

impl ServiceConfig {
    /// Service running the given image
    pub fn with_image(image: &str) -> Self {
        Self {
            image: Some(image.to_string()),
            ..Default::default()
        }
    }

    /// Declared replica count, if any
    pub fn replicas(&self) -> Option<u32> {
        self.deploy.as_ref().and_then(|d| d.replicas)
    }

    /// Names of the networks this service joins
    pub fn network_names(&self) -> Vec<String> {
        match &self.networks {
            Some(NetworksConfig::Array(arr)) => arr.clone(),
            Some(NetworksConfig::Map(map)) => map.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Names of the services this service depends on
    pub fn dependency_names(&self) -> Vec<String> {
        match &self.depends_on {
            Some(DependsOnConfig::Array(arr)) => arr.clone(),
            Some(DependsOnConfig::Map(map)) => map.keys().cloned().collect(),
            None => Vec::new(),
        }
    }
}

/// Build configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildConfig {
    /// Simple context path
    Simple(String),
    /// Full build configuration
    Full(BuildConfigFull),
}

/// Full build configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildConfigFull {
    /// Build context
    pub context: Option<String>,
    /// Dockerfile path
    pub dockerfile: Option<String>,
    /// Build arguments
    #[serde(default)]
    pub args: Option<BTreeMap<String, String>>,
    /// Target stage
    pub target: Option<String>,
}

/// Command configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandConfig {
    /// Shell command string
    Shell(String),
    /// Exec form array
    Exec(Vec<String>),
}

/// Environment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentConfig {
    /// Array of KEY=value strings
    Array(Vec<String>),
    /// Map of key to value
    Map(BTreeMap<String, Option<EnvValue>>),
}

impl EnvironmentConfig {
    /// Flatten to sorted key/value pairs. Keys without a value are dropped.
    pub fn to_pairs(&self) -> BTreeMap<String, String> {
        let mut pairs = BTreeMap::new();
        match self {
            EnvironmentConfig::Array(arr) => {
                for item in arr {
                    if let Some((key, value)) = item.split_once('=') {
                        pairs.insert(key.to_string(), value.to_string());
                    }
                }
            }
            EnvironmentConfig::Map(map) => {
                for (key, value) in map {
                    if let Some(v) = value {
                        pairs.insert(key.clone(), v.to_string());
                    }
                }
            }
        }
        pairs
    }
}

/// Scalar environment value; YAML lets numbers and booleans through unquoted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for EnvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvValue::Bool(b) => write!(f, "{}", b),
            EnvValue::Int(i) => write!(f, "{}", i),
            EnvValue::Float(x) => write!(f, "{}", x),
            EnvValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Env file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvFileConfig {
    /// Single file
    Single(String),
    /// Multiple files
    Multiple(Vec<String>),
}

impl EnvFileConfig {
    /// File paths in declaration order
    pub fn paths(&self) -> Vec<String> {
        match self {
            EnvFileConfig::Single(p) => vec![p.clone()],
            EnvFileConfig::Multiple(ps) => ps.clone(),
        }
    }
}

/// Port number written either as a YAML integer or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortNumber {
    Number(u16),
    Text(String),
}

impl std::fmt::Display for PortNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortNumber::Number(n) => write!(f, "{}", n),
            PortNumber::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Port configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortConfig {
    /// Bare container port: `80`
    Number(u16),
    /// Short syntax: "8080:80"
    Short(String),
    /// Long syntax
    Long(PortConfigLong),
}

/// Long port configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortConfigLong {
    /// Target port in container
    pub target: u16,
    /// Published port on host
    pub published: Option<PortNumber>,
    /// Host IP to bind to
    pub host_ip: Option<String>,
    /// Protocol (tcp/udp)
    pub protocol: Option<String>,
    /// Mode (host/ingress)
    pub mode: Option<String>,
}

/// Volume mount configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeMount {
    /// Short syntax: "source:target:mode"
    Short(String),
    /// Long syntax
    Long(VolumeMountLong),
}

/// Long volume mount configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeMountLong {
    /// Mount type (volume, bind, tmpfs)
    #[serde(rename = "type")]
    pub mount_type: Option<String>,
    /// Source path or volume name
    pub source: Option<String>,
    /// Target path in container
    pub target: String,
    /// Read only
    pub read_only: Option<bool>,
    /// Tmpfs options
    pub tmpfs: Option<TmpfsOptions>,
}

/// Tmpfs options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TmpfsOptions {
    /// Size in bytes
    pub size: Option<u64>,
}

/// Networks configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworksConfig {
    /// Array of network names
    Array(Vec<String>),
    /// Map of network name to config
    Map(BTreeMap<String, Option<ServiceNetworkConfig>>),
}

/// Service network configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceNetworkConfig {
    /// Aliases
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
}

/// Depends on configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOnConfig {
    /// Array of service names
    Array(Vec<String>),
    /// Map of service to condition
    Map(BTreeMap<String, DependsOnCondition>),
}

/// Depends on condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependsOnCondition {
    /// Condition to wait for
    pub condition: String,
}

/// Deploy configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Deployment mode (replicated, global)
    pub mode: Option<String>,
    /// Number of replicas
    pub replicas: Option<u32>,
    /// Resource limits and reservations
    pub resources: Option<ResourcesConfig>,
    /// Restart policy
    pub restart_policy: Option<RestartPolicyConfig>,
    /// Labels
    #[serde(default)]
    pub labels: Option<LabelsConfig>,
}

/// Resources configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Resource limits
    pub limits: Option<ResourceSpec>,
    /// Resource reservations
    pub reservations: Option<ResourceSpec>,
}

/// Resource specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// CPU limit/reservation
    pub cpus: Option<CpuCount>,
    /// Memory limit/reservation
    pub memory: Option<String>,
}

/// CPU counts show up as strings, integers or floats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CpuCount {
    Int(u64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for CpuCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CpuCount::Int(n) => write!(f, "{}", n),
            CpuCount::Float(x) => write!(f, "{}", x),
            CpuCount::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Restart policy configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestartPolicyConfig {
    /// Condition (none, on-failure, any)
    pub condition: Option<String>,
    /// Maximum attempts
    pub max_attempts: Option<u32>,
}

/// Healthcheck configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthcheckConfig {
    /// Test command
    pub test: Option<HealthcheckTest>,
    /// Interval
    pub interval: Option<String>,
    /// Timeout
    pub timeout: Option<String>,
    /// Retries
    pub retries: Option<u32>,
    /// Start period
    pub start_period: Option<String>,
    /// Disable healthcheck
    pub disable: Option<bool>,
}

/// Healthcheck test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthcheckTest {
    /// Command string, run through a shell
    Command(String),
    /// Command array: `["CMD", ...]`, `["CMD-SHELL", "..."]` or `["NONE"]`
    Array(Vec<String>),
}

/// Labels configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelsConfig {
    /// Array of "key=value" strings
    Array(Vec<String>),
    /// Map of key to value
    Map(BTreeMap<String, String>),
}

impl LabelsConfig {
    /// Flatten to sorted key/value pairs
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            LabelsConfig::Array(arr) => arr
                .iter()
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (item.clone(), String::new()),
                })
                .collect(),
            LabelsConfig::Map(map) => map.clone(),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Driver
    pub driver: Option<String>,
    /// Driver options
    #[serde(default)]
    pub driver_opts: Option<BTreeMap<String, String>>,
    /// External network
    pub external: Option<ExternalConfig>,
    /// Internal network
    pub internal: Option<bool>,
    /// Name
    pub name: Option<String>,
}

/// Volume configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Driver
    pub driver: Option<String>,
    /// Driver options
    #[serde(default)]
    pub driver_opts: Option<BTreeMap<String, String>>,
    /// External volume
    pub external: Option<ExternalConfig>,
    /// Labels
    #[serde(default)]
    pub labels: Option<LabelsConfig>,
    /// Name
    pub name: Option<String>,
}

/// External resource configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalConfig {
    /// Boolean
    Bool(bool),
    /// With name
    Named { name: String },
}

impl ExternalConfig {
    /// Whether the resource lives outside the project
    pub fn is_external(external: &Option<ExternalConfig>) -> bool {
        match external {
            Some(ExternalConfig::Bool(b)) => *b,
            Some(ExternalConfig::Named { .. }) => true,
            None => false,
        }
    }
}

/// Secret configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretConfig {
    /// File path
    pub file: Option<String>,
    /// Environment variable
    pub environment: Option<String>,
    /// Inline or resolved content
    pub content: Option<String>,
    /// External secret
    pub external: Option<ExternalConfig>,
    /// Name
    pub name: Option<String>,
}

/// Config configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigConfig {
    /// File path
    pub file: Option<String>,
    /// Environment variable
    pub environment: Option<String>,
    /// Inline or resolved content
    pub content: Option<String>,
    /// External config
    pub external: Option<ExternalConfig>,
    /// Name
    pub name: Option<String>,
}

/// Config or secret reference in a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileRef {
    /// Short syntax
    Short(String),
    /// Long syntax
    Long(FileRefLong),
}

impl FileRef {
    /// Referenced config or secret
    pub fn source(&self) -> &str {
        match self {
            FileRef::Short(s) => s,
            FileRef::Long(l) => &l.source,
        }
    }

    /// Declared mount path, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            FileRef::Short(_) => None,
            FileRef::Long(l) => l.target.as_deref(),
        }
    }

    /// Declared file mode, if any
    pub fn mode(&self) -> Option<u32> {
        match self {
            FileRef::Short(_) => None,
            FileRef::Long(l) => l.mode,
        }
    }
}

/// Long config or secret reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRefLong {
    /// Source name
    pub source: String,
    /// Target path in container
    pub target: Option<String>,
    /// Mode
    pub mode: Option<u32>,
}
