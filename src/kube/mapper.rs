//! Compose project to Kubernetes object mapping
//!
//! Mapping is pure: the project is only read, nothing touches the filesystem
//! or the cluster, and every error is raised before a single object is
//! returned. Output is sorted by kind, then name.

use super::convert::{
    cpu_quantity, duration_seconds, memory_quantity, parse_port, split_command, PortMapping,
};
use super::objects::*;
use crate::compose::config::{
    CommandConfig, ExternalConfig, HealthcheckConfig, HealthcheckTest, PortConfig,
    Project, ResourceSpec, ServiceConfig, VolumeConfig, VolumeMount as ComposeMount,
    VolumeMountLong,
};
use crate::compose::normalize::{object_name, validate_object_name, volume_name};
use crate::error::{ChartError, Result};
use base64::Engine;
use std::collections::{BTreeMap, BTreeSet};

/// Storage requested by a claim when the volume declares no `size`
pub const DEFAULT_CLAIM_SIZE: &str = "100Mi";
/// Where secrets land when a service does not say
pub const SECRETS_DIR: &str = "/run/secrets";

const CORE_API: &str = "v1";
const APPS_API: &str = "apps/v1";

/// Map a normalized project to Kubernetes objects, sorted by kind then name
pub fn map_project(project: &Project) -> Result<Vec<Manifest>> {
    ObjectMapper::new(project)?.map()
}

struct ObjectMapper<'a> {
    project: &'a Project,
    project_name: String,
    /// Compose service key → object name
    services: BTreeMap<&'a str, String>,
    /// Compose config key → ConfigMap name
    configs: BTreeMap<&'a str, String>,
    /// Compose secret key → Secret name
    secrets: BTreeMap<&'a str, String>,
    /// Volume key → claim name
    claims: BTreeMap<&'a str, String>,
}

impl<'a> ObjectMapper<'a> {
    fn new(project: &'a Project) -> Result<Self> {
        let project_name = object_name(&project.name);
        validate_object_name("project", &project_name)?;

        let services = unique_names(
            "service",
            project.services.keys().map(|k| (k.as_str(), object_name(k))),
        )?;
        let configs = unique_names(
            "config",
            project.configs.iter().map(|(k, c)| {
                (k.as_str(), resource_name(k, &c.external, c.name.as_deref()))
            }),
        )?;
        let secrets = unique_names(
            "secret",
            project.secrets.iter().map(|(k, s)| {
                (k.as_str(), resource_name(k, &s.external, s.name.as_deref()))
            }),
        )?;

        for key in project.volumes.keys() {
            if key.contains('_') {
                return Err(ChartError::naming(
                    "volume",
                    key,
                    "volume names must be normalized before mapping",
                ));
            }
        }
        let claims = unique_names(
            "volume",
            project.volumes.iter().map(|(k, v)| {
                let claim = if ExternalConfig::is_external(&v.external) {
                    resource_name(k, &v.external, v.name.as_deref())
                } else {
                    k.clone()
                };
                (k.as_str(), claim)
            }),
        )?;

        Ok(Self {
            project,
            project_name,
            services,
            configs,
            secrets,
            claims,
        })
    }

    fn map(&self) -> Result<Vec<Manifest>> {
        self.check_networks()?;

        let mut manifests = Vec::new();

        for (key, volume) in &self.project.volumes {
            if let Some(claim) = self.map_volume(key, volume)? {
                manifests.push(claim);
            }
        }

        for (key, config) in &self.project.configs {
            if ExternalConfig::is_external(&config.external) {
                continue;
            }
            let content = config.content.as_ref().ok_or_else(|| {
                ChartError::Validation(format!(
                    "Config '{}' has no content; its file or environment source was not resolved",
                    key
                ))
            })?;
            manifests.push(Manifest::ConfigMap(ConfigMap {
                api_version: CORE_API.to_string(),
                metadata: ObjectMeta::new(&self.configs[key.as_str()], self.project_labels()),
                data: BTreeMap::from([(key.clone(), content.clone())]),
            }));
        }

        for (key, secret) in &self.project.secrets {
            if ExternalConfig::is_external(&secret.external) {
                continue;
            }
            let content = secret.content.as_ref().ok_or_else(|| {
                ChartError::Validation(format!(
                    "Secret '{}' has no content; its file or environment source was not resolved",
                    key
                ))
            })?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(content);
            manifests.push(Manifest::Secret(Secret {
                api_version: CORE_API.to_string(),
                metadata: ObjectMeta::new(&self.secrets[key.as_str()], self.project_labels()),
                secret_type: "Opaque".to_string(),
                data: BTreeMap::from([(key.clone(), encoded)]),
            }));
        }

        for (key, service) in &self.project.services {
            manifests.extend(self.map_service(key, service)?);
        }

        manifests.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(manifests)
    }

    fn check_networks(&self) -> Result<()> {
        for (name, network) in &self.project.networks {
            if let Some(opts) = network.driver_opts.as_ref().filter(|o| !o.is_empty()) {
                let keys: Vec<_> = opts.keys().map(String::as_str).collect();
                return Err(ChartError::Validation(format!(
                    "Network '{}' uses unsupported driver options: {}",
                    name,
                    keys.join(", ")
                )));
            }
        }
        for (key, service) in &self.project.services {
            for network in service.network_names() {
                if network != "default" && !self.project.networks.contains_key(&network) {
                    return Err(ChartError::Validation(format!(
                        "Service '{}' references undeclared network '{}'",
                        key, network
                    )));
                }
            }
        }
        Ok(())
    }

    fn map_volume(&self, key: &str, volume: &VolumeConfig) -> Result<Option<Manifest>> {
        match volume.driver.as_deref() {
            None | Some("local") | Some("default") => {}
            Some(driver) => {
                return Err(ChartError::Validation(format!(
                    "Volume '{}' uses unsupported driver '{}'",
                    key, driver
                )));
            }
        }

        let opts = volume.driver_opts.clone().unwrap_or_default();
        if let Some(opt) = opts.keys().find(|k| k.as_str() != "size") {
            return Err(ChartError::Validation(format!(
                "Volume '{}' uses unsupported driver option '{}'",
                key, opt
            )));
        }

        if ExternalConfig::is_external(&volume.external) {
            return Ok(None);
        }

        let size = match opts.get("size") {
            Some(size) => memory_quantity(size)?,
            None => DEFAULT_CLAIM_SIZE.to_string(),
        };

        let mut labels = volume
            .labels
            .as_ref()
            .map(|l| l.to_map())
            .unwrap_or_default();
        labels.extend(self.project_labels());

        Ok(Some(Manifest::PersistentVolumeClaim(PersistentVolumeClaim {
            api_version: CORE_API.to_string(),
            metadata: ObjectMeta::new(&self.claims[key], labels),
            spec: ClaimSpec {
                access_modes: vec!["ReadWriteOnce".to_string()],
                resources: ClaimResources {
                    requests: BTreeMap::from([("storage".to_string(), size)]),
                },
            },
        })))
    }

    fn map_service(&self, key: &str, service: &ServiceConfig) -> Result<Vec<Manifest>> {
        let name = &self.services[key];
        let image = service.image.clone().ok_or_else(|| {
            ChartError::Validation(format!(
                "Service '{}' has no image; build-only services cannot be deployed",
                key
            ))
        })?;
        check_restart(key, service)?;

        tracing::debug!("Mapping service {} to {}", key, name);

        let selector = self.selector_labels(name);
        let mut pod_volumes = Vec::new();
        let container = self.container(key, name, image, service, &mut pod_volumes)?;

        let hostname = match &service.hostname {
            Some(h) => {
                validate_object_name("hostname", h)?;
                Some(h.clone())
            }
            None => None,
        };

        let template = PodTemplateSpec {
            metadata: TemplateMeta {
                labels: selector.clone(),
            },
            spec: PodSpec {
                containers: vec![container],
                volumes: pod_volumes,
                restart_policy: Some("Always".to_string()),
                hostname,
            },
        };

        let mut labels = BTreeMap::new();
        if let Some(l) = &service.labels {
            labels.extend(l.to_map());
        }
        if let Some(l) = service.deploy.as_ref().and_then(|d| d.labels.as_ref()) {
            labels.extend(l.to_map());
        }
        labels.extend(selector.clone());
        let metadata = ObjectMeta::new(name, labels);

        let mode = service
            .deploy
            .as_ref()
            .and_then(|d| d.mode.as_deref())
            .unwrap_or("replicated");

        let workload = match mode {
            "global" => Manifest::DaemonSet(DaemonSet {
                api_version: APPS_API.to_string(),
                metadata,
                spec: DaemonSetSpec {
                    selector: LabelSelector {
                        match_labels: selector.clone(),
                    },
                    template,
                },
            }),
            "replicated" => {
                let replicas = service.replicas().unwrap_or(1);
                let strategy = if replicas > 1 { "RollingUpdate" } else { "Recreate" };
                Manifest::Deployment(Deployment {
                    api_version: APPS_API.to_string(),
                    metadata,
                    spec: DeploymentSpec {
                        replicas,
                        selector: LabelSelector {
                            match_labels: selector.clone(),
                        },
                        strategy: DeploymentStrategy {
                            strategy_type: strategy.to_string(),
                        },
                        template,
                    },
                })
            }
            other => {
                return Err(ChartError::Validation(format!(
                    "Service '{}' uses unsupported deploy mode '{}'",
                    key, other
                )));
            }
        };

        let mut manifests = vec![workload];
        if let Some(endpoint) = self.endpoint(key, name, service, &selector)? {
            manifests.push(endpoint);
        }
        Ok(manifests)
    }

    fn endpoint(
        &self,
        key: &str,
        name: &str,
        service: &ServiceConfig,
        selector: &BTreeMap<String, String>,
    ) -> Result<Option<Manifest>> {
        let mappings = port_mappings(service.ports.as_deref().unwrap_or_default())?;
        if mappings.is_empty() {
            return Ok(None);
        }

        let mut ports: BTreeMap<(u16, String), ServicePort> = BTreeMap::new();
        for mapping in &mappings {
            let port = mapping.published.unwrap_or(mapping.target);
            let entry = ServicePort {
                name: format!("{}-{}", mapping.protocol.to_lowercase(), port),
                port,
                target_port: mapping.target,
                protocol: mapping.protocol.clone(),
            };
            match ports.get(&(port, mapping.protocol.clone())) {
                Some(existing) if existing.target_port != mapping.target => {
                    return Err(ChartError::Validation(format!(
                        "Service '{}' publishes port {}/{} twice with different targets",
                        key, port, mapping.protocol
                    )));
                }
                Some(_) => {}
                None => {
                    ports.insert((port, mapping.protocol.clone()), entry);
                }
            }
        }

        let service_type = if mappings.iter().any(|m| m.published.is_some()) {
            "LoadBalancer"
        } else {
            "ClusterIP"
        };

        Ok(Some(Manifest::Service(Service {
            api_version: CORE_API.to_string(),
            metadata: ObjectMeta::new(name, selector.clone()),
            spec: ServiceSpec {
                service_type: service_type.to_string(),
                selector: selector.clone(),
                ports: ports.into_values().collect(),
            },
        })))
    }

    fn container(
        &self,
        key: &str,
        name: &str,
        image: String,
        service: &ServiceConfig,
        pod_volumes: &mut Vec<Volume>,
    ) -> Result<Container> {
        let mut container = Container {
            name: name.to_string(),
            image,
            working_dir: service.working_dir.clone(),
            tty: service.tty,
            stdin: service.stdin_open,
            ..Default::default()
        };

        if let Some(entrypoint) = &service.entrypoint {
            container.command = command_words(entrypoint)?;
        }
        if let Some(command) = &service.command {
            container.args = command_words(command)?;
        }

        if let Some(env) = &service.environment {
            container.env = env
                .to_pairs()
                .into_iter()
                .map(|(name, value)| EnvVar { name, value })
                .collect();
        }

        let mut ports: BTreeSet<(u16, String)> = port_mappings(
            service.ports.as_deref().unwrap_or_default(),
        )?
        .into_iter()
        .map(|m| (m.target, m.protocol))
        .collect();
        for exposed in service.expose.iter().flatten() {
            for m in parse_port(&PortConfig::Short(exposed.to_string()))? {
                ports.insert((m.target, m.protocol));
            }
        }
        container.ports = ports
            .into_iter()
            .map(|(container_port, protocol)| ContainerPort {
                container_port,
                protocol,
            })
            .collect();

        for (index, mount) in service.volumes.iter().flatten().enumerate() {
            let (volume_mount, volume) = self.volume_mount(key, index, mount)?;
            add_pod_volume(pod_volumes, volume);
            container.volume_mounts.push(volume_mount);
        }

        for reference in service.configs.iter().flatten() {
            let source = reference.source();
            let cm_name = self.configs.get(source).ok_or_else(|| {
                ChartError::Validation(format!(
                    "Service '{}' references undeclared config '{}'",
                    key, source
                ))
            })?;
            let volume_name = pod_volume_name("config", cm_name)?;
            let target = match reference.target() {
                Some(t) if t.starts_with('/') => t.to_string(),
                Some(t) => format!("/{}", t),
                None => format!("/{}", source),
            };
            add_pod_volume(
                pod_volumes,
                Volume {
                    name: volume_name.clone(),
                    config_map: Some(ConfigMapSource {
                        name: cm_name.clone(),
                        default_mode: reference.mode(),
                    }),
                    ..Default::default()
                },
            );
            container
                .volume_mounts
                .push(file_mount(volume_name, target, source));
        }

        for reference in service.secrets.iter().flatten() {
            let source = reference.source();
            let secret_name = self.secrets.get(source).ok_or_else(|| {
                ChartError::Validation(format!(
                    "Service '{}' references undeclared secret '{}'",
                    key, source
                ))
            })?;
            let volume_name = pod_volume_name("secret", secret_name)?;
            let target = match reference.target() {
                Some(t) if t.starts_with('/') => t.to_string(),
                Some(t) => format!("{}/{}", SECRETS_DIR, t),
                None => format!("{}/{}", SECRETS_DIR, source),
            };
            add_pod_volume(
                pod_volumes,
                Volume {
                    name: volume_name.clone(),
                    secret: Some(SecretSource {
                        secret_name: secret_name.clone(),
                        default_mode: reference.mode(),
                    }),
                    ..Default::default()
                },
            );
            container
                .volume_mounts
                .push(file_mount(volume_name, target, source));
        }

        container.resources = resources(service)?;
        container.liveness_probe = match &service.healthcheck {
            Some(hc) => probe(key, hc)?,
            None => None,
        };
        container.security_context = security_context(key, service)?;

        Ok(container)
    }

    fn volume_mount(
        &self,
        key: &str,
        index: usize,
        mount: &ComposeMount,
    ) -> Result<(VolumeMount, Volume)> {
        let long = match mount {
            ComposeMount::Long(long) => long.clone(),
            ComposeMount::Short(spec) => parse_short_mount(key, spec)?,
        };

        let mount_type = long.mount_type.as_deref().unwrap_or("volume");
        let volume = match (mount_type, long.source.as_deref()) {
            ("volume", None) | ("volume", Some("")) => Volume {
                name: format!("anonymous-{}", index),
                empty_dir: Some(EmptyDirSource::default()),
                ..Default::default()
            },
            ("volume", Some(source)) => {
                let normalized = volume_name(source);
                let claim = self.claims.get(normalized.as_str()).ok_or_else(|| {
                    ChartError::Validation(format!(
                        "Service '{}' mounts undeclared volume '{}'",
                        key, source
                    ))
                })?;
                Volume {
                    name: normalized,
                    persistent_volume_claim: Some(ClaimSource {
                        claim_name: claim.clone(),
                    }),
                    ..Default::default()
                }
            }
            ("tmpfs", _) => Volume {
                name: format!("tmpfs-{}", index),
                empty_dir: Some(EmptyDirSource {
                    medium: Some("Memory".to_string()),
                    size_limit: long
                        .tmpfs
                        .as_ref()
                        .and_then(|t| t.size)
                        .map(|s| s.to_string()),
                }),
                ..Default::default()
            },
            ("bind", source) => {
                return Err(ChartError::Validation(format!(
                    "Service '{}' bind-mounts host path '{}'; host paths have no cluster equivalent",
                    key,
                    source.unwrap_or_default()
                )));
            }
            (other, _) => {
                return Err(ChartError::Validation(format!(
                    "Service '{}' uses unsupported mount type '{}'",
                    key, other
                )));
            }
        };

        let volume_mount = VolumeMount {
            name: volume.name.clone(),
            mount_path: long.target.clone(),
            sub_path: None,
            read_only: long.read_only.filter(|ro| *ro),
        };
        Ok((volume_mount, volume))
    }

    fn project_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(LABEL_PROJECT.to_string(), self.project_name.clone())])
    }

    fn selector_labels(&self, service: &str) -> BTreeMap<String, String> {
        let mut labels = self.project_labels();
        labels.insert(LABEL_SERVICE.to_string(), service.to_string());
        labels
    }
}

/// Normalize names and reject collisions and grammar violations
fn unique_names<'k>(
    kind: &str,
    names: impl Iterator<Item = (&'k str, String)>,
) -> Result<BTreeMap<&'k str, String>> {
    let mut owners: BTreeMap<String, &str> = BTreeMap::new();
    let mut result = BTreeMap::new();
    for (key, name) in names {
        validate_object_name(kind, &name)?;
        if let Some(other) = owners.insert(name.clone(), key) {
            return Err(ChartError::naming(
                kind,
                key,
                format!("collides with '{}', both map to '{}'", other, name),
            ));
        }
        result.insert(key, name);
    }
    Ok(result)
}

/// Object name of a config, secret or external volume
fn resource_name(key: &str, external: &Option<ExternalConfig>, name: Option<&str>) -> String {
    match external {
        Some(ExternalConfig::Named { name }) => name.clone(),
        _ => object_name(name.unwrap_or(key)),
    }
}

/// `<prefix>-<name>`, which must still be a valid label
fn pod_volume_name(prefix: &str, name: &str) -> Result<String> {
    let volume = format!("{}-{}", prefix, name);
    validate_object_name("pod volume", &volume)?;
    Ok(volume)
}

fn add_pod_volume(volumes: &mut Vec<Volume>, volume: Volume) {
    if !volumes.iter().any(|v| v.name == volume.name) {
        volumes.push(volume);
    }
}

fn file_mount(volume: String, target: String, key: &str) -> VolumeMount {
    VolumeMount {
        name: volume,
        mount_path: target,
        sub_path: Some(key.to_string()),
        read_only: Some(true),
    }
}

fn port_mappings(ports: &[PortConfig]) -> Result<Vec<PortMapping>> {
    let mut mappings = Vec::new();
    for port in ports {
        mappings.extend(parse_port(port)?);
    }
    Ok(mappings)
}

fn command_words(command: &CommandConfig) -> Result<Vec<String>> {
    match command {
        CommandConfig::Shell(s) => split_command(s),
        CommandConfig::Exec(arr) => Ok(arr.clone()),
    }
}

/// Short mount syntax: `target`, `source:target` or `source:target:mode`
fn parse_short_mount(key: &str, spec: &str) -> Result<VolumeMountLong> {
    let parts: Vec<&str> = spec.split(':').collect();
    let (source, target, mode) = match parts.as_slice() {
        [target] => (None, *target, None),
        [source, target] => (Some(*source), *target, None),
        [source, target, mode] => (Some(*source), *target, Some(*mode)),
        _ => {
            return Err(ChartError::Validation(format!(
                "Service '{}' has invalid volume specification '{}'",
                key, spec
            )));
        }
    };

    let mount_type = match source {
        Some(s) if s.starts_with('/') || s.starts_with('.') || s.starts_with('~') => "bind",
        _ => "volume",
    };
    let read_only = mode.map(|m| m.split(',').any(|flag| flag == "ro"));

    Ok(VolumeMountLong {
        mount_type: Some(mount_type.to_string()),
        source: source.map(str::to_string),
        target: target.to_string(),
        read_only,
        tmpfs: None,
    })
}

fn check_restart(key: &str, service: &ServiceConfig) -> Result<()> {
    match service.restart.as_deref() {
        None | Some("always") | Some("unless-stopped") => {}
        Some(policy) => {
            return Err(ChartError::Validation(format!(
                "Service '{}' uses restart policy '{}', which long-running workloads cannot honour",
                key, policy
            )));
        }
    }

    let condition = service
        .deploy
        .as_ref()
        .and_then(|d| d.restart_policy.as_ref())
        .and_then(|p| p.condition.as_deref());
    match condition {
        None | Some("any") => Ok(()),
        Some(condition) => Err(ChartError::Validation(format!(
            "Service '{}' uses restart condition '{}', which long-running workloads cannot honour",
            key, condition
        ))),
    }
}

fn resources(service: &ServiceConfig) -> Result<Option<ResourceRequirements>> {
    let Some(res) = service.deploy.as_ref().and_then(|d| d.resources.as_ref()) else {
        return Ok(None);
    };

    fn quantities(spec: Option<&ResourceSpec>) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        if let Some(spec) = spec {
            if let Some(cpus) = &spec.cpus {
                out.insert("cpu".to_string(), cpu_quantity(cpus)?);
            }
            if let Some(memory) = &spec.memory {
                out.insert("memory".to_string(), memory_quantity(memory)?);
            }
        }
        Ok(out)
    }

    let requirements = ResourceRequirements {
        limits: quantities(res.limits.as_ref())?,
        requests: quantities(res.reservations.as_ref())?,
    };
    if requirements.limits.is_empty() && requirements.requests.is_empty() {
        return Ok(None);
    }
    Ok(Some(requirements))
}

fn probe(key: &str, hc: &HealthcheckConfig) -> Result<Option<Probe>> {
    if hc.disable == Some(true) {
        return Ok(None);
    }

    let command = match &hc.test {
        None => return Ok(None),
        Some(HealthcheckTest::Command(s)) => shell(s),
        Some(HealthcheckTest::Array(arr)) => match arr.split_first() {
            Some((first, _)) if first == "NONE" => return Ok(None),
            Some((first, rest)) if first == "CMD" => rest.to_vec(),
            Some((first, rest)) if first == "CMD-SHELL" => shell(&rest.join(" ")),
            _ => {
                return Err(ChartError::Validation(format!(
                    "Service '{}' healthcheck test must start with CMD, CMD-SHELL or NONE",
                    key
                )));
            }
        },
    };

    let seconds = |value: &Option<String>| value.as_deref().map(duration_seconds).transpose();

    Ok(Some(Probe {
        exec: ExecAction { command },
        initial_delay_seconds: seconds(&hc.start_period)?,
        period_seconds: seconds(&hc.interval)?,
        timeout_seconds: seconds(&hc.timeout)?,
        failure_threshold: hc.retries,
    }))
}

fn shell(command: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()]
}

fn security_context(key: &str, service: &ServiceConfig) -> Result<Option<SecurityContext>> {
    let mut ctx = SecurityContext {
        privileged: service.privileged.filter(|p| *p),
        read_only_root_filesystem: service.read_only.filter(|r| *r),
        ..Default::default()
    };

    if let Some(user) = &service.user {
        let bad = || {
            ChartError::Validation(format!(
                "Service '{}' runs as user '{}'; only numeric uid[:gid] is supported",
                key, user
            ))
        };
        let (uid, gid) = match user.split_once(':') {
            Some((uid, gid)) => (uid, Some(gid)),
            None => (user.as_str(), None),
        };
        ctx.run_as_user = Some(uid.parse().map_err(|_| bad())?);
        ctx.run_as_group = gid.map(|g| g.parse().map_err(|_| bad())).transpose()?;
    }

    if ctx == SecurityContext::default() {
        Ok(None)
    } else {
        Ok(Some(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::config::{
        ConfigConfig, DeployConfig, EnvironmentConfig, FileRef, FileRefLong, NetworkConfig,
        NetworksConfig, ResourcesConfig, SecretConfig,
    };
    use crate::compose::normalize::normalize_volume_names;

    fn web_project() -> Project {
        let mut api = ServiceConfig::with_image("example/api:1.0");
        api.ports = Some(vec![PortConfig::Short("80".to_string())]);
        Project::new("web").with_service("api", api)
    }

    fn find<'m>(manifests: &'m [Manifest], kind: &str, name: &str) -> &'m Manifest {
        manifests
            .iter()
            .find(|m| m.kind() == kind && m.name() == name)
            .unwrap_or_else(|| panic!("missing {} {}", kind, name))
    }

    #[test]
    fn test_single_service_maps_to_workload_and_endpoint() {
        let manifests = map_project(&web_project()).unwrap();
        assert_eq!(manifests.len(), 2);

        let expected = BTreeMap::from([
            ("project".to_string(), "web".to_string()),
            ("service".to_string(), "api".to_string()),
        ]);
        for kind in ["Deployment", "Service"] {
            assert_eq!(find(&manifests, kind, "api").labels(), &expected);
        }

        let Manifest::Service(svc) = find(&manifests, "Service", "api") else {
            unreachable!()
        };
        assert_eq!(svc.spec.selector, expected);
        assert_eq!(svc.spec.service_type, "ClusterIP");
        assert_eq!(svc.spec.ports[0].port, 80);
    }

    #[test]
    fn test_replicas_choose_controller_strategy() {
        let mut project = web_project();
        project.services.get_mut("api").unwrap().deploy = Some(DeployConfig {
            replicas: Some(3),
            ..Default::default()
        });
        let manifests = map_project(&project).unwrap();
        let Manifest::Deployment(dep) = find(&manifests, "Deployment", "api") else {
            unreachable!()
        };
        assert_eq!(dep.spec.replicas, 3);
        assert_eq!(dep.spec.strategy.strategy_type, "RollingUpdate");

        let manifests = map_project(&web_project()).unwrap();
        let Manifest::Deployment(dep) = find(&manifests, "Deployment", "api") else {
            unreachable!()
        };
        assert_eq!(dep.spec.replicas, 1);
        assert_eq!(dep.spec.strategy.strategy_type, "Recreate");
    }

    #[test]
    fn test_global_mode_maps_to_daemonset() {
        let mut project = web_project();
        project.services.get_mut("api").unwrap().deploy = Some(DeployConfig {
            mode: Some("global".to_string()),
            ..Default::default()
        });
        let manifests = map_project(&project).unwrap();
        find(&manifests, "DaemonSet", "api");
    }

    #[test]
    fn test_volume_claims_use_normalized_names() {
        let mut project = web_project().with_volume("data_store", VolumeConfig::default());
        project.services.get_mut("api").unwrap().volumes =
            Some(vec![ComposeMount::Short("data_store:/var/lib/data:ro".to_string())]);
        normalize_volume_names(&mut project);

        let manifests = map_project(&project).unwrap();
        find(&manifests, "PersistentVolumeClaim", "data-store");

        let Manifest::Deployment(dep) = find(&manifests, "Deployment", "api") else {
            unreachable!()
        };
        let pod = &dep.spec.template.spec;
        assert_eq!(
            pod.volumes[0].persistent_volume_claim.as_ref().unwrap().claim_name,
            "data-store"
        );
        assert_eq!(pod.containers[0].volume_mounts[0].read_only, Some(true));
    }

    #[test]
    fn test_unnormalized_volume_is_rejected() {
        let project = web_project().with_volume("data_store", VolumeConfig::default());
        assert!(matches!(
            map_project(&project),
            Err(ChartError::Naming { .. })
        ));
    }

    #[test]
    fn test_undeclared_references_fail() {
        let mut project = web_project();
        project.services.get_mut("api").unwrap().volumes =
            Some(vec![ComposeMount::Short("missing:/data".to_string())]);
        assert!(matches!(map_project(&project), Err(ChartError::Validation(_))));

        let mut project = web_project();
        project.services.get_mut("api").unwrap().secrets =
            Some(vec![FileRef::Short("token".to_string())]);
        assert!(matches!(map_project(&project), Err(ChartError::Validation(_))));
    }

    #[test]
    fn test_bind_mounts_are_unsupported() {
        let mut project = web_project();
        project.services.get_mut("api").unwrap().volumes =
            Some(vec![ComposeMount::Short("./src:/app".to_string())]);
        assert!(matches!(map_project(&project), Err(ChartError::Validation(_))));
    }

    #[test]
    fn test_service_name_collision() {
        let project = web_project()
            .with_service("my_app", ServiceConfig::with_image("a"))
            .with_service("my-app", ServiceConfig::with_image("b"));
        assert!(matches!(
            map_project(&project),
            Err(ChartError::Naming { .. })
        ));
    }

    #[test]
    fn test_unsupported_driver_option() {
        let mut opts = BTreeMap::new();
        opts.insert("type".to_string(), "nfs".to_string());
        let project = web_project().with_volume(
            "data",
            VolumeConfig {
                driver_opts: Some(opts),
                ..Default::default()
            },
        );
        assert!(matches!(map_project(&project), Err(ChartError::Validation(_))));
    }

    #[test]
    fn test_configs_and_secrets_are_mounted() {
        let mut project = web_project()
            .with_config(
                "nginx_conf",
                ConfigConfig {
                    content: Some("server {}".to_string()),
                    ..Default::default()
                },
            )
            .with_secret(
                "token",
                SecretConfig {
                    content: Some("hunter2".to_string()),
                    ..Default::default()
                },
            );
        let api = project.services.get_mut("api").unwrap();
        api.configs = Some(vec![FileRef::Long(FileRefLong {
            source: "nginx_conf".to_string(),
            target: Some("/etc/nginx/nginx.conf".to_string()),
            mode: None,
        })]);
        api.secrets = Some(vec![FileRef::Short("token".to_string())]);

        let manifests = map_project(&project).unwrap();
        let Manifest::ConfigMap(cm) = find(&manifests, "ConfigMap", "nginx-conf") else {
            unreachable!()
        };
        assert_eq!(cm.data["nginx_conf"], "server {}");

        let Manifest::Secret(secret) = find(&manifests, "Secret", "token") else {
            unreachable!()
        };
        assert_eq!(secret.data["token"], "aHVudGVyMg==");

        let Manifest::Deployment(dep) = find(&manifests, "Deployment", "api") else {
            unreachable!()
        };
        let mounts = &dep.spec.template.spec.containers[0].volume_mounts;
        assert_eq!(mounts[0].mount_path, "/etc/nginx/nginx.conf");
        assert_eq!(mounts[0].sub_path.as_deref(), Some("nginx_conf"));
        assert_eq!(mounts[1].mount_path, "/run/secrets/token");
    }

    #[test]
    fn test_container_details() {
        let mut project = web_project();
        let api = project.services.get_mut("api").unwrap();
        api.command = Some(CommandConfig::Shell("serve --port 80".to_string()));
        api.environment = Some(EnvironmentConfig::Array(vec![
            "B=2".to_string(),
            "A=1".to_string(),
        ]));
        api.user = Some("1000:1000".to_string());
        api.deploy = Some(DeployConfig {
            resources: Some(ResourcesConfig {
                limits: Some(ResourceSpec {
                    cpus: Some(crate::compose::config::CpuCount::Text("0.5".to_string())),
                    memory: Some("256m".to_string()),
                }),
                reservations: None,
            }),
            ..Default::default()
        });
        api.healthcheck = Some(HealthcheckConfig {
            test: Some(HealthcheckTest::Array(vec![
                "CMD".to_string(),
                "curl".to_string(),
                "-f".to_string(),
                "http://localhost".to_string(),
            ])),
            interval: Some("30s".to_string()),
            retries: Some(3),
            ..Default::default()
        });

        let manifests = map_project(&project).unwrap();
        let Manifest::Deployment(dep) = find(&manifests, "Deployment", "api") else {
            unreachable!()
        };
        let c = &dep.spec.template.spec.containers[0];
        assert_eq!(c.args, vec!["serve", "--port", "80"]);
        assert_eq!(c.env[0].name, "A");
        assert_eq!(c.security_context.as_ref().unwrap().run_as_user, Some(1000));
        let limits = &c.resources.as_ref().unwrap().limits;
        assert_eq!(limits["cpu"], "500m");
        assert_eq!(limits["memory"], "256Mi");
        let probe = c.liveness_probe.as_ref().unwrap();
        assert_eq!(probe.exec.command[0], "curl");
        assert_eq!(probe.period_seconds, Some(30));
        assert_eq!(probe.failure_threshold, Some(3));
    }

    #[test]
    fn test_restart_no_is_rejected() {
        let mut project = web_project();
        project.services.get_mut("api").unwrap().restart = Some("no".to_string());
        assert!(matches!(map_project(&project), Err(ChartError::Validation(_))));
    }

    #[test]
    fn test_output_is_sorted() {
        let project = web_project()
            .with_service("db", ServiceConfig::with_image("postgres"))
            .with_volume("zdata", VolumeConfig::default());
        let manifests = map_project(&project).unwrap();
        let keys: Vec<_> = manifests.iter().map(|m| m.sort_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    fn with_content(content: &str) -> ConfigConfig {
        ConfigConfig {
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_and_secret_name_collisions() {
        let project = web_project()
            .with_config("app_conf", with_content("a"))
            .with_config("app-conf", with_content("b"));
        assert!(matches!(map_project(&project), Err(ChartError::Naming { .. })));

        let secret = |c: &str| SecretConfig {
            content: Some(c.to_string()),
            ..Default::default()
        };
        let project = web_project()
            .with_secret("db.password", secret("a"))
            .with_secret("db-password", secret("b"));
        assert!(matches!(map_project(&project), Err(ChartError::Naming { .. })));
    }

    #[test]
    fn test_invalid_project_name() {
        let mut project = web_project();
        project.name = "web!".to_string();
        assert!(matches!(map_project(&project), Err(ChartError::Naming { .. })));
    }

    #[test]
    fn test_non_local_volume_driver() {
        let project = web_project().with_volume(
            "data",
            VolumeConfig {
                driver: Some("nfs".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(map_project(&project), Err(ChartError::Validation(_))));
    }

    #[test]
    fn test_network_driver_options() {
        let mut project = web_project();
        project.networks.insert(
            "backend".to_string(),
            NetworkConfig {
                driver_opts: Some(BTreeMap::from([("mtu".to_string(), "1400".to_string())])),
                ..Default::default()
            },
        );
        assert!(matches!(map_project(&project), Err(ChartError::Validation(_))));
    }

    #[test]
    fn test_undeclared_network() {
        let mut project = web_project();
        project.services.get_mut("api").unwrap().networks =
            Some(NetworksConfig::Array(vec!["backend".to_string()]));
        assert!(matches!(map_project(&project), Err(ChartError::Validation(_))));

        project.services.get_mut("api").unwrap().networks =
            Some(NetworksConfig::Array(vec!["default".to_string()]));
        assert!(map_project(&project).is_ok());

        project.services.get_mut("api").unwrap().networks =
            Some(NetworksConfig::Array(vec!["backend".to_string()]));
        project
            .networks
            .insert("backend".to_string(), NetworkConfig::default());
        assert!(map_project(&project).is_ok());
    }

    #[test]
    fn test_unsupported_deploy_mode() {
        let mut project = web_project();
        project.services.get_mut("api").unwrap().deploy = Some(DeployConfig {
            mode: Some("replicated-job".to_string()),
            ..Default::default()
        });
        assert!(matches!(map_project(&project), Err(ChartError::Validation(_))));
    }

    #[test]
    fn test_external_resources_are_referenced_not_created() {
        let mut project = web_project()
            .with_volume(
                "shared",
                VolumeConfig {
                    external: Some(ExternalConfig::Named {
                        name: "team-data".to_string(),
                    }),
                    ..Default::default()
                },
            )
            .with_config(
                "settings",
                ConfigConfig {
                    external: Some(ExternalConfig::Bool(true)),
                    ..Default::default()
                },
            );
        let api = project.services.get_mut("api").unwrap();
        api.volumes = Some(vec![ComposeMount::Short("shared:/data".to_string())]);
        api.configs = Some(vec![FileRef::Short("settings".to_string())]);

        let manifests = map_project(&project).unwrap();
        assert!(!manifests
            .iter()
            .any(|m| matches!(m.kind(), "PersistentVolumeClaim" | "ConfigMap")));

        let Manifest::Deployment(dep) = find(&manifests, "Deployment", "api") else {
            unreachable!()
        };
        let pod = &dep.spec.template.spec;
        let claim = pod.volumes.iter().find_map(|v| v.persistent_volume_claim.as_ref());
        assert_eq!(claim.unwrap().claim_name, "team-data");
        let config = pod.volumes.iter().find_map(|v| v.config_map.as_ref());
        assert_eq!(config.unwrap().name, "settings");
    }

    #[test]
    fn test_long_config_name_overflows_pod_volume() {
        let name = "a".repeat(60);
        let mut project = web_project().with_config(&name, with_content("x"));
        project.services.get_mut("api").unwrap().configs =
            Some(vec![FileRef::Short(name.clone())]);
        assert!(matches!(map_project(&project), Err(ChartError::Naming { .. })));
    }

    #[test]
    fn test_relative_config_target_is_rooted() {
        let mut project = web_project().with_config("app", with_content("x"));
        project.services.get_mut("api").unwrap().configs = Some(vec![FileRef::Long(FileRefLong {
            source: "app".to_string(),
            target: Some("etc/app.conf".to_string()),
            mode: None,
        })]);

        let manifests = map_project(&project).unwrap();
        let Manifest::Deployment(dep) = find(&manifests, "Deployment", "api") else {
            unreachable!()
        };
        let mounts = &dep.spec.template.spec.containers[0].volume_mounts;
        assert_eq!(mounts[0].mount_path, "/etc/app.conf");
    }
}
