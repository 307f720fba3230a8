//! Release manager environment

use serde::{Deserialize, Serialize};

/// Namespace releases go to when nothing else is configured
pub const DEFAULT_NAMESPACE: &str = "default";
/// Helm binary looked up on `PATH` when `HELM_BIN` is unset
pub const DEFAULT_HELM_BIN: &str = "helm";

/// Connection settings for the release manager, read from the environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmSettings {
    /// Target namespace (`HELM_NAMESPACE`)
    pub namespace: String,
    /// Kubeconfig context (`HELM_KUBECONTEXT`)
    pub kube_context: Option<String>,
    /// Kubeconfig path (`KUBECONFIG`)
    pub kubeconfig: Option<String>,
    /// API server address (`HELM_KUBEAPISERVER`)
    pub kube_apiserver: Option<String>,
    /// Bearer token (`HELM_KUBETOKEN`)
    #[serde(skip_serializing)]
    pub kube_token: Option<String>,
    /// Helm executable (`HELM_BIN`)
    pub helm_bin: String,
}

impl Default for HelmSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            kube_context: None,
            kubeconfig: None,
            kube_apiserver: None,
            kube_token: None,
            helm_bin: DEFAULT_HELM_BIN.to_string(),
        }
    }
}

impl HelmSettings {
    /// Snapshot the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let defaults = Self::default();
        Self {
            namespace: get("HELM_NAMESPACE").unwrap_or(defaults.namespace),
            kube_context: get("HELM_KUBECONTEXT"),
            kubeconfig: get("KUBECONFIG"),
            kube_apiserver: get("HELM_KUBEAPISERVER"),
            kube_token: get("HELM_KUBETOKEN"),
            helm_bin: get("HELM_BIN").unwrap_or(defaults.helm_bin),
        }
    }

    /// Override the namespace
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Override the kubeconfig context
    pub fn with_kube_context(mut self, context: &str) -> Self {
        self.kube_context = Some(context.to_string());
        self
    }

    /// Global flags passed to every helm invocation
    pub fn global_args(&self) -> Vec<String> {
        let mut args = vec!["--namespace".to_string(), self.namespace.clone()];
        let optional = [
            ("--kube-context", &self.kube_context),
            ("--kubeconfig", &self.kubeconfig),
            ("--kube-apiserver", &self.kube_apiserver),
            ("--kube-token", &self.kube_token),
        ];
        for (flag, value) in optional {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        args
    }
}
