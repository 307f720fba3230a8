//! Error types for kompose-chart

use thiserror::Error;

/// Result type for chart operations
pub type Result<T> = std::result::Result<T, ChartError>;

/// Chart error types
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid {kind} name '{name}': {reason}")]
    Naming {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("Compose file parse error: {0}")]
    ComposeParse(String),

    #[error("IO error: {0}")]
    Serialization(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Release manager unreachable: {0}")]
    Transport(String),

    #[error("Release not found: {0}")]
    ReleaseNotFound(String),

    #[error("Release error: {0}")]
    Release(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("project {project}: {source}")]
    Project {
        project: String,
        #[source]
        source: Box<ChartError>,
    },
}

impl ChartError {
    /// Shorthand for a naming error
    pub fn naming(kind: &str, name: &str, reason: impl Into<String>) -> Self {
        ChartError::Naming {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach a project name for correlation. Already-attributed errors are
    /// returned as they are.
    pub fn for_project(self, project: &str) -> Self {
        match self {
            ChartError::Project { .. } => self,
            other => ChartError::Project {
                project: project.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any project attribution stripped
    pub fn root(&self) -> &ChartError {
        match self {
            ChartError::Project { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the release manager reported an unknown release
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), ChartError::ReleaseNotFound(_))
    }

    /// True for errors raised before any side effect (mapping and naming)
    pub fn is_validation(&self) -> bool {
        matches!(
            self.root(),
            ChartError::Validation(_) | ChartError::Naming { .. }
        )
    }
}
