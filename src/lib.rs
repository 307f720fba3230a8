//! kompose-chart - Docker Compose to Helm chart translation
//!
//! Turns a Compose project into Kubernetes objects, wraps them in a Helm
//! chart and manages the chart as a release:
//!
//! - Compose file loading, merging and interpolation
//! - Name normalization for the Kubernetes object model
//! - Object mapping (workloads, services, claims, config maps, secrets)
//! - Chart assembly, saving and packaging
//! - Release install, uninstall and listing through helm

pub mod chart;
pub mod compose;
pub mod error;
pub mod kube;
pub mod release;

pub use chart::{Chart, ChartAssembler};
pub use compose::Project;
pub use error::{ChartError, Result};
pub use release::{ReleaseDriver, ReleaseManager};
