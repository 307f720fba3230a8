//! Docker Compose project model and loader
//!
//! This module parses Compose files into a [`Project`] and normalizes the
//! names Kubernetes would reject.

pub mod config;
pub mod normalize;
pub mod parser;

pub use config::{ComposeConfig, Project, ServiceConfig, VolumeConfig};
pub use normalize::normalize_volume_names;
pub use parser::ComposeParser;
