//! Kubernetes object mapping
//!
//! Turns a normalized Compose project into workload controllers, services,
//! volume claims, config maps and secrets.

pub mod convert;
pub mod mapper;
pub mod objects;

pub use mapper::map_project;
pub use objects::{Manifest, LABEL_PROJECT, LABEL_SERVICE};
