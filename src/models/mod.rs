//! Entities the core consumes and produces

pub mod deployment;
pub mod domain;
pub mod job;
pub mod service;

pub use deployment::{Deployment, DeploymentStatus};
pub use domain::Domain;
pub use job::{DeploymentJob, HealthCheckParams, RollbackJob};
pub use service::{Service, ServiceStatus};
