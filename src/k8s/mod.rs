//! Kubernetes API client module
//!
//! Resource model and lifecycle for everything the suite creates in a cluster.

mod client;
mod condition;
mod deployment;
mod openshift;
mod reference;
mod resource;
mod secret;
mod service;
mod wait;

#[cfg(test)]
pub mod testing;

pub use client::KubeCluster;
pub use condition::{check_condition, has_condition, Condition, ConditionCheck, HasConditions};
pub use deployment::{ContainerResources, Deployment, DeploymentOptions};
pub use openshift::{OpenShiftRoute, Route, RouteSpec, Termination};
pub use reference::{Referencable, Reference};
pub use resource::{ClusterResource, KubeObject, ObjectHandle, FIELD_MANAGER};
pub use secret::TlsSecret;
pub use service::{Service, ServicePort, ServiceType};
pub use wait::{poll_until, WaitOptions};
