//! Deployment objects for backend test servers

use k8s_openapi::api::apps::v1::{Deployment as K8sDeployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, ExecAction, Lifecycle, LifecycleHandler, PodSpec,
    PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use super::condition::{has_condition, Condition, HasConditions};
use super::{KubeCluster, KubeObject, WaitOptions};
use crate::error::Result;

/// Resource limits and requests of the single container
#[derive(Clone, Debug, Default)]
pub struct ContainerResources {
    pub limits_cpu: Option<String>,
    pub limits_memory: Option<String>,
    pub requests_cpu: Option<String>,
    pub requests_memory: Option<String>,
}

impl ContainerResources {
    pub fn limits_memory(memory: impl Into<String>) -> Self {
        Self {
            limits_memory: Some(memory.into()),
            ..Default::default()
        }
    }

    fn to_requirements(&self) -> ResourceRequirements {
        fn section(cpu: &Option<String>, memory: &Option<String>) -> Option<BTreeMap<String, Quantity>> {
            let mut map = BTreeMap::new();
            if let Some(cpu) = cpu {
                map.insert("cpu".to_string(), Quantity(cpu.clone()));
            }
            if let Some(memory) = memory {
                map.insert("memory".to_string(), Quantity(memory.clone()));
            }
            (!map.is_empty()).then_some(map)
        }

        ResourceRequirements {
            limits: section(&self.limits_cpu, &self.limits_memory),
            requests: section(&self.requests_cpu, &self.requests_memory),
            ..Default::default()
        }
    }
}

/// Everything needed to build a single-container Deployment
#[derive(Clone, Debug)]
pub struct DeploymentOptions {
    pub container_name: String,
    pub image: String,
    pub ports: BTreeMap<String, i32>,
    pub selector: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub resources: Option<ContainerResources>,
    pub post_start: Option<Vec<String>>,
    pub replicas: i32,
}

impl DeploymentOptions {
    pub fn new(container_name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            image: image.into(),
            ports: BTreeMap::new(),
            selector: BTreeMap::new(),
            labels: BTreeMap::new(),
            resources: None,
            post_start: None,
            replicas: 1,
        }
    }

    pub fn port(mut self, name: impl Into<String>, port: i32) -> Self {
        self.ports.insert(name.into(), port);
        self
    }

    pub fn selector(mut self, selector: BTreeMap<String, String>) -> Self {
        self.selector = selector;
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn resources(mut self, resources: ContainerResources) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Command run by the postStart lifecycle hook
    pub fn post_start(mut self, command: Vec<String>) -> Self {
        self.post_start = Some(command);
        self
    }
}

/// Deployment with readiness helpers
pub struct Deployment {
    object: KubeObject<K8sDeployment>,
}

impl Deployment {
    pub fn create_instance(cluster: &KubeCluster, name: &str, options: DeploymentOptions) -> Self {
        let container = Container {
            name: options.container_name,
            image: Some(options.image),
            ports: (!options.ports.is_empty()).then(|| {
                options
                    .ports
                    .iter()
                    .map(|(name, port)| ContainerPort {
                        name: Some(name.clone()),
                        container_port: *port,
                        ..Default::default()
                    })
                    .collect()
            }),
            resources: options.resources.as_ref().map(ContainerResources::to_requirements),
            lifecycle: options.post_start.map(|command| Lifecycle {
                post_start: Some(LifecycleHandler {
                    exec: Some(ExecAction {
                        command: Some(command),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let mut pod_labels = options.labels.clone();
        pod_labels.extend(options.selector.clone());

        let deployment = K8sDeployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                labels: Some(options.labels),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(options.replicas),
                selector: LabelSelector {
                    match_labels: Some(options.selector),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        };

        Self {
            object: KubeObject::new(cluster, deployment),
        }
    }

    /// Wait until all replicas are available
    pub async fn wait_for_ready(&mut self, options: &WaitOptions) -> Result<()> {
        self.object
            .wait_until("available replicas", is_ready, options)
            .await
    }
}

fn is_ready(deployment: &K8sDeployment) -> bool {
    let Some(status) = &deployment.status else {
        return false;
    };
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);

    status.ready_replicas.unwrap_or(0) >= desired
        && has_condition("Available", "True").holds(deployment)
}

impl HasConditions for K8sDeployment {
    fn conditions(&self) -> Vec<Condition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .map(|conditions| {
                conditions
                    .iter()
                    .map(|c| Condition {
                        condition_type: c.type_.clone(),
                        status: c.status.clone(),
                        reason: c.reason.clone(),
                        message: c.message.clone(),
                        last_transition_time: None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Deref for Deployment {
    type Target = KubeObject<K8sDeployment>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl DerefMut for Deployment {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}
