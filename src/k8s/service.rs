//! Service objects in front of backend deployments

use k8s_openapi::api::core::v1::{Service as K8sService, ServicePort as K8sServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use super::{KubeCluster, KubeObject, WaitOptions};
use crate::error::{Error, Result};

/// Service type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    LoadBalancer,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

/// Port exposed by a Service
#[derive(Clone, Debug, PartialEq)]
pub struct ServicePort {
    pub name: String,
    pub port: i32,
    /// Container port, by number or by name
    pub target_port: IntOrString,
}

impl ServicePort {
    pub fn new(name: impl Into<String>, port: i32, target_port: i32) -> Self {
        Self {
            name: name.into(),
            port,
            target_port: IntOrString::Int(target_port),
        }
    }

    pub fn named_target(name: impl Into<String>, port: i32, target_port: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port,
            target_port: IntOrString::String(target_port.into()),
        }
    }
}

pub struct Service {
    object: KubeObject<K8sService>,
}

impl Service {
    pub fn create_instance(
        cluster: &KubeCluster,
        name: &str,
        selector: BTreeMap<String, String>,
        ports: Vec<ServicePort>,
        labels: BTreeMap<String, String>,
        service_type: ServiceType,
    ) -> Self {
        let service = K8sService {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(service_type.as_str().to_string()),
                selector: Some(selector),
                ports: Some(
                    ports
                        .into_iter()
                        .map(|p| K8sServicePort {
                            name: Some(p.name),
                            port: p.port,
                            target_port: Some(p.target_port),
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            status: None,
        };

        Self {
            object: KubeObject::new(cluster, service),
        }
    }

    /// Port number of the named service port
    pub fn port(&self, name: &str) -> Option<i32> {
        self.object
            .spec
            .as_ref()?
            .ports
            .as_ref()?
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .map(|p| p.port)
    }

    /// Wait for the load balancer to publish an address and return it
    pub async fn external_ip(&mut self, options: &WaitOptions) -> Result<String> {
        if let Some(address) = ingress_address(&self.object) {
            return Ok(address);
        }

        self.object
            .wait_until(
                "load balancer ingress",
                |svc| ingress_address(svc).is_some(),
                options,
            )
            .await?;

        ingress_address(&self.object).ok_or_else(|| Error::NotFound {
            kind: "LoadBalancer ingress".to_string(),
            name: self.object.name(),
        })
    }
}

fn ingress_address(service: &K8sService) -> Option<String> {
    let ingress = service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?;

    ingress.ip.clone().or_else(|| ingress.hostname.clone())
}

impl Deref for Service {
    type Target = KubeObject<K8sService>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl DerefMut for Service {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::{finish, mock_cluster, Exchange};
    use serde_json::json;
    use std::time::Duration;

    const PATH: &str = "/api/v1/namespaces/default/services";

    fn service(cluster: &KubeCluster, service_type: ServiceType) -> Service {
        Service::create_instance(
            cluster,
            "mockserver",
            BTreeMap::from([("app".to_string(), "mockserver".to_string())]),
            vec![ServicePort::named_target("http", 8080, "api")],
            BTreeMap::new(),
            service_type,
        )
    }

    #[tokio::test]
    async fn test_service_document() {
        let (cluster, _server) = mock_cluster();
        let svc = service(&cluster, ServiceType::LoadBalancer);
        let json = serde_json::to_value(&**svc).unwrap();

        assert_eq!(json["spec"]["type"], "LoadBalancer");
        assert_eq!(json["spec"]["ports"][0]["port"], 8080);
        assert_eq!(json["spec"]["ports"][0]["targetPort"], "api");
        assert_eq!(svc.port("http"), Some(8080));
        assert_eq!(svc.port("https"), None);
    }

    #[tokio::test]
    async fn test_external_ip_waits_for_ingress() {
        let (cluster, server) = mock_cluster();
        let pending = json!({
            "apiVersion": "v1", "kind": "Service",
            "metadata": {"name": "mockserver", "namespace": "default"},
            "status": {"loadBalancer": {}}
        });
        let published = json!({
            "apiVersion": "v1", "kind": "Service",
            "metadata": {"name": "mockserver", "namespace": "default"},
            "status": {"loadBalancer": {"ingress": [{"ip": "10.0.0.7"}]}}
        });
        let server = server.run(vec![
            Exchange::get(format!("{PATH}/mockserver")).ok(pending),
            Exchange::get(format!("{PATH}/mockserver")).ok(published),
        ]);

        let mut svc = service(&cluster, ServiceType::LoadBalancer);
        let options = WaitOptions::new()
            .timeout(Duration::from_secs(5))
            .interval(Duration::from_millis(5));
        assert_eq!(svc.external_ip(&options).await.unwrap(), "10.0.0.7");
        finish(server).await;
    }
}
