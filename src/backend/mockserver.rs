//! Mockserver deployed as a backend

use tracing::info;

use super::{app_label, match_labels, service_url, Backend};
use crate::error::Result;
use crate::k8s::{
    ContainerResources, Deployment, DeploymentOptions, KubeCluster, ObjectHandle, Referencable,
    Reference, Service, ServicePort, ServiceType, WaitOptions,
};

pub struct MockserverBackend {
    cluster: KubeCluster,
    name: String,
    label: String,
    image: String,
    service_type: ServiceType,
    external_ip: Option<String>,
    deployment: Option<Deployment>,
    service: Option<Service>,
}

impl MockserverBackend {
    pub const PORT: u16 = 8080;
    /// Port the mockserver container listens on
    pub const API_PORT: i32 = 1080;

    pub fn new(cluster: &KubeCluster, name: &str, label: &str, image: &str) -> Self {
        Self {
            cluster: cluster.clone(),
            name: name.to_string(),
            label: label.to_string(),
            image: image.to_string(),
            service_type: ServiceType::ClusterIP,
            external_ip: None,
            deployment: None,
            service: None,
        }
    }

    /// Expose through a LoadBalancer Service reachable from outside the cluster
    pub fn load_balanced(mut self) -> Self {
        self.service_type = ServiceType::LoadBalancer;
        self
    }
}

impl Referencable for MockserverBackend {
    fn reference(&self) -> Reference {
        Reference::service(&self.name, self.cluster.project(), Self::PORT)
    }
}

impl Backend for MockserverBackend {
    /// External address for load balanced instances once committed
    fn url(&self) -> String {
        match &self.external_ip {
            Some(ip) => ip.clone(),
            None => service_url(&self.name, self.cluster.project()),
        }
    }

    async fn commit(&mut self, options: &WaitOptions) -> Result<()> {
        let selector = match_labels(&self.label, &self.name);

        let mut deployment = Deployment::create_instance(
            &self.cluster,
            &self.name,
            DeploymentOptions::new("mockserver", &self.image)
                .port("api", Self::API_PORT)
                .selector(selector.clone())
                .labels(app_label(&self.label))
                .resources(ContainerResources::limits_memory("2G"))
                .post_start(vec!["/bin/sh".to_string(), "init-mockserver".to_string()]),
        );
        deployment.commit().await?;
        self.deployment
            .insert(deployment)
            .wait_for_ready(options)
            .await?;

        let mut service = Service::create_instance(
            &self.cluster,
            &self.name,
            selector,
            vec![ServicePort::named_target(
                "1080-tcp",
                i32::from(Self::PORT),
                "api",
            )],
            app_label(&self.label),
            self.service_type,
        );
        service.commit().await?;
        let service = self.service.insert(service);

        if self.service_type == ServiceType::LoadBalancer {
            self.external_ip = Some(service.external_ip(options).await?);
        }

        info!("Mockserver {} is ready at {}", self.name, self.url());
        Ok(())
    }

    async fn delete(&mut self) -> Result<()> {
        if let Some(mut service) = self.service.take() {
            service.delete(true).await?;
        }
        if let Some(mut deployment) = self.deployment.take() {
            deployment.delete(true).await?;
        }
        self.external_ip = None;
        Ok(())
    }

    fn handles(&self) -> Vec<ObjectHandle> {
        let mut handles = Vec::new();
        if let Some(service) = &self.service {
            handles.push(service.handle());
        }
        if let Some(deployment) = &self.deployment {
            handles.push(deployment.handle());
        }
        handles
    }
}
