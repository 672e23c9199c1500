//! Httpbin echo server

use tracing::info;

use super::{app_label, match_labels, service_url, Backend};
use crate::error::Result;
use crate::k8s::{
    Deployment, DeploymentOptions, KubeCluster, ObjectHandle, Referencable, Reference, Service,
    ServicePort, ServiceType, WaitOptions,
};

pub struct Httpbin {
    cluster: KubeCluster,
    name: String,
    label: String,
    image: String,
    deployment: Option<Deployment>,
    service: Option<Service>,
}

impl Httpbin {
    pub const PORT: u16 = 8080;

    pub fn new(cluster: &KubeCluster, name: &str, label: &str, image: &str) -> Self {
        Self {
            cluster: cluster.clone(),
            name: name.to_string(),
            label: label.to_string(),
            image: image.to_string(),
            deployment: None,
            service: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Referencable for Httpbin {
    fn reference(&self) -> Reference {
        Reference::service(&self.name, self.cluster.project(), Self::PORT)
    }
}

impl Backend for Httpbin {
    fn url(&self) -> String {
        service_url(&self.name, self.cluster.project())
    }

    async fn commit(&mut self, options: &WaitOptions) -> Result<()> {
        let selector = match_labels(&self.label, &self.name);

        let mut deployment = Deployment::create_instance(
            &self.cluster,
            &self.name,
            DeploymentOptions::new("httpbin", &self.image)
                .port("http", i32::from(Self::PORT))
                .selector(selector.clone())
                .labels(app_label(&self.label)),
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
            vec![ServicePort::named_target("http", i32::from(Self::PORT), "http")],
            app_label(&self.label),
            ServiceType::ClusterIP,
        );
        service.commit().await?;
        self.service = Some(service);

        info!("Httpbin {} is ready", self.name);
        Ok(())
    }

    async fn delete(&mut self) -> Result<()> {
        if let Some(mut service) = self.service.take() {
            service.delete(true).await?;
        }
        if let Some(mut deployment) = self.deployment.take() {
            deployment.delete(true).await?;
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::{finish, mock_cluster, status_failure, status_success, Exchange};
    use serde_json::json;
    use std::time::Duration;

    const DEPLOYMENTS: &str = "/apis/apps/v1/namespaces/default/deployments";
    const SERVICES: &str = "/api/v1/namespaces/default/services";

    fn deployment(ready: bool) -> serde_json::Value {
        let status = if ready {
            json!({"readyReplicas": 1, "conditions": [{"type": "Available", "status": "True"}]})
        } else {
            json!({})
        };
        json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "httpbin-x", "namespace": "default"},
            "spec": {"replicas": 1, "selector": {}, "template": {}},
            "status": status
        })
    }

    #[tokio::test]
    async fn test_reference_shape() {
        let (cluster, _server) = mock_cluster();
        let httpbin = Httpbin::new(&cluster, "httpbin-x", "run", "quay.io/httpbin");

        assert_eq!(
            serde_json::to_value(httpbin.reference()).unwrap(),
            json!({"group": "", "kind": "Service", "name": "httpbin-x", "namespace": "default", "port": 8080})
        );
        assert_eq!(httpbin.url(), "httpbin-x.default.svc.cluster.local");
        assert!(httpbin.handles().is_empty());
    }

    #[tokio::test]
    async fn test_commit_waits_then_delete_in_order() {
        let (cluster, server) = mock_cluster();
        let server = server.run(vec![
            Exchange::post(DEPLOYMENTS).ok(deployment(false)),
            Exchange::get(format!("{DEPLOYMENTS}/httpbin-x")).ok(deployment(false)),
            Exchange::get(format!("{DEPLOYMENTS}/httpbin-x")).ok(deployment(true)),
            Exchange::post(SERVICES).ok(json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "httpbin-x", "namespace": "default"}
            })),
            Exchange::delete(format!("{SERVICES}/httpbin-x")).ok(status_success()),
            Exchange::delete(format!("{DEPLOYMENTS}/httpbin-x"))
                .respond(404, status_failure(404, "NotFound")),
        ]);

        let mut httpbin = Httpbin::new(&cluster, "httpbin-x", "run", "quay.io/httpbin");
        let options = WaitOptions::new()
            .timeout(Duration::from_secs(5))
            .interval(Duration::from_millis(5));
        httpbin.commit(&options).await.unwrap();

        let kinds: Vec<String> = httpbin.handles().iter().map(|h| h.kind().to_string()).collect();
        assert_eq!(kinds, vec!["Service", "Deployment"]);

        httpbin.delete().await.unwrap();
        assert!(httpbin.handles().is_empty());

        let recorded = finish(server).await;
        assert_eq!(
            recorded[0].body["spec"]["template"]["spec"]["containers"][0]["image"],
            "quay.io/httpbin"
        );
        assert_eq!(recorded[3].body["spec"]["ports"][0]["port"], 8080);
    }
}
