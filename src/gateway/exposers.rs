//! Exposers make gateway hostnames reachable from the test machine

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tracing::{info, warn};

use super::{Gateway, Hostname};
use crate::error::Result;
use crate::http::KuadrantClient;
use crate::k8s::{KubeCluster, ObjectHandle, OpenShiftRoute, Termination, WaitOptions};

/// Which exposer a run uses
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExposerKind {
    #[default]
    OpenShift,
    LoadBalancer,
}

impl std::str::FromStr for ExposerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openshift" => Ok(ExposerKind::OpenShift),
            "loadbalancer" | "load_balancer" => Ok(ExposerKind::LoadBalancer),
            _ => Err(format!("Unknown exposer: {s}")),
        }
    }
}

/// Hostname behind a fixed address, verified with the gateway certificate
#[derive(Clone, Debug)]
pub struct StaticLocalHostname {
    hostname: String,
    address: String,
    verify: Option<String>,
    force_https: bool,
}

impl StaticLocalHostname {
    pub fn new(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            verify: None,
            force_https: false,
        }
    }

    pub fn verify(mut self, pem: Option<String>) -> Self {
        self.verify = pem;
        self
    }

    pub fn force_https(mut self, force: bool) -> Self {
        self.force_https = force;
        self
    }

    fn uses_https(&self) -> bool {
        self.verify.is_some() || self.force_https
    }
}

impl Hostname for StaticLocalHostname {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    /// Connects to the address while presenting the hostname as `Host` and SNI
    fn client(&self) -> anyhow::Result<KuadrantClient> {
        let (protocol, port) = if self.uses_https() {
            ("https", 443)
        } else {
            ("http", 80)
        };

        let mut builder = match self.address.parse::<IpAddr>() {
            Ok(ip) => KuadrantClient::builder(format!("{protocol}://{}", self.hostname))
                .resolve(self.hostname.clone(), SocketAddr::new(ip, port)),
            // Load balancers published by name cannot be pinned for SNI
            Err(_) => KuadrantClient::builder(format!("{protocol}://{}", self.address))
                .host(self.hostname.clone()),
        };

        builder = match &self.verify {
            Some(pem) => builder.root_ca(pem.clone()),
            None if self.force_https => builder.insecure(),
            None => builder,
        };
        builder.build()
    }
}

impl Hostname for OpenShiftRoute {
    fn hostname(&self) -> String {
        self.route_host().unwrap_or_default()
    }

    fn client(&self) -> anyhow::Result<KuadrantClient> {
        let hostname = self
            .route_host()
            .ok_or_else(|| anyhow::anyhow!("Route {} has no host yet", self.name()))?;

        let protocol = if self.is_tls() { "https" } else { "http" };
        KuadrantClient::builder(format!("{protocol}://{hostname}")).build()
    }
}

/// Hostname returned by an exposer
pub enum ExposedHostname {
    Route(OpenShiftRoute),
    Static(StaticLocalHostname),
}

impl Hostname for ExposedHostname {
    fn hostname(&self) -> String {
        match self {
            ExposedHostname::Route(route) => route.hostname(),
            ExposedHostname::Static(hostname) => hostname.hostname(),
        }
    }

    fn client(&self) -> anyhow::Result<KuadrantClient> {
        match self {
            ExposedHostname::Route(route) => route.client(),
            ExposedHostname::Static(hostname) => hostname.client(),
        }
    }
}

/// Exposes hostnames through OpenShift Route objects
pub struct OpenShiftExposer {
    cluster: KubeCluster,
    passthrough: bool,
    routes: Vec<ObjectHandle>,
}

/// Exposes hostnames through the gateway's LoadBalancer service
pub struct LoadBalancerServiceExposer {
    passthrough: bool,
}

impl LoadBalancerServiceExposer {
    pub const BASE_DOMAIN: &'static str = "test.com";
}

pub enum Exposer {
    OpenShift(OpenShiftExposer),
    LoadBalancer(LoadBalancerServiceExposer),
}

impl Exposer {
    pub fn new(kind: ExposerKind, cluster: &KubeCluster) -> Self {
        match kind {
            ExposerKind::OpenShift => Exposer::OpenShift(OpenShiftExposer {
                cluster: cluster.clone(),
                passthrough: false,
                routes: Vec::new(),
            }),
            ExposerKind::LoadBalancer => {
                Exposer::LoadBalancer(LoadBalancerServiceExposer { passthrough: false })
            }
        }
    }

    /// Let TLS through to the gateway instead of terminating it at the edge
    pub fn passthrough(mut self, passthrough: bool) -> Self {
        match &mut self {
            Exposer::OpenShift(exposer) => exposer.passthrough = passthrough,
            Exposer::LoadBalancer(exposer) => exposer.passthrough = passthrough,
        }
        self
    }

    /// Domain exposed hostnames live under
    pub async fn base_domain(&self) -> Result<String> {
        match self {
            Exposer::OpenShift(exposer) => exposer.cluster.apps_url().await,
            Exposer::LoadBalancer(_) => Ok(LoadBalancerServiceExposer::BASE_DOMAIN.to_string()),
        }
    }

    pub async fn expose_hostname<G: Gateway>(
        &mut self,
        name: &str,
        gateway: &mut G,
        options: &WaitOptions,
    ) -> Result<ExposedHostname> {
        match self {
            Exposer::OpenShift(exposer) => {
                let termination = if exposer.passthrough {
                    Termination::Passthrough
                } else {
                    Termination::Edge
                };
                let mut route = OpenShiftRoute::create_instance(
                    &exposer.cluster,
                    name,
                    &gateway.service_name(),
                    "api",
                    exposer.passthrough,
                    termination,
                );
                exposer.routes.push(route.handle());
                route.commit().await?;
                info!("Exposed {} through route {}", route.hostname(), name);
                Ok(ExposedHostname::Route(route))
            }
            Exposer::LoadBalancer(exposer) => {
                let hostname = format!("{name}.{}", LoadBalancerServiceExposer::BASE_DOMAIN);
                let address = gateway.external_ip(options).await?;
                let verify = gateway
                    .get_tls_cert(&hostname)
                    .await?
                    .map(|secret| secret.verification_material().to_string());
                info!("Exposed {} at {}", hostname, address);
                Ok(ExposedHostname::Static(
                    StaticLocalHostname::new(hostname, address)
                        .verify(verify)
                        .force_https(exposer.passthrough),
                ))
            }
        }
    }

    /// Nothing to provision up front for either exposer
    pub async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Hand over the objects created so far; the caller becomes responsible for deleting them
    pub fn take_created(&mut self) -> Vec<ObjectHandle> {
        match self {
            Exposer::OpenShift(exposer) => std::mem::take(&mut exposer.routes),
            Exposer::LoadBalancer(_) => Vec::new(),
        }
    }

    /// Remove everything this exposer created
    pub async fn delete(&mut self) -> Result<()> {
        if let Exposer::OpenShift(exposer) = self {
            for route in exposer.routes.drain(..) {
                if let Err(e) = route.delete(true).await {
                    warn!("Failed to delete {}: {}", route, e);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::KuadrantGateway;
    use crate::k8s::testing::{finish, mock_cluster, status_success, Exchange};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_exposer_kind_parsing() {
        assert_eq!("openshift".parse::<ExposerKind>(), Ok(ExposerKind::OpenShift));
        assert_eq!("LoadBalancer".parse::<ExposerKind>(), Ok(ExposerKind::LoadBalancer));
        assert!("ingress".parse::<ExposerKind>().is_err());
    }

    #[test]
    fn test_static_hostname_client() {
        let plain = StaticLocalHostname::new("app.test.com", "192.0.2.10");
        assert_eq!(plain.client().unwrap().base_url(), "http://app.test.com");

        let forced = StaticLocalHostname::new("app.test.com", "192.0.2.10").force_https(true);
        assert_eq!(forced.client().unwrap().base_url(), "https://app.test.com");

        let named = StaticLocalHostname::new("app.test.com", "lb.example.net");
        assert_eq!(named.client().unwrap().base_url(), "http://lb.example.net");
        assert_eq!(named.hostname(), "app.test.com");
    }

    #[tokio::test]
    async fn test_load_balancer_exposer_uses_gateway_address() {
        let (cluster, server) = mock_cluster();
        let server = server.run(vec![Exchange::get(
            "/apis/gateway.networking.k8s.io/v1/namespaces/default/gateways/gw",
        )
        .ok(json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "Gateway",
            "metadata": {"name": "gw", "namespace": "default"},
            "spec": {"gatewayClassName": "istio", "listeners": []},
            "status": {"addresses": [{"type": "IPAddress", "value": "192.0.2.10"}]}
        }))]);

        let mut gateway =
            KuadrantGateway::create_instance(&cluster, "gw", "*.test.com", BTreeMap::new(), false);
        let mut exposer = Exposer::new(ExposerKind::LoadBalancer, &cluster);
        let options = WaitOptions::new().interval(std::time::Duration::from_millis(5));

        let hostname = exposer
            .expose_hostname("hostname-x", &mut gateway, &options)
            .await
            .unwrap();
        assert_eq!(hostname.hostname(), "hostname-x.test.com");
        assert_eq!(exposer.base_domain().await.unwrap(), "test.com");
        finish(server).await;
    }

    #[tokio::test]
    async fn test_openshift_exposer_creates_and_deletes_routes() {
        let (cluster, server) = mock_cluster();
        let path = "/apis/route.openshift.io/v1/namespaces/default/routes";
        let server = server.run(vec![
            Exchange::post(path).ok(json!({
                "apiVersion": "route.openshift.io/v1",
                "kind": "Route",
                "metadata": {"name": "hostname-x", "namespace": "default"},
                "spec": {
                    "host": "hostname-x-default.apps.example.com",
                    "to": {"kind": "Service", "name": "gw-istio"},
                    "tls": {"termination": "passthrough"}
                }
            })),
            Exchange::delete(format!("{path}/hostname-x")).ok(status_success()),
        ]);

        let mut gateway =
            KuadrantGateway::create_instance(&cluster, "gw", "*.example.com", BTreeMap::new(), true);
        let mut exposer = Exposer::new(ExposerKind::OpenShift, &cluster).passthrough(true);
        exposer.commit().await.unwrap();

        let hostname = exposer
            .expose_hostname("hostname-x", &mut gateway, &WaitOptions::new())
            .await
            .unwrap();
        assert_eq!(hostname.hostname(), "hostname-x-default.apps.example.com");
        assert_eq!(
            hostname.client().unwrap().base_url(),
            "https://hostname-x-default.apps.example.com"
        );

        let recorded = {
            exposer.delete().await.unwrap();
            finish(server).await
        };
        assert_eq!(recorded[0].body["spec"]["tls"]["termination"], "passthrough");
        assert_eq!(recorded[0].body["spec"]["to"]["name"], "gw-istio");
    }

    #[tokio::test]
    async fn test_taken_routes_are_left_to_the_caller() {
        let (cluster, server) = mock_cluster();
        let path = "/apis/route.openshift.io/v1/namespaces/default/routes";
        let server = server.run(vec![Exchange::post(path).ok(json!({
            "apiVersion": "route.openshift.io/v1",
            "kind": "Route",
            "metadata": {"name": "hostname-y", "namespace": "default"},
            "spec": {"host": "hostname-y-default.apps.example.com", "to": {"kind": "Service", "name": "gw-istio"}}
        }))]);

        let mut gateway =
            KuadrantGateway::create_instance(&cluster, "gw", "*.example.com", BTreeMap::new(), false);
        let mut exposer = Exposer::new(ExposerKind::OpenShift, &cluster);
        let hostname = exposer
            .expose_hostname("hostname-y", &mut gateway, &WaitOptions::new())
            .await
            .unwrap();
        assert_eq!(
            hostname.client().unwrap().base_url(),
            "http://hostname-y-default.apps.example.com"
        );

        let taken = exposer.take_created();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].name(), "hostname-y");
        assert!(exposer.take_created().is_empty());

        // nothing left for the exposer itself to delete
        exposer.delete().await.unwrap();
        let recorded = finish(server).await;
        assert_eq!(recorded.len(), 1);
    }
}
