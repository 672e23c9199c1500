//! Scenario topology: backend, gateway, hostname, route and policies
//!
//! Every fixture is committed in dependency order and registers its cleanup
//! before it is committed, so a half created object is still removed.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{Blame, Finalizers};
use crate::backend::{Backend, Httpbin, MockserverBackend};
use crate::config::Settings;
use crate::error::Error;
use crate::gateway::{ExposedHostname, Exposer, Gateway, Hostname, HttpRoute, KuadrantGateway};
use crate::k8s::{ClusterResource, HasConditions, KubeCluster, WaitOptions};
use crate::oidc::Keycloak;
use crate::policy::{AuthorinoCr, AuthorinoOptions, KuadrantCr, Policy};

pub struct TestContext<'s> {
    settings: &'s Settings,
    cluster: KubeCluster,
    blame: Blame,
    kuadrant: Option<KuadrantCr>,
    enforce: bool,
    wait: WaitOptions,
    finalizers: Finalizers,
    exposer: Exposer,
    keycloak: Option<Keycloak>,
}

impl<'s> TestContext<'s> {
    /// `kuadrant` is `None` in standalone mode or when Kuadrant is not installed
    pub fn new(
        settings: &'s Settings,
        cluster: KubeCluster,
        blame: Blame,
        kuadrant: Option<KuadrantCr>,
    ) -> Self {
        let exposer = Exposer::new(settings.default_exposer, &cluster);
        Self {
            settings,
            wait: settings.wait_options(),
            cluster,
            blame,
            kuadrant,
            enforce: false,
            finalizers: Finalizers::new(),
            exposer,
            keycloak: None,
        }
    }

    /// Fail instead of skipping when optional configuration is missing
    pub fn enforce(mut self, enforce: bool) -> Self {
        self.enforce = enforce;
        self
    }

    pub fn wait_options(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn cluster(&self) -> &KubeCluster {
        &self.cluster
    }

    pub fn wait(&self) -> &WaitOptions {
        &self.wait
    }

    pub fn blame(&self, name: &str) -> String {
        self.blame.blame(name)
    }

    pub fn label(&self) -> &str {
        self.blame.label()
    }

    /// `app=<run label>`
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), self.label().to_string())])
    }

    pub fn finalizers(&mut self) -> &mut Finalizers {
        &mut self.finalizers
    }

    /// Skip the scenario, or fail it when running enforced
    pub fn skip_or_fail(&self, reason: impl Into<String>) -> anyhow::Error {
        let reason = reason.into();
        if self.enforce {
            anyhow::anyhow!("{reason}")
        } else {
            Error::skipped(reason).into()
        }
    }

    pub fn require_kuadrant(&self) -> Result<&KuadrantCr> {
        self.kuadrant
            .as_ref()
            .ok_or_else(|| self.skip_or_fail("Kuadrant is not available (standalone run or not installed)"))
    }

    /// Cluster bound to `service_protection.project2`
    pub async fn cluster2(&self) -> Result<KubeCluster> {
        let project = self
            .settings
            .service_protection
            .project2
            .as_deref()
            .ok_or_else(|| {
                self.skip_or_fail("Scenario requires service_protection.project2 but it is not set")
            })?;
        let cluster = self.cluster.change_project(project);
        if !cluster.connected().await {
            anyhow::bail!("Not logged into Kubernetes or project {project} does not exist");
        }
        Ok(cluster)
    }

    /// Deploy an Httpbin backend
    pub async fn backend(&mut self) -> Result<Httpbin> {
        let mut backend = Httpbin::new(
            &self.cluster,
            &self.blame("httpbin"),
            self.blame.label(),
            &self.settings.httpbin.image,
        );
        self.commit_backend(&mut backend).await?;
        Ok(backend)
    }

    /// Deploy a Mockserver backend, optionally behind its own load balancer
    pub async fn mockserver(&mut self, load_balanced: bool) -> Result<MockserverBackend> {
        let mut backend = MockserverBackend::new(
            &self.cluster,
            &self.blame("mockserver"),
            self.blame.label(),
            &self.settings.mockserver.image,
        );
        if load_balanced {
            backend = backend.load_balanced();
        }
        self.commit_backend(&mut backend).await?;
        Ok(backend)
    }

    async fn commit_backend<B: Backend>(&mut self, backend: &mut B) -> Result<()> {
        let committed = backend.commit(&self.wait).await;
        // handles() lists deletion order, the stack pops the last pushed first
        for handle in backend.handles().into_iter().rev() {
            self.finalizers.delete(handle);
        }
        committed.context("Backend did not become ready")?;
        Ok(())
    }

    /// Gateway serving every hostname under the exposer's base domain
    ///
    /// A TLS gateway is only programmed once its certificate exists, so the
    /// caller waits for it after providing one.
    pub async fn gateway(&mut self, tls: bool) -> Result<KuadrantGateway> {
        let base_domain = self
            .exposer
            .base_domain()
            .await
            .context("Unable to determine base domain")?;
        let mut gateway = KuadrantGateway::create_instance(
            &self.cluster,
            &self.blame("gw"),
            &format!("*.{base_domain}"),
            self.labels(),
            tls,
        );

        self.finalizers.delete(gateway.handle());
        gateway.commit().await?;
        if !tls {
            gateway.wait_for_ready(&self.wait).await?;
        }
        Ok(gateway)
    }

    /// Expose a fresh hostname through the configured exposer
    pub async fn hostname<G: Gateway>(&mut self, gateway: &mut G) -> Result<ExposedHostname> {
        let name = self.blame("hostname");
        let exposed = self.exposer.expose_hostname(&name, gateway, &self.wait).await;
        // exposed objects go before the gateway they point at
        for handle in self.exposer.take_created() {
            self.finalizers.delete(handle);
        }
        Ok(exposed?)
    }

    /// HTTPRoute sending everything for `hostname` to `backend`
    pub async fn route<G, H, B>(&mut self, gateway: &G, hostname: &H, backend: &B) -> Result<HttpRoute>
    where
        G: Gateway,
        H: Hostname,
        B: Backend,
    {
        let mut route = HttpRoute::create_instance(&self.cluster, &self.blame("route"), gateway, self.labels());
        route.add_hostname(&hostname.hostname()).await?;
        route.add_backend(backend, "/").await?;

        self.finalizers.delete(route.handle());
        route.commit().await?;
        Ok(route)
    }

    /// Commit a policy and wait until its kind reports it ready
    pub async fn commit_policy<K>(&mut self, policy: &mut Policy<K>) -> Result<()>
    where
        K: ClusterResource + HasConditions,
    {
        self.finalizers.delete(policy.handle());
        policy.commit().await?;
        policy
            .wait_for_ready(&self.wait)
            .await
            .with_context(|| format!("{} {} did not become ready", policy.kind(), policy.name()))?;
        Ok(())
    }

    /// Keycloak realm with a client and a test user, created once per context
    pub async fn keycloak(&mut self) -> Result<&Keycloak> {
        if self.keycloak.is_none() {
            let settings = self.settings;
            let config = &settings.keycloak;
            let (url, username, password) = config
                .admin()
                .ok_or_else(|| self.skip_or_fail("Keycloak is not configured"))?;

            let keycloak = Keycloak::connect(
                url,
                username,
                password,
                &self.blame("realm"),
                &self.blame("client"),
            )
            .await;
            let mut keycloak = match keycloak {
                Ok(keycloak) => keycloak.with_test_user(&config.test_user, &config.test_password),
                Err(e @ Error::DependencyUnavailable { .. }) => return Err(self.skip_or_fail(e.to_string())),
                Err(e) => return Err(e.into()),
            };

            let committed = keycloak.commit().await;
            // a half created realm is still deleted at teardown
            self.keycloak = Some(keycloak);
            committed.context("Unable to set up Keycloak realm")?;
        }

        self.keycloak
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Keycloak realm was not created"))
    }

    /// Authorino deployed by the operator, watching objects labeled for this run
    pub async fn authorino(&mut self, mut options: AuthorinoOptions) -> Result<AuthorinoCr> {
        if !self.settings.authorino.deploy {
            return Err(self.skip_or_fail("Custom Authorino deployments are disabled (authorino.deploy)"));
        }
        if options.image.is_none() {
            options.image = self.settings.authorino.image.clone();
        }
        options
            .label_selectors
            .push(format!("testRun={}", self.label()));

        let mut authorino = AuthorinoCr::create_instance(&self.cluster, &self.blame("authorino"), options);
        self.finalizers.delete(authorino.handle());
        authorino.commit().await?;
        authorino.wait_for_ready(&self.wait).await?;
        Ok(authorino)
    }

    /// Remove everything, newest first; returns the cleanups that failed
    pub async fn teardown(mut self) -> Vec<String> {
        let mut failed = self.finalizers.run().await;

        if let Err(e) = self.exposer.delete().await {
            warn!("Exposer cleanup failed: {}", e);
            failed.push(format!("exposer: {e}"));
        }
        if let Some(mut keycloak) = self.keycloak.take() {
            if let Err(e) = keycloak.delete().await {
                warn!("Keycloak cleanup failed: {}", e);
                failed.push(format!("keycloak realm {}: {e}", keycloak.realm_name()));
            }
        }

        if failed.is_empty() {
            info!("Teardown of run {} complete", self.blame.label());
        }
        failed
    }
}
