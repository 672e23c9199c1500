//! Resource lifecycle
//!
//! `KubeObject` wraps a typed document together with the cluster it belongs
//! to. It is built in memory, persisted with `commit`, kept in sync with
//! `refresh`/`modify`, polled with `wait_until` and removed with `delete`.

use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::ops::Deref;
use tracing::{debug, info};

use super::condition::{describe, ConditionCheck, HasConditions};
use super::wait::{poll_until, WaitOptions};
use super::KubeCluster;
use crate::error::{kube_code, Error, Result};

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "kuadrant-testsuite";

/// Read-modify-write cycles attempted before giving up on conflicts
const MODIFY_ATTEMPTS: u32 = 3;

/// Namespaced resource types the lifecycle controller can manage
pub trait ClusterResource:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> ClusterResource for T where
    T: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// A cluster object and its local document
pub struct KubeObject<K> {
    cluster: KubeCluster,
    inner: K,
    committed: bool,
}

impl<K: ClusterResource> KubeObject<K> {
    /// Build an object in memory; nothing is sent until `commit`
    pub fn new(cluster: &KubeCluster, mut inner: K) -> Self {
        if inner.meta().namespace.is_none() {
            inner.meta_mut().namespace = Some(cluster.project().to_string());
        }
        Self {
            cluster: cluster.clone(),
            inner,
            committed: false,
        }
    }

    pub fn name(&self) -> String {
        self.inner.meta().name.clone().unwrap_or_default()
    }

    pub fn namespace(&self) -> String {
        self.inner
            .meta()
            .namespace
            .clone()
            .unwrap_or_else(|| self.cluster.project().to_string())
    }

    pub fn kind(&self) -> String {
        K::kind(&()).to_string()
    }

    pub fn cluster(&self) -> &KubeCluster {
        &self.cluster
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Local document, for edits that are persisted later with `apply`
    pub fn object_mut(&mut self) -> &mut K {
        &mut self.inner
    }

    fn api(&self) -> Api<K> {
        Api::namespaced(self.cluster.client().clone(), &self.namespace())
    }

    fn describe_self(&self) -> String {
        format!("{} {}/{}", self.kind(), self.namespace(), self.name())
    }

    /// Create the object, replacing it when it already exists
    pub async fn commit(&mut self) -> Result<()> {
        let api = self.api();
        let name = self.name();

        match api.create(&PostParams::default(), &self.inner).await {
            Ok(created) => self.inner = created,
            Err(e) if kube_code(&e) == Some(409) => {
                debug!("{} already exists, replacing", self.describe_self());
                let live = api.get(&name).await?;
                let mut desired = self.inner.clone();
                desired.meta_mut().resource_version = live.meta().resource_version.clone();
                self.inner = api.replace(&name, &PostParams::default(), &desired).await?;
            }
            Err(e) => return Err(e.into()),
        }

        self.committed = true;
        info!("Committed {}", self.describe_self());
        Ok(())
    }

    /// Server-side apply of the local document
    pub async fn apply(&mut self) -> Result<()> {
        let mut desired = self.inner.clone();
        desired.meta_mut().managed_fields = None;
        desired.meta_mut().resource_version = None;

        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.inner = self
            .api()
            .patch(&self.name(), &params, &Patch::Apply(&desired))
            .await?;
        self.committed = true;
        info!("Applied {}", self.describe_self());
        Ok(())
    }

    /// Replace local state with what the cluster holds
    pub async fn refresh(&mut self) -> Result<&mut Self> {
        self.inner = self.api().get(&self.name()).await?;
        Ok(self)
    }

    /// Read-modify-write
    ///
    /// Uncommitted objects are only changed locally. Committed ones are
    /// refreshed, changed and replaced with the refreshed resourceVersion, so a
    /// concurrent writer causes a conflict instead of a lost update.
    pub async fn modify<F>(&mut self, mut change: F) -> Result<()>
    where
        F: FnMut(&mut K),
    {
        if !self.committed {
            change(&mut self.inner);
            return Ok(());
        }

        let api = self.api();
        let name = self.name();

        for attempt in 1..=MODIFY_ATTEMPTS {
            self.refresh().await?;
            change(&mut self.inner);

            match api.replace(&name, &PostParams::default(), &self.inner).await {
                Ok(updated) => {
                    self.inner = updated;
                    debug!("Modified {}", self.describe_self());
                    return Ok(());
                }
                Err(e) if kube_code(&e) == Some(409) => {
                    debug!(
                        "Conflict modifying {} (attempt {}/{})",
                        self.describe_self(),
                        attempt,
                        MODIFY_ATTEMPTS
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Conflict {
            kind: self.kind(),
            name,
            attempts: MODIFY_ATTEMPTS,
        })
    }

    /// Poll the live object until `ready` accepts it
    pub async fn wait_until<P>(&mut self, what: &str, ready: P, options: &WaitOptions) -> Result<()>
    where
        P: FnMut(&K) -> bool,
    {
        let api = self.api();
        let name = self.name();
        let description = format!("{} ({})", self.describe_self(), what);

        let fetch = || {
            let api = api.clone();
            let name = name.clone();
            async move { api.get(&name).await.map_err(Error::from) }
        };

        self.inner = poll_until(&description, options, fetch, ready, status_of).await?;
        Ok(())
    }

    /// Delete the object; a missing object is fine when `ignore_not_found`
    pub async fn delete(&mut self, ignore_not_found: bool) -> Result<()> {
        let api = self.api();
        delete_by_name(&api, &self.kind(), &self.name(), ignore_not_found).await?;
        self.committed = false;
        Ok(())
    }

    /// Identity of this object, detached from its document
    pub fn handle(&self) -> ObjectHandle {
        ObjectHandle {
            cluster: self.cluster.clone(),
            resource: ApiResource::erase::<K>(&()),
            name: self.name(),
            namespace: self.namespace(),
        }
    }
}

impl<K: ClusterResource + HasConditions> KubeObject<K> {
    /// Wait for a single status condition
    pub async fn wait_for_condition(
        &mut self,
        check: &ConditionCheck,
        options: &WaitOptions,
    ) -> Result<()> {
        let api = self.api();
        let name = self.name();
        let description = format!("{} ({})", self.describe_self(), check);

        let fetch = || {
            let api = api.clone();
            let name = name.clone();
            async move { api.get(&name).await.map_err(Error::from) }
        };

        self.inner = poll_until(
            &description,
            options,
            fetch,
            |obj: &K| check.holds(obj),
            |obj: &K| describe(&obj.conditions()),
        )
        .await?;
        Ok(())
    }
}

impl<K> Deref for KubeObject<K> {
    type Target = K;

    fn deref(&self) -> &K {
        &self.inner
    }
}

impl<K: HasConditions> HasConditions for KubeObject<K> {
    fn conditions(&self) -> Vec<super::Condition> {
        self.inner.conditions()
    }
}

/// Status block of any serializable object, for timeout messages
fn status_of<K: Serialize>(obj: &K) -> String {
    serde_json::to_value(obj)
        .ok()
        .and_then(|v| v.get("status").cloned())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "no status reported".to_string())
}

async fn delete_by_name<K>(api: &Api<K>, kind: &str, name: &str, ignore_not_found: bool) -> Result<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!("Deleted {} {}", kind, name);
            Ok(())
        }
        Err(e) if kube_code(&e) == Some(404) => {
            if ignore_not_found {
                debug!("{} {} already gone", kind, name);
                Ok(())
            } else {
                Err(Error::NotFound {
                    kind: kind.to_string(),
                    name: name.to_string(),
                })
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Name-based pointer able to delete the object it names
#[derive(Clone, Debug)]
pub struct ObjectHandle {
    cluster: KubeCluster,
    resource: ApiResource,
    name: String,
    namespace: String,
}

impl ObjectHandle {
    pub fn of<K: ClusterResource>(cluster: &KubeCluster, name: impl Into<String>) -> Self {
        Self {
            cluster: cluster.clone(),
            resource: ApiResource::erase::<K>(&()),
            name: name.into(),
            namespace: cluster.project().to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn delete(&self, ignore_not_found: bool) -> Result<()> {
        let api: Api<DynamicObject> = self.cluster.dynamic_api(&self.resource, &self.namespace);
        delete_by_name(&api, &self.resource.kind, &self.name, ignore_not_found).await
    }
}

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.resource.kind, self.namespace, self.name)
    }
}
