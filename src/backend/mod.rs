//! Backends deployed behind the gateway
//!
//! A backend is a Deployment plus a Service in front of it. Routes point at
//! the Service through `reference()`.

mod httpbin;
mod mockserver;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::k8s::{ObjectHandle, Referencable, WaitOptions};

pub use httpbin::Httpbin;
pub use mockserver::MockserverBackend;

/// Something that can serve traffic routed by the gateway
#[allow(async_fn_in_trait)]
pub trait Backend: Referencable {
    /// In-cluster address of the backend
    fn url(&self) -> String;

    /// Deploy and wait until the backend serves traffic
    async fn commit(&mut self, options: &WaitOptions) -> Result<()>;

    /// Remove the Service, then the Deployment
    async fn delete(&mut self) -> Result<()>;

    /// Identities of the created objects, in deletion order
    fn handles(&self) -> Vec<ObjectHandle>;
}

/// Selector shared by a backend's Deployment and Service
pub(crate) fn match_labels(label: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), label.to_string()),
        ("deployment".to_string(), name.to_string()),
    ])
}

pub(crate) fn app_label(label: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), label.to_string())])
}

pub(crate) fn service_url(name: &str, project: &str) -> String {
    format!("{name}.{project}.svc.cluster.local")
}
