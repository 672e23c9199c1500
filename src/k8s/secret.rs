//! TLS material stored in Secrets

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;

use super::KubeCluster;
use crate::error::{kube_code, Error, Result};

/// PEM-encoded certificate, chain and key of a `kubernetes.io/tls` Secret
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TlsSecret {
    pub name: String,
    pub certificate: String,
    pub key: Option<String>,
    pub ca: Option<String>,
}

impl TlsSecret {
    /// Read the secret from the cluster project
    pub async fn fetch(cluster: &KubeCluster, name: &str) -> Result<Self> {
        let api: Api<Secret> = cluster.namespaced_api();
        let secret = api.get(name).await.map_err(|e| match kube_code(&e) {
            Some(404) => Error::NotFound {
                kind: "Secret".to_string(),
                name: name.to_string(),
            },
            _ => Error::Api(e),
        })?;
        Self::from_secret(&secret)
    }

    pub fn from_secret(secret: &Secret) -> Result<Self> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        let data = secret.data.clone().unwrap_or_default();

        let read = |key: &str| -> Option<String> {
            data.get(key)
                .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
        };

        let certificate = read("tls.crt")
            .ok_or_else(|| Error::Config(format!("secret {name} has no tls.crt")))?;

        Ok(Self {
            certificate,
            key: read("tls.key"),
            ca: read("ca.crt"),
            name,
        })
    }

    /// Certificate to trust when verifying a server using this secret
    ///
    /// The CA when the secret carries one, otherwise the certificate itself.
    pub fn verification_material(&self) -> &str {
        self.ca.as_deref().unwrap_or(&self.certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::{finish, mock_cluster, status_failure, Exchange};
    use serde_json::json;

    const PATH: &str = "/api/v1/namespaces/default/secrets";

    #[tokio::test]
    async fn test_fetch_decodes_material() {
        let (cluster, server) = mock_cluster();
        // "cert" and "ca" base64 encoded
        let server = server.run(vec![Exchange::get(format!("{PATH}/gw-tls")).ok(json!({
            "apiVersion": "v1", "kind": "Secret",
            "metadata": {"name": "gw-tls", "namespace": "default"},
            "type": "kubernetes.io/tls",
            "data": {"tls.crt": "Y2VydA==", "ca.crt": "Y2E="}
        }))]);

        let secret = TlsSecret::fetch(&cluster, "gw-tls").await.unwrap();
        assert_eq!(secret.certificate, "cert");
        assert_eq!(secret.verification_material(), "ca");
        assert_eq!(secret.key, None);
        finish(server).await;
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let (cluster, server) = mock_cluster();
        let server = server.run(vec![Exchange::get(format!("{PATH}/gw-tls"))
            .respond(404, status_failure(404, "NotFound"))]);

        let err = TlsSecret::fetch(&cluster, "gw-tls").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        finish(server).await;
    }

    #[test]
    fn test_certificate_without_ca_verifies_itself() {
        let secret = TlsSecret {
            name: "s".to_string(),
            certificate: "cert".to_string(),
            ..Default::default()
        };
        assert_eq!(secret.verification_material(), "cert");
    }
}
