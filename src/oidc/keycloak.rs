//! Keycloak realm, client and test user managed through the admin REST API

use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use super::{OidcProvider, Token};
use crate::error::{Error, Result};

const ADMIN_CLIENT: &str = "admin-cli";
/// Renew the admin token this long before it expires
const RENEW_MARGIN: Duration = Duration::from_secs(10);
const ACCESS_TOKEN_LIFESPAN: u64 = 24 * 60 * 60;

/// Lifecycle of the realm owned by a `Keycloak`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeycloakState {
    Uninitialized,
    RealmCreated,
    Committed,
    Deleted,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug)]
struct AdminToken {
    token: String,
    expires_at: Instant,
}

impl AdminToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + RENEW_MARGIN < self.expires_at
    }
}

#[derive(Clone, Debug)]
struct RealmClient {
    client_id: String,
    secret: String,
}

/// Key entry of `GET /admin/realms/{realm}/keys`
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyMetadata {
    pub kid: String,
    pub provider_id: String,
    pub algorithm: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub status: String,
}

impl KeyMetadata {
    pub fn is_active_rs256_signing(&self) -> bool {
        self.key_use == "SIG" && self.algorithm == "RS256" && self.status == "ACTIVE"
    }
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    #[serde(default)]
    keys: Vec<KeyMetadata>,
}

/// Provider id of the first active RS256 signing key
fn active_rs256_provider(keys: &[KeyMetadata]) -> Option<&str> {
    keys.iter()
        .find(|key| key.is_active_rs256_signing())
        .map(|key| key.provider_id.as_str())
}

fn public_key_pem(key: &str) -> String {
    format!("-----BEGIN PUBLIC KEY-----\n{key}\n-----END PUBLIC KEY-----")
}

/// Older Keycloak and RHSSO serve everything under `auth/`
fn legacy_url(server_url: &Url) -> Url {
    let mut url = server_url.clone();
    url.set_path("auth/");
    url
}

/// Turn a non-success answer into `Error::Keycloak`
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Keycloak {
        status: status.as_u16(),
        body,
    })
}

/// OIDC provider backed by a dedicated Keycloak realm
pub struct Keycloak {
    http: Client,
    server_url: Url,
    username: String,
    password: String,
    realm_name: String,
    client_name: String,
    test_username: String,
    test_password: String,
    admin: Mutex<Option<AdminToken>>,
    state: KeycloakState,
    client: Option<RealmClient>,
    well_known: OnceCell<Value>,
}

impl Keycloak {
    /// Log into the master realm, retrying under `auth/` for older servers
    pub async fn connect(
        server_url: &str,
        username: &str,
        password: &str,
        realm_name: &str,
        client_name: &str,
    ) -> Result<Self> {
        let server_url = Url::parse(server_url)
            .map_err(|e| Error::Config(format!("invalid Keycloak url {server_url}: {e}")))?;
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let (server_url, admin) = match Self::login(&http, &server_url, username, password).await {
            Ok(admin) => (server_url, admin),
            Err(e) => {
                let legacy = legacy_url(&server_url);
                debug!("Keycloak login at {} failed ({}), trying {}", server_url, e, legacy);
                let admin = Self::login(&http, &legacy, username, password)
                    .await
                    .map_err(|e| Error::DependencyUnavailable {
                        dependency: "Keycloak".to_string(),
                        reason: e.to_string(),
                    })?;
                (legacy, admin)
            }
        };
        info!("Connected to Keycloak at {}", server_url);

        Ok(Self {
            http,
            server_url,
            username: username.to_string(),
            password: password.to_string(),
            realm_name: realm_name.to_string(),
            client_name: client_name.to_string(),
            test_username: "testUser".to_string(),
            test_password: "testPassword".to_string(),
            admin: Mutex::new(Some(admin)),
            state: KeycloakState::Uninitialized,
            client: None,
            well_known: OnceCell::new(),
        })
    }

    /// Credentials of the user created by `commit`
    pub fn with_test_user(mut self, username: &str, password: &str) -> Self {
        self.test_username = username.to_string();
        self.test_password = password.to_string();
        self
    }

    async fn login(http: &Client, server_url: &Url, username: &str, password: &str) -> Result<AdminToken> {
        let url = format!("{server_url}realms/master/protocol/openid-connect/token");
        let response = http
            .post(url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", ADMIN_CLIENT),
                ("username", username),
                ("password", password),
            ])
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;
        Ok(AdminToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    pub fn state(&self) -> KeycloakState {
        self.state
    }

    pub fn server_url(&self) -> &str {
        self.server_url.as_str()
    }

    pub fn realm_name(&self) -> &str {
        &self.realm_name
    }

    pub fn test_username(&self) -> &str {
        &self.test_username
    }

    /// Issuer an `AuthPolicy` validates tokens against
    pub fn issuer_url(&self) -> String {
        format!("{}realms/{}", self.server_url, self.realm_name)
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}admin/realms{}", self.server_url, path)
    }

    fn realm_url(&self, path: &str) -> String {
        format!("{}realms/{}{}", self.server_url, self.realm_name, path)
    }

    /// Current admin token, renewed when close to expiry
    async fn admin_token(&self) -> Result<String> {
        let mut admin = self.admin.lock().await;
        if let Some(token) = admin.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.token.clone());
        }
        debug!("Renewing Keycloak admin token");
        let token = Self::login(&self.http, &self.server_url, &self.username, &self.password).await?;
        let value = token.token.clone();
        *admin = Some(token);
        Ok(value)
    }

    async fn admin_get(&self, path: &str) -> Result<Value> {
        let token = self.admin_token().await?;
        let response = self.http.get(self.admin_url(path)).bearer_auth(token).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn admin_post(&self, path: &str, payload: &Value) -> Result<()> {
        let token = self.admin_token().await?;
        let response = self
            .http
            .post(self.admin_url(path))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn admin_delete(&self, path: &str) -> Result<()> {
        let token = self.admin_token().await?;
        let response = self.http.delete(self.admin_url(path)).bearer_auth(token).send().await?;
        check(response).await?;
        Ok(())
    }

    fn realm_client(&self) -> Result<&RealmClient> {
        match (&self.client, self.state) {
            (Some(client), KeycloakState::Committed) => Ok(client),
            _ => Err(Error::Config(format!(
                "Keycloak realm {} is not committed ({:?})",
                self.realm_name, self.state
            ))),
        }
    }

    fn require_realm(&self) -> Result<()> {
        match self.state {
            KeycloakState::RealmCreated | KeycloakState::Committed => Ok(()),
            state => Err(Error::Config(format!(
                "Keycloak realm {} does not exist ({state:?})",
                self.realm_name
            ))),
        }
    }

    /// Create the realm, a confidential client and the test user
    pub async fn commit(&mut self) -> Result<()> {
        let realm = self.realm_name.clone();
        self.admin_post(
            "",
            &json!({
                "realm": realm,
                "enabled": true,
                "sslRequired": "None",
                "accessTokenLifespan": ACCESS_TOKEN_LIFESPAN,
            }),
        )
        .await?;
        self.state = KeycloakState::RealmCreated;
        info!("Created Keycloak realm {}", realm);

        self.admin_post(
            &format!("/{realm}/clients"),
            &json!({
                "clientId": self.client_name,
                "directAccessGrantsEnabled": true,
                "publicClient": false,
                "protocol": "openid-connect",
                "standardFlowEnabled": false,
                "serviceAccountsEnabled": true,
                "authorizationServicesEnabled": true,
            }),
        )
        .await?;
        let clients = self
            .admin_get(&format!("/{realm}/clients?clientId={}", self.client_name))
            .await?;
        let internal_id = clients[0]["id"]
            .as_str()
            .ok_or_else(|| Error::Keycloak {
                status: 200,
                body: format!("client {} missing from {clients}", self.client_name),
            })?
            .to_string();
        let secret = self
            .admin_get(&format!("/{realm}/clients/{internal_id}/client-secret"))
            .await?;
        let secret = secret["value"].as_str().unwrap_or_default().to_string();
        self.client = Some(RealmClient {
            client_id: self.client_name.clone(),
            secret,
        });
        debug!("Created Keycloak client {} ({})", self.client_name, internal_id);

        self.admin_post(
            &format!("/{realm}/users"),
            &json!({
                "username": self.test_username,
                "enabled": true,
                "credentials": [{
                    "type": "password",
                    "value": self.test_password,
                    "temporary": false,
                }],
            }),
        )
        .await?;
        debug!("Created Keycloak user {}", self.test_username);

        self.state = KeycloakState::Committed;
        Ok(())
    }

    /// Remove the realm; a realm that was never created is left alone
    pub async fn delete(&mut self) -> Result<()> {
        match self.state {
            KeycloakState::RealmCreated | KeycloakState::Committed => {
                match self.admin_delete(&format!("/{}", self.realm_name)).await {
                    Ok(()) | Err(Error::Keycloak { status: 404, .. }) => {}
                    Err(e) => return Err(e),
                }
                info!("Deleted Keycloak realm {}", self.realm_name);
                self.state = KeycloakState::Deleted;
                self.client = None;
            }
            KeycloakState::Uninitialized | KeycloakState::Deleted => {
                debug!("Keycloak realm {} was not created, nothing to delete", self.realm_name);
            }
        }
        Ok(())
    }

    /// Realm public key in PEM form
    pub async fn get_public_key(&self) -> Result<String> {
        self.require_realm()?;
        let response = self.http.get(self.realm_url("")).send().await?;
        let realm: Value = check(response).await?.json().await?;
        let key = realm["public_key"].as_str().ok_or_else(|| Error::Keycloak {
            status: 200,
            body: format!("realm {} has no public_key", self.realm_name),
        })?;
        Ok(public_key_pem(key))
    }

    /// Password grant parameters usable as a URL query
    pub fn token_params(&self) -> Result<String> {
        let client = self.realm_client()?;
        Ok(form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "password")
            .append_pair("client_id", &client.client_id)
            .append_pair("client_secret", &client.secret)
            .append_pair("username", &self.test_username)
            .append_pair("password", &self.test_password)
            .finish())
    }

    pub async fn list_keys(&self) -> Result<Vec<KeyMetadata>> {
        self.require_realm()?;
        let keys = self.admin_get(&format!("/{}/keys", self.realm_name)).await?;
        let keys: KeysResponse = serde_json::from_value(keys)?;
        Ok(keys.keys)
    }

    /// Delete the provider of the active RS256 signing key, returning its id
    pub async fn delete_signing_rs256_jwks_key(&self) -> Result<String> {
        let keys = self.list_keys().await?;
        let provider_id = active_rs256_provider(&keys)
            .ok_or_else(|| Error::NotFound {
                kind: "Keycloak key".to_string(),
                name: "active RS256 signing key".to_string(),
            })?
            .to_string();

        self.admin_delete(&format!("/{}/components/{provider_id}", self.realm_name))
            .await?;
        info!("Deleted RS256 signing key provider {} in {}", provider_id, self.realm_name);
        Ok(provider_id)
    }

    /// Add a fresh generated RS256 signing key
    pub async fn create_signing_rs256_jwks_key(&self) -> Result<()> {
        self.require_realm()?;
        let realm = self.admin_get(&format!("/{}", self.realm_name)).await?;
        let parent_id = realm["id"].as_str().unwrap_or(&self.realm_name).to_string();

        self.admin_post(
            &format!("/{}/components", self.realm_name),
            &json!({
                "name": "rsa-generated",
                "providerId": "rsa-generated",
                "providerType": "org.keycloak.keys.KeyProvider",
                "parentId": parent_id,
                "config": {
                    "keySize": ["2048"],
                    "active": ["true"],
                    "priority": ["100"],
                    "enabled": ["true"],
                    "algorithm": ["RS256"],
                },
            }),
        )
        .await?;
        info!("Created RS256 signing key in {}", self.realm_name);
        Ok(())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Token> {
        let client = self.realm_client()?;
        let mut params = vec![
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.secret.as_str()),
        ];
        params.extend_from_slice(form);

        let response = self
            .http
            .post(self.realm_url("/protocol/openid-connect/token"))
            .form(&params)
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;
        Ok(Token {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        })
    }
}

impl OidcProvider for Keycloak {
    async fn well_known(&self) -> Result<Value> {
        self.realm_client()?;
        let document = self
            .well_known
            .get_or_try_init(|| async {
                let url = self.realm_url("/.well-known/openid-configuration");
                let response = self.http.get(url).send().await?;
                let document: Value = check(response).await?.json().await?;
                Ok::<_, Error>(document)
            })
            .await?;
        Ok(document.clone())
    }

    async fn get_token(&self, username: Option<&str>, password: Option<&str>) -> Result<Token> {
        let username = username.unwrap_or(self.test_username.as_str());
        let password = password.unwrap_or(self.test_password.as_str());
        debug!("Requesting token for {} from {}", username, self.realm_name);
        self.token_request(&[
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Token> {
        self.token_request(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await
            .inspect_err(|e| warn!("Token refresh in {} failed: {}", self.realm_name, e))
    }
}
