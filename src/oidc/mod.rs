//! OpenID Connect identity providers
//!
//! Scenarios obtain tokens from a provider and present them to an
//! `AuthPolicy` configured with the provider's issuer.

mod keycloak;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use keycloak::{KeyMetadata, Keycloak, KeycloakState};

/// Tokens issued to a user
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
}

impl Token {
    /// Exchange the refresh token for a new pair
    pub async fn refresh<P: OidcProvider>(&self, provider: &P) -> Result<Token> {
        provider.refresh_token(&self.refresh_token).await
    }
}

#[allow(async_fn_in_trait)]
pub trait OidcProvider {
    /// OpenID configuration document of the issuer
    async fn well_known(&self) -> Result<Value>;

    /// Password grant; `None` uses the provider's test user
    async fn get_token(&self, username: Option<&str>, password: Option<&str>) -> Result<Token>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<Token>;
}
