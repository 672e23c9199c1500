//! Kuadrant policies and operator resources
//!
//! Every policy points at a Gateway or HTTPRoute through `targetRef` and
//! reports readiness through a status condition. Which condition depends on
//! the kind; see [`readiness_condition`].

mod auth_policy;
mod authorino;
mod dns_policy;
mod kuadrant;
mod rate_limit;
mod tls_policy;

use std::ops::{Deref, DerefMut};
use tracing::info;

use crate::error::Result;
use crate::k8s::{has_condition, ClusterResource, ConditionCheck, HasConditions, KubeObject, WaitOptions};

pub use auth_policy::{
    AuthPolicy, AuthPolicyResource, AuthPolicySpec, AuthRules, Identity, Pattern, ValueFrom,
};
pub use authorino::{AuthorinoCr, AuthorinoOptions, AuthorinoResource};
pub use dns_policy::{has_record_condition, DnsPolicy, DnsPolicyResource, LoadBalancing};
pub use kuadrant::{KuadrantCr, KuadrantResource};
pub use rate_limit::{Limit, Rate, RateLimitPolicy, RateLimitPolicyResource, TimeUnit, WhenCondition};
pub use tls_policy::{TlsPolicy, TlsPolicyOptions, TlsPolicyResource};

/// Condition that marks a policy kind as ready
///
/// TLSPolicy never reports `Enforced`, so `Accepted` is the best it offers.
pub fn readiness_condition(kind: &str) -> ConditionCheck {
    match kind {
        "TLSPolicy" => has_condition("Accepted", "True"),
        _ => has_condition("Enforced", "True"),
    }
}

/// Policy document bound to a cluster
pub struct Policy<K> {
    object: KubeObject<K>,
}

impl<K: ClusterResource + HasConditions> Policy<K> {
    pub(crate) fn from_object(object: KubeObject<K>) -> Self {
        Self { object }
    }

    /// Wait for the readiness condition of this kind
    pub async fn wait_for_ready(&mut self, options: &WaitOptions) -> Result<()> {
        let check = readiness_condition(&self.object.kind());
        self.object.wait_for_condition(&check, options).await?;
        info!("{} {} is ready", self.object.kind(), self.object.name());
        Ok(())
    }
}

impl<K> Deref for Policy<K> {
    type Target = KubeObject<K>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl<K> DerefMut for Policy<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_table() {
        assert_eq!(readiness_condition("AuthPolicy"), has_condition("Enforced", "True"));
        assert_eq!(readiness_condition("RateLimitPolicy"), has_condition("Enforced", "True"));
        assert_eq!(readiness_condition("DNSPolicy"), has_condition("Enforced", "True"));
        assert_eq!(readiness_condition("TLSPolicy"), has_condition("Accepted", "True"));
    }
}
