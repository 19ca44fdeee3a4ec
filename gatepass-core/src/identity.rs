use async_trait::async_trait;

/// Resolves a presented credential into a stable holder identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `None` means "no identity": the credential is missing, malformed or expired.
    async fn resolve(&self, credential: &str) -> Option<String>;
}

/// Trusts the credential verbatim. Used by tests and local demos.
pub struct StaticIdentityProvider;

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, credential: &str) -> Option<String> {
        let trimmed = credential.trim();
        if trimmed.is_empty() {
            tracing::debug!("Rejected empty credential");
            return None;
        }
        Some(trimmed.to_string())
    }
}
