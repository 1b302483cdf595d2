//! Reader identities: per-deployment roots a signed-in user may certify keys under.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{certifier::ReaderRoot, client::SignedInUser};

/// A named signing root offered to some signed-in users.
#[derive(Debug, Clone)]
pub struct ReaderIdentity {
    pub id: String,
    pub display_name: String,
    pub display_icon: Option<Vec<u8>>,
    pub root: Arc<ReaderRoot>,
}

/// What a client learns about a reader identity. Never carries key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderIdentityInfo {
    pub id: String,
    pub display_name: String,
    /// Standard base64 of the icon image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_icon: Option<String>,
}

impl From<&ReaderIdentity> for ReaderIdentityInfo {
    fn from(identity: &ReaderIdentity) -> Self {
        Self {
            id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            display_icon: identity.display_icon.as_ref().map(base64::encode),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("reader identity provider unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Resolves the reader identities available to a user.
#[async_trait]
pub trait ReaderIdentityProvider: Send + Sync {
    async fn identities_for(
        &self,
        user: &SignedInUser,
    ) -> Result<Vec<Arc<ReaderIdentity>>, IdentityError>;

    /// The identity `id`, if `user` may use it.
    async fn identity_for(
        &self,
        user: &SignedInUser,
        id: &str,
    ) -> Result<Option<Arc<ReaderIdentity>>, IdentityError> {
        Ok(self
            .identities_for(user)
            .await?
            .into_iter()
            .find(|identity| identity.id == id))
    }
}

/// No reader identities at all.
#[async_trait]
impl ReaderIdentityProvider for () {
    async fn identities_for(
        &self,
        _user: &SignedInUser,
    ) -> Result<Vec<Arc<ReaderIdentity>>, IdentityError> {
        Ok(vec![])
    }
}

/// Which signed-in accounts may use an identity.
///
/// `*` matches everyone with a verified email, `@example.com` a whole domain, anything
/// else one email address. Matching ignores case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountMatcher {
    Any,
    Domain(String),
    Email(String),
}

impl AccountMatcher {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern == "*" {
            AccountMatcher::Any
        } else if let Some(domain) = pattern.strip_prefix('@') {
            AccountMatcher::Domain(domain.to_string())
        } else {
            AccountMatcher::Email(pattern)
        }
    }

    pub fn matches(&self, user: &SignedInUser) -> bool {
        let Some(email) = user.email.as_deref().map(str::to_ascii_lowercase) else {
            return false;
        };
        match self {
            AccountMatcher::Any => true,
            AccountMatcher::Domain(domain) => email
                .rsplit_once('@')
                .is_some_and(|(_, email_domain)| email_domain == domain),
            AccountMatcher::Email(allowed) => &email == allowed,
        }
    }
}

/// Identities fixed at startup, each with its own account allowlist.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredReaderIdentities {
    identities: Vec<(Arc<ReaderIdentity>, Vec<AccountMatcher>)>,
}

impl ConfiguredReaderIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: ReaderIdentity, allowed_accounts: &[String]) -> Self {
        let matchers = allowed_accounts
            .iter()
            .map(|pattern| AccountMatcher::parse(pattern))
            .collect();
        self.identities.push((Arc::new(identity), matchers));
        self
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl ReaderIdentityProvider for ConfiguredReaderIdentities {
    async fn identities_for(
        &self,
        user: &SignedInUser,
    ) -> Result<Vec<Arc<ReaderIdentity>>, IdentityError> {
        Ok(self
            .identities
            .iter()
            .filter(|(_, matchers)| matchers.iter().any(|matcher| matcher.matches(user)))
            .map(|(identity, _)| identity.clone())
            .collect())
    }
}
