use crate::client::SignedInUser;

/// Reader identity request asking for the default root plus the linked account.
pub const DEFAULT_WITH_ACCOUNT_DETAILS: &str = "default-with-account-details";

/// Which key signs a batch of reader certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootSelection {
    /// Built-in root for devices with a validated attestation.
    TrustedDevice { with_account: bool },
    /// Built-in root for everything else.
    UntrustedDevice { with_account: bool },
    /// A per-deployment reader identity the signed-in user asked for.
    Identity(String),
}

impl RootSelection {
    pub fn with_account(&self) -> bool {
        match self {
            RootSelection::TrustedDevice { with_account }
            | RootSelection::UntrustedDevice { with_account } => *with_account,
            RootSelection::Identity(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reader identity '{0}' requested without a signed-in user")]
pub struct NotSignedIn(pub String);

/// Pick the signing root for a client.
///
/// `requested` is the identity asked for in the request, or failing that the identity
/// stored on the client record. Without a signed-in user any request is refused.
pub fn select_root(
    device_is_trusted: bool,
    signed_in_user: Option<&SignedInUser>,
    requested: Option<&str>,
) -> Result<RootSelection, NotSignedIn> {
    let built_in = |with_account| {
        if device_is_trusted {
            RootSelection::TrustedDevice { with_account }
        } else {
            RootSelection::UntrustedDevice { with_account }
        }
    };

    match (requested, signed_in_user) {
        (None, _) => Ok(built_in(false)),
        (Some(requested), None) => Err(NotSignedIn(requested.to_string())),
        (Some(DEFAULT_WITH_ACCOUNT_DETAILS), Some(_)) => Ok(built_in(true)),
        (Some(requested), Some(_)) => Ok(RootSelection::Identity(requested.to_string())),
    }
}
