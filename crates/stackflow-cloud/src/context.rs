//! Explicit provider context threaded through every client call

/// Account/region context for one provider.
///
/// Passed explicitly to every [`LifecycleClient`](crate::LifecycleClient)
/// call instead of relying on process-wide environment variables.
#[derive(Debug, Clone, Default)]
pub struct ProviderContext {
    /// Named credential profile
    pub profile: Option<String>,

    /// Default region for calls whose handle carries no region
    pub region: Option<String>,

    /// Credentials to use for this context
    pub credentials: Credentials,
}

impl ProviderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Region from the handle if present, falling back to the context default
    pub fn region_for<'a>(&'a self, handle_region: Option<&'a str>) -> Option<&'a str> {
        handle_region.or(self.region.as_deref())
    }
}

/// Credential source
#[derive(Clone, Default)]
pub enum Credentials {
    /// Whatever the provider tooling resolves on its own (profile, instance role)
    #[default]
    Ambient,

    /// Static access keys
    Static {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },

    /// Bearer token for token-authenticated HTTP APIs
    BearerToken(String),
}

impl Credentials {
    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Credentials::BearerToken(token) => Some(token),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Ambient => write!(f, "Ambient"),
            Credentials::Static { access_key_id, .. } => f
                .debug_struct("Static")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .finish(),
            Credentials::BearerToken(_) => write!(f, "BearerToken(<redacted>)"),
        }
    }
}
