//! Registry client configuration.

use oci_distribution::client::ClientProtocol;

/// Environment variable holding the registry username.
pub const USERNAME_ENV: &str = "ORAS_REGISTRY_USERNAME";

/// Environment variable holding the registry password or token.
pub const PASSWORD_ENV: &str = "ORAS_REGISTRY_PASSWORD";

/// Environment variable listing registries reached over plain HTTP.
pub const INSECURE_REGISTRIES_ENV: &str = "ORAS_INSECURE_REGISTRIES";

/// Transport used to reach registries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegistryProtocol {
    /// HTTPS for every registry.
    #[default]
    Https,
    /// Plain HTTP for every registry.
    Http,
    /// HTTPS except for the listed registries.
    HttpsExcept(Vec<String>),
}

impl RegistryProtocol {
    pub(crate) fn to_client_protocol(&self) -> ClientProtocol {
        match self {
            Self::Https => ClientProtocol::Https,
            Self::Http => ClientProtocol::Http,
            Self::HttpsExcept(registries) => ClientProtocol::HttpsExcept(registries.clone()),
        }
    }
}

/// Basic credentials sent to every registry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for [`crate::RegistryClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Transport used to reach registries.
    pub protocol: RegistryProtocol,
    /// Credentials for every registry; anonymous when unset.
    pub credentials: Option<Credentials>,
}

impl RegistryConfig {
    /// Configuration read from the environment.
    ///
    /// Credentials come from `ORAS_REGISTRY_USERNAME` and
    /// `ORAS_REGISTRY_PASSWORD` (both must be set). `ORAS_INSECURE_REGISTRIES`
    /// is a comma separated list of registries reached over HTTP.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let (Ok(username), Ok(password)) =
            (std::env::var(USERNAME_ENV), std::env::var(PASSWORD_ENV))
        {
            config = config.with_credentials(username, password);
        }

        if let Ok(insecure) = std::env::var(INSECURE_REGISTRIES_ENV) {
            let registries: Vec<String> = insecure
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
            if !registries.is_empty() {
                config = config.with_protocol(RegistryProtocol::HttpsExcept(registries));
            }
        }

        config
    }

    /// Sets the transport.
    #[must_use]
    pub fn with_protocol(mut self, protocol: RegistryProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets basic credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}
