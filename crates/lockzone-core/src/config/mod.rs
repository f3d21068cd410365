//! Authentication configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default access-token lifetime in seconds (1 hour).
const DEFAULT_ACCESS_TTL_SECS: u64 = 3600;
/// Default refresh-token lifetime in seconds (7 days).
const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 3600;
/// Default issuer stamped into and required from tokens.
const DEFAULT_ISSUER: &str = "lockzone";
/// Default guard consulted when none is named.
const DEFAULT_GUARD: &str = "web";

/// Configuration errors.
///
/// These indicate a deployment mistake and are raised at construction
/// time, never during request handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown signing algorithm name.
    #[error("Unknown signing algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Required key material missing.
    #[error("Missing key material: {0}")]
    MissingKeyMaterial(String),

    /// Malformed configuration value.
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field that failed.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Whether authentication is enforced at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Token issuer, stamped into every token and required on decode.
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Signing algorithm identifier (`HS256`, `HS384`, `HS512`, `RS256`).
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Shared secret for the HMAC algorithms.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// PEM-encoded RSA private key (RS256 signing side).
    #[serde(default)]
    pub rsa_private_key_pem: Option<String>,

    /// PEM-encoded RSA public key (RS256 verify side).
    #[serde(default)]
    pub rsa_public_key_pem: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,

    /// Guard consulted when no guard name is given.
    #[serde(default = "default_guard")]
    pub default_guard: String,
}

fn default_enabled() -> bool {
    true
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_access_ttl() -> u64 {
    DEFAULT_ACCESS_TTL_SECS
}

fn default_refresh_ttl() -> u64 {
    DEFAULT_REFRESH_TTL_SECS
}

fn default_guard() -> String {
    DEFAULT_GUARD.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            issuer: default_issuer(),
            algorithm: default_algorithm(),
            jwt_secret: None,
            rsa_private_key_pem: None,
            rsa_public_key_pem: None,
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            default_guard: default_guard(),
        }
    }
}

impl AuthConfig {
    /// Create a new config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Access token lifetime as a [`Duration`].
    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    /// Refresh token lifetime as a [`Duration`].
    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }

    /// Whether any key material is configured for the chosen algorithm.
    #[must_use]
    pub fn has_key_material(&self) -> bool {
        if self.algorithm == "RS256" {
            self.rsa_private_key_pem.is_some() || self.rsa_public_key_pem.is_some()
        } else {
            self.jwt_secret.is_some()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on an unknown algorithm, missing key
    /// material, or a zero token lifetime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.algorithm.as_str() {
            "HS256" | "HS384" | "HS512" | "RS256" => {}
            other => return Err(ConfigError::UnknownAlgorithm(other.to_string())),
        }

        if !self.has_key_material() {
            return Err(ConfigError::MissingKeyMaterial(format!(
                "algorithm {} requires {}",
                self.algorithm,
                if self.algorithm == "RS256" {
                    "an RSA key"
                } else {
                    "a shared secret"
                }
            )));
        }

        if self.access_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "access_ttl_secs",
                reason: "must be positive".to_string(),
            });
        }

        if self.refresh_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_ttl_secs",
                reason: "must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Apply environment-variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("LOCKZONE_JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }

        if let Ok(issuer) = std::env::var("LOCKZONE_ISSUER") {
            self.issuer = issuer;
        }

        if std::env::var("LOCKZONE_AUTH_DISABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
        {
            tracing::warn!("Authentication disabled via LOCKZONE_AUTH_DISABLED");
            self.enabled = false;
        }

        self
    }
}

/// Builder for [`AuthConfig`].
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Set whether authentication is enforced.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the issuer.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.issuer = issuer.into();
        self
    }

    /// Set the signing algorithm identifier.
    #[must_use]
    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.config.algorithm = algorithm.into();
        self
    }

    /// Set the shared HMAC secret.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    /// Set the RSA private key PEM.
    #[must_use]
    pub fn rsa_private_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.config.rsa_private_key_pem = Some(pem.into());
        self
    }

    /// Set the RSA public key PEM.
    #[must_use]
    pub fn rsa_public_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.config.rsa_public_key_pem = Some(pem.into());
        self
    }

    /// Set the access token lifetime in seconds.
    #[must_use]
    pub fn access_ttl_secs(mut self, secs: u64) -> Self {
        self.config.access_ttl_secs = secs;
        self
    }

    /// Set the refresh token lifetime in seconds.
    #[must_use]
    pub fn refresh_ttl_secs(mut self, secs: u64) -> Self {
        self.config.refresh_ttl_secs = secs;
        self
    }

    /// Set the default guard name.
    #[must_use]
    pub fn default_guard(mut self, guard: impl Into<String>) -> Self {
        self.config.default_guard = guard.into();
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}
