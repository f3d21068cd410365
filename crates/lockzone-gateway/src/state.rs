//! Shared authentication state.

use std::sync::Arc;

use lockzone_core::{AuthConfig, ConfigError, Principal};
use lockzone_guard::{TokenGuard, UserStore};
use lockzone_token::{Algorithm, RevocationList, Signer, SignerError, TokenCodec};

/// Gateway construction errors.
///
/// These indicate a deployment mistake; nothing here is produced while
/// serving requests.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Invalid authentication configuration.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Key material could not be loaded.
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),
}

/// Shared authentication state for an axum application.
///
/// Built once at startup and handed to routers behind an `Arc`; request
/// handling only ever reads it.
pub struct AuthState {
    /// Auth configuration.
    pub config: AuthConfig,
    codec: Arc<TokenCodec>,
    revocations: Arc<RevocationList>,
    store: Arc<dyn UserStore>,
}

impl AuthState {
    /// Assemble state from already-built parts.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        codec: Arc<TokenCodec>,
        revocations: Arc<RevocationList>,
        store: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            config,
            codec,
            revocations,
            store,
        }
    }

    /// Build state from configuration, constructing the signer and codec.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on invalid configuration or unusable key
    /// material.
    pub fn initialize(config: AuthConfig, store: Arc<dyn UserStore>) -> Result<Self, GatewayError> {
        config.validate()?;

        let algorithm: Algorithm = config
            .algorithm
            .parse()
            .map_err(GatewayError::Signer)?;

        let signer = if algorithm == Algorithm::RS256 {
            Signer::rsa_from_pem(
                config.rsa_private_key_pem.as_deref(),
                config.rsa_public_key_pem.as_deref(),
            )?
        } else {
            let secret = config.jwt_secret.as_deref().unwrap_or_default();
            Signer::hmac(algorithm, secret.as_bytes())?
        };

        let codec = Arc::new(TokenCodec::new(
            signer,
            config.issuer.clone(),
            config.access_ttl(),
            config.refresh_ttl(),
        ));

        tracing::info!(
            issuer = %config.issuer,
            algorithm = %algorithm,
            "Authentication state initialized"
        );

        Ok(Self::new(
            config,
            codec,
            Arc::new(RevocationList::new()),
            store,
        ))
    }

    /// The token codec.
    #[must_use]
    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// The revocation list.
    #[must_use]
    pub fn revocations(&self) -> &Arc<RevocationList> {
        &self.revocations
    }

    /// The user store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// A token guard wired to this state.
    #[must_use]
    pub fn token_guard(&self) -> TokenGuard {
        TokenGuard::new(
            self.config.default_guard.clone(),
            Arc::clone(&self.codec),
            Arc::clone(&self.revocations),
            Arc::clone(&self.store),
        )
    }

    /// Resolve a token to its principal.
    ///
    /// Stateless query: decode, revocation check, store lookup.
    #[must_use]
    pub fn authenticate_token(&self, token: &str) -> Option<Principal> {
        self.token_guard().authenticate_token(token)
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("revoked", &self.revocations.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockzone_guard::MemoryUserStore;

    fn config() -> AuthConfig {
        AuthConfig::builder()
            .issuer("app")
            .jwt_secret("s3cret-key-32-bytes-minimum!!!!")
            .build()
    }

    #[test]
    fn test_initialize_hmac() {
        let state = AuthState::initialize(config(), Arc::new(MemoryUserStore::new())).unwrap();
        assert_eq!(state.codec().issuer(), "app");
    }

    #[test]
    fn test_initialize_rejects_missing_secret() {
        let config = AuthConfig::builder().issuer("app").build();
        let result = AuthState::initialize(config, Arc::new(MemoryUserStore::new()));
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_initialize_rejects_bad_rsa_pem() {
        let config = AuthConfig::builder()
            .algorithm("RS256")
            .rsa_private_key_pem("not a pem")
            .build();
        let result = AuthState::initialize(config, Arc::new(MemoryUserStore::new()));
        assert!(matches!(result, Err(GatewayError::Signer(_))));
    }

    #[test]
    fn test_authenticate_token_round_trip() {
        let store = Arc::new(MemoryUserStore::new());
        let principal = store.create_user("kim", "password123").unwrap();

        let state = AuthState::initialize(config(), store).unwrap();
        let pair = state.token_guard().issue_token_pair(&principal).unwrap();

        let found = state.authenticate_token(&pair.access_token).unwrap();
        assert_eq!(found.id, principal.id);
        assert!(state.authenticate_token("garbage").is_none());
    }
}
