//! Bearer token verification
//!
//! Tokens are minted by the external identity provider; this service only
//! verifies signatures and maps claims into an [`AuthenticatedUser`].

use crate::config::AuthConfig;
use crate::domain::AuthenticatedUser;
use crate::error::{AppError, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by identity-provider access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Login name
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Email address
    #[serde(default)]
    pub email: Option<String>,
    /// Space-delimited permission scopes
    #[serde(default)]
    pub scope: String,
    /// Institution group paths the user belongs to
    #[serde(default)]
    pub institutions: Option<Vec<String>>,
    /// Issuer
    pub iss: String,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Verifies identity-provider tokens
#[derive(Clone)]
pub struct JwtManager {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtManager {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let (decoding_key, algorithm) = match config.public_key_pem.as_ref() {
            Some(public_key) => (
                DecodingKey::from_rsa_pem(public_key.as_bytes())?,
                Algorithm::RS256,
            ),
            None => (
                DecodingKey::from_secret(config.secret.as_bytes()),
                Algorithm::HS256,
            ),
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_secs;
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    /// Verify a bearer token and extract the acting user
    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("invalid bearer token: {e}")))?;
        Ok(Self::user_from_claims(data.claims))
    }

    fn user_from_claims(claims: Claims) -> AuthenticatedUser {
        let scopes = claims
            .scope
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let institutions = AuthenticatedUser::parse_institutions(claims.institutions.as_deref());
        AuthenticatedUser {
            id: claims.sub,
            name: claims.name.unwrap_or_default(),
            username: claims.preferred_username.unwrap_or_default(),
            email: claims.email.unwrap_or_default(),
            scopes,
            institutions,
        }
    }
}
