//! Configuration management for the FI Registry service

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Bearer-token verification configuration
    pub auth: AuthConfig,
    /// Permission scopes that mark an actor as an administrator.
    /// An actor is an admin iff their scopes are a superset of this set.
    pub admin_scopes: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Settings for verifying identity-provider tokens.
///
/// Token issuance and account management live entirely in the external
/// identity provider; this service only checks signatures and reads claims.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret, used when no public key is configured
    pub secret: String,
    /// Expected token issuer
    pub issuer: String,
    /// Expected audience (client id)
    pub audience: String,
    /// Clock-skew leeway in seconds
    pub leeway_secs: u64,
    /// RSA public key (PEM) from the identity provider, preferred over the secret
    pub public_key_pem: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            auth: AuthConfig {
                secret: env::var("AUTH_TOKEN_SECRET").context("AUTH_TOKEN_SECRET is required")?,
                issuer: env::var("AUTH_ISSUER").context("AUTH_ISSUER is required")?,
                audience: env::var("AUTH_CLIENT").context("AUTH_CLIENT is required")?,
                leeway_secs: env::var("AUTH_LEEWAY_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                public_key_pem: env::var("AUTH_PUBLIC_KEY")
                    .ok()
                    .map(|value| value.replace("\\n", "\n")),
            },
            admin_scopes: parse_scopes(
                &env::var("ADMIN_SCOPES").unwrap_or_else(|_| "query-groups,manage-users".to_string()),
            ),
        })
    }

    /// HTTP bind address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

fn parse_scopes(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
