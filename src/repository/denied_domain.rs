//! Denied email domain repository

use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeniedDomainRepository: Send + Sync {
    /// Whether the given email domain is on the deny list
    async fn is_denied(&self, domain: &str) -> Result<bool>;
}

pub struct DeniedDomainRepositoryImpl {
    pool: PgPool,
}

impl DeniedDomainRepositoryImpl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeniedDomainRepository for DeniedDomainRepositoryImpl {
    async fn is_denied(&self, domain: &str) -> Result<bool> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM denied_domains WHERE domain = $1)")
                .bind(domain)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }
}
