//! Reference lookup repository

use crate::domain::{AddressState, FederalRegulator, InstitutionType};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LookupRepository: Send + Sync {
    async fn federal_regulators(&self) -> Result<Vec<FederalRegulator>>;
    async fn sbl_institution_types(&self) -> Result<Vec<InstitutionType>>;
    async fn hmda_institution_types(&self) -> Result<Vec<InstitutionType>>;
    async fn address_states(&self) -> Result<Vec<AddressState>>;
}

pub struct LookupRepositoryImpl {
    pool: PgPool,
}

impl LookupRepositoryImpl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LookupRepository for LookupRepositoryImpl {
    async fn federal_regulators(&self) -> Result<Vec<FederalRegulator>> {
        let regulators = sqlx::query_as::<_, FederalRegulator>(
            "SELECT id, name FROM federal_regulator ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(regulators)
    }

    async fn sbl_institution_types(&self) -> Result<Vec<InstitutionType>> {
        let types = sqlx::query_as::<_, InstitutionType>(
            "SELECT id, name FROM sbl_institution_type ORDER BY id::int",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(types)
    }

    async fn hmda_institution_types(&self) -> Result<Vec<InstitutionType>> {
        let types = sqlx::query_as::<_, InstitutionType>(
            "SELECT id, name FROM hmda_institution_type ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(types)
    }

    async fn address_states(&self) -> Result<Vec<AddressState>> {
        let states = sqlx::query_as::<_, AddressState>(
            "SELECT code, name FROM address_state ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(states)
    }
}
