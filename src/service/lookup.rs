//! Reference lookup reads

use crate::domain::{AddressState, FederalRegulator, InstitutionType};
use crate::error::{AppError, Result};
use crate::repository::LookupRepository;
use std::sync::Arc;

pub struct LookupService<R: LookupRepository> {
    repo: Arc<R>,
}

impl<R: LookupRepository> LookupService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn federal_regulators(&self) -> Result<Vec<FederalRegulator>> {
        self.repo.federal_regulators().await
    }

    pub async fn address_states(&self) -> Result<Vec<AddressState>> {
        self.repo.address_states().await
    }

    /// Institution types by group discriminator (`sbl` or `hmda`).
    /// An unknown discriminator is a validation error, not a 404.
    pub async fn institution_types(&self, group: &str) -> Result<Vec<InstitutionType>> {
        match group {
            "sbl" => self.repo.sbl_institution_types().await,
            "hmda" => self.repo.hmda_institution_types().await,
            other => Err(AppError::Validation(format!(
                "unknown institution type group '{other}'"
            ))),
        }
    }
}
