//! Reference lookup entities

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Federal regulator (e.g. FRS, OCC)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FederalRegulator {
    pub id: String,
    pub name: String,
}

/// HMDA or SBL institution type
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InstitutionType {
    pub id: String,
    pub name: String,
}

/// US state/territory used in headquarters addresses
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AddressState {
    pub code: String,
    pub name: String,
}

/// Email domain barred from self-association
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeniedDomain {
    pub domain: String,
}
