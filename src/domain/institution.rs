//! Financial institution domain model

use crate::domain::lookup::{AddressState, FederalRegulator, InstitutionType};
use crate::domain::sbl_type::{SblTypeAssociationDetails, TypeAssociationInput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

lazy_static::lazy_static! {
    /// LEIs are 20 alphanumeric characters
    pub static ref LEI_REGEX: regex::Regex = regex::Regex::new(r"^[a-zA-Z0-9]{20}$").unwrap();
    /// Tax ids follow the XX-XXXXXXX pattern
    pub static ref TAX_ID_REGEX: regex::Regex = regex::Regex::new(r"^[0-9]{2}-[0-9]{7}$").unwrap();
}

/// Financial institution entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FinancialInstitution {
    pub lei: String,
    pub name: String,
    pub is_active: bool,
    pub tax_id: Option<String>,
    pub rssd_id: Option<i64>,
    pub primary_federal_regulator_id: Option<String>,
    pub hmda_institution_type_id: Option<String>,
    pub hq_address_street_1: String,
    pub hq_address_street_2: Option<String>,
    pub hq_address_street_3: Option<String>,
    pub hq_address_street_4: Option<String>,
    pub hq_address_city: String,
    pub hq_address_state_code: String,
    pub hq_address_zip: String,
    pub parent_lei: Option<String>,
    pub parent_legal_name: Option<String>,
    pub parent_rssd_id: Option<i64>,
    pub top_holder_lei: Option<String>,
    pub top_holder_legal_name: Option<String>,
    pub top_holder_rssd_id: Option<i64>,
    /// Monotonically increasing audit version, bumped on every tracked change
    pub version: i32,
    pub modified_by: String,
    pub event_time: DateTime<Utc>,
}

/// Registered email domain of an institution
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InstitutionDomain {
    pub domain: String,
    pub lei: String,
}

/// Input for registering domains under an institution
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DomainCreate {
    #[validate(length(min = 1, max = 255))]
    pub domain: String,
}

/// Upsert payload for an institution.
///
/// Required fields mirror the registry schema: legal name, LEI, active flag
/// and the headquarters address. Everything else is optional and merged onto
/// the existing record when present.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InstitutionUpsert {
    #[validate(custom(function = "validate_lei"))]
    pub lei: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub is_active: bool,
    #[validate(custom(function = "validate_tax_id"))]
    pub tax_id: Option<String>,
    pub rssd_id: Option<i64>,
    pub primary_federal_regulator_id: Option<String>,
    pub hmda_institution_type_id: Option<String>,
    /// When present, the submitted set replaces the persisted associations
    /// via the reconciler; when absent, associations are left untouched.
    pub sbl_institution_types: Option<Vec<TypeAssociationInput>>,
    #[validate(length(min = 1))]
    pub hq_address_street_1: String,
    pub hq_address_street_2: Option<String>,
    pub hq_address_street_3: Option<String>,
    pub hq_address_street_4: Option<String>,
    #[validate(length(min = 1))]
    pub hq_address_city: String,
    #[validate(length(min = 2, max = 2))]
    pub hq_address_state_code: String,
    #[validate(length(min = 1))]
    pub hq_address_zip: String,
    pub parent_lei: Option<String>,
    pub parent_legal_name: Option<String>,
    pub parent_rssd_id: Option<i64>,
    pub top_holder_lei: Option<String>,
    pub top_holder_legal_name: Option<String>,
    pub top_holder_rssd_id: Option<i64>,
}

fn validate_lei(lei: &str) -> std::result::Result<(), validator::ValidationError> {
    if LEI_REGEX.is_match(lei) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_lei")
            .with_message("lei must be 20 characters long and contain only letters and numbers".into()))
    }
}

fn validate_tax_id(tax_id: &str) -> std::result::Result<(), validator::ValidationError> {
    if TAX_ID_REGEX.is_match(tax_id) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_tax_id")
            .with_message("tax_id must conform to the XX-XXXXXXX pattern".into()))
    }
}

impl InstitutionUpsert {
    /// Merge this payload onto an existing record, or construct a fresh one.
    ///
    /// Version and event time are owned by the auditor; the merge carries the
    /// existing version forward and lets the audit pass decide the bump.
    pub fn merge_onto(
        &self,
        existing: Option<&FinancialInstitution>,
        acting_user: &str,
    ) -> FinancialInstitution {
        FinancialInstitution {
            lei: self.lei.clone(),
            name: self.name.clone(),
            is_active: self.is_active,
            tax_id: self.tax_id.clone(),
            rssd_id: self.rssd_id,
            primary_federal_regulator_id: self.primary_federal_regulator_id.clone(),
            hmda_institution_type_id: self.hmda_institution_type_id.clone(),
            hq_address_street_1: self.hq_address_street_1.clone(),
            hq_address_street_2: self.hq_address_street_2.clone(),
            hq_address_street_3: self.hq_address_street_3.clone(),
            hq_address_street_4: self.hq_address_street_4.clone(),
            hq_address_city: self.hq_address_city.clone(),
            hq_address_state_code: self.hq_address_state_code.clone(),
            hq_address_zip: self.hq_address_zip.clone(),
            parent_lei: self.parent_lei.clone(),
            parent_legal_name: self.parent_legal_name.clone(),
            parent_rssd_id: self.parent_rssd_id,
            top_holder_lei: self.top_holder_lei.clone(),
            top_holder_legal_name: self.top_holder_legal_name.clone(),
            top_holder_rssd_id: self.top_holder_rssd_id,
            version: existing.map(|e| e.version).unwrap_or(0),
            modified_by: acting_user.to_string(),
            event_time: Utc::now(),
        }
    }
}

/// Institution with its relations resolved for serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionWithRelations {
    #[serde(flatten)]
    pub institution: FinancialInstitution,
    pub primary_federal_regulator: Option<FederalRegulator>,
    pub hmda_institution_type: Option<InstitutionType>,
    pub sbl_institution_types: Vec<SblTypeAssociationDetails>,
    pub hq_address_state: Option<AddressState>,
    pub domains: Vec<InstitutionDomain>,
}

/// Institution as returned by the "associated institutions" view
#[derive(Debug, Clone, Serialize)]
pub struct AssociatedInstitution {
    #[serde(flatten)]
    pub institution: InstitutionWithRelations,
    /// True iff the acting user's email domain is registered on the institution
    pub approved: bool,
}

/// Search filter for institution listing
#[derive(Debug, Clone, Default)]
pub struct InstitutionFilter {
    pub leis: Option<Vec<String>>,
    pub domain: Option<String>,
    pub page: i64,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_upsert() -> InstitutionUpsert {
        InstitutionUpsert {
            lei: "TESTBANK123000000000".to_string(),
            name: "Test Bank 123".to_string(),
            is_active: true,
            tax_id: None,
            rssd_id: None,
            primary_federal_regulator_id: None,
            hmda_institution_type_id: None,
            sbl_institution_types: None,
            hq_address_street_1: "Test Address Street 1".to_string(),
            hq_address_street_2: None,
            hq_address_street_3: None,
            hq_address_street_4: None,
            hq_address_city: "Test City 1".to_string(),
            hq_address_state_code: "GA".to_string(),
            hq_address_zip: "00000".to_string(),
            parent_lei: None,
            parent_legal_name: None,
            parent_rssd_id: None,
            top_holder_lei: None,
            top_holder_legal_name: None,
            top_holder_rssd_id: None,
        }
    }

    #[test]
    fn test_minimal_payload_is_valid() {
        assert!(minimal_upsert().validate().is_ok());
    }

    #[test]
    fn test_invalid_lei_rejected() {
        let mut payload = minimal_upsert();
        payload.lei = "SHORT".to_string();
        assert!(payload.validate().is_err());

        payload.lei = "TESTBANK123000000-00".to_string();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_tax_id_pattern() {
        let mut payload = minimal_upsert();
        payload.tax_id = Some("12-3456789".to_string());
        assert!(payload.validate().is_ok());

        payload.tax_id = Some("123456789".to_string());
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_missing_required_field_fails_deserialization() {
        // hq_address_zip omitted
        let err = serde_json::from_str::<InstitutionUpsert>(
            r#"{
                "lei": "TESTBANK123000000000",
                "name": "Test Bank 123",
                "is_active": true,
                "hq_address_street_1": "Test Address Street 1",
                "hq_address_city": "Test City 1",
                "hq_address_state_code": "GA"
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("hq_address_zip"));
    }

    #[test]
    fn test_merge_onto_existing_keeps_version() {
        let payload = minimal_upsert();
        let mut existing = payload.merge_onto(None, "user_a");
        existing.version = 3;
        let merged = payload.merge_onto(Some(&existing), "user_b");
        assert_eq!(merged.version, 3);
        assert_eq!(merged.modified_by, "user_b");
    }

    #[test]
    fn test_merge_onto_absent_starts_at_version_zero() {
        let merged = minimal_upsert().merge_onto(None, "user_a");
        assert_eq!(merged.version, 0);
    }
}
