//! Change auditing for institution mutations
//!
//! Both repository write paths (upsert and association replacement) call
//! [`audit_changes`] before committing. The diff covers every tracked
//! attribute of the institution plus the materialized association list; the
//! audit timestamp is never tracked. When at least one attribute changed the
//! caller stamps the bumped version onto the institution and all of its
//! current association rows, then writes the history rows through
//! [`record_history`] inside the same transaction as the mutation itself.

use crate::domain::institution::FinancialInstitution;
use crate::domain::sbl_type::{SblTypeAssociation, SblTypeMapping};
use crate::error::Result;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{Postgres, Transaction};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Attribute name under which the association collection is tracked
pub const SBL_TYPES_ATTR: &str = "sbl_institution_types";

/// Before/after values of one tracked attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Result of a change audit: the bumped version and the changeset to record
#[derive(Debug, Clone, PartialEq)]
pub struct AuditOutcome {
    pub version: i32,
    pub changeset: BTreeMap<String, FieldChange>,
}

/// Diff the about-to-be-written institution state against the prior one.
///
/// Returns `None` when no tracked attribute differs: the mutation is a no-op
/// for auditing purposes and must cause neither a version bump nor a history
/// row. Otherwise the new version is the prior one plus 1, with an absent
/// record treated as version 0.
pub fn audit_changes(
    old: Option<&FinancialInstitution>,
    new: &FinancialInstitution,
    old_types: &[SblTypeAssociation],
    new_types: &[SblTypeAssociation],
) -> Option<AuditOutcome> {
    let new_version = old.map(|o| o.version).unwrap_or(0) + 1;
    let mut changeset = BTreeMap::new();

    macro_rules! track {
        ($field:ident) => {
            let old_value = old.map(|o| json!(o.$field)).unwrap_or(Value::Null);
            let new_value = json!(new.$field);
            if old_value != new_value {
                changeset.insert(
                    stringify!($field).to_string(),
                    FieldChange {
                        old: old_value,
                        new: new_value,
                    },
                );
            }
        };
    }

    track!(lei);
    track!(name);
    track!(is_active);
    track!(tax_id);
    track!(rssd_id);
    track!(primary_federal_regulator_id);
    track!(hmda_institution_type_id);
    track!(hq_address_street_1);
    track!(hq_address_street_2);
    track!(hq_address_street_3);
    track!(hq_address_street_4);
    track!(hq_address_city);
    track!(hq_address_state_code);
    track!(hq_address_zip);
    track!(parent_lei);
    track!(parent_legal_name);
    track!(parent_rssd_id);
    track!(top_holder_lei);
    track!(top_holder_legal_name);
    track!(top_holder_rssd_id);
    track!(modified_by);

    // The association collection diffs as a set; the recorded "new" side is
    // the full materialized list stamped with the version being committed.
    let old_set: BTreeSet<&SblTypeAssociation> = old_types.iter().collect();
    let new_set: BTreeSet<&SblTypeAssociation> = new_types.iter().collect();
    if old_set != new_set {
        changeset.insert(
            SBL_TYPES_ATTR.to_string(),
            FieldChange {
                old: json!(old_set.iter().collect::<Vec<_>>()),
                new: Value::Array(
                    new_set
                        .iter()
                        .map(|a| {
                            json!({
                                "type_id": a.type_id,
                                "details": a.details,
                                "version": new_version,
                            })
                        })
                        .collect(),
                ),
            },
        );
    }

    if changeset.is_empty() {
        None
    } else {
        Some(AuditOutcome {
            version: new_version,
            changeset,
        })
    }
}

/// Serialize a changeset for storage
pub fn changeset_to_value(changeset: &BTreeMap<String, FieldChange>) -> Value {
    json!(changeset)
}

/// Write the history rows for an audited mutation.
///
/// One row mirrors the institution (all tracked columns, the committed
/// version and the serialized changeset); one row per currently-associated
/// type mapping mirrors that mapping's state. Runs on the caller's
/// transaction so a failed history write rolls the mutation back.
pub async fn record_history(
    tx: &mut Transaction<'_, Postgres>,
    institution: &FinancialInstitution,
    mappings: &[SblTypeMapping],
    changeset: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO financial_institutions_history (
            lei, name, is_active, tax_id, rssd_id,
            primary_federal_regulator_id, hmda_institution_type_id,
            hq_address_street_1, hq_address_street_2, hq_address_street_3, hq_address_street_4,
            hq_address_city, hq_address_state_code, hq_address_zip,
            parent_lei, parent_legal_name, parent_rssd_id,
            top_holder_lei, top_holder_legal_name, top_holder_rssd_id,
            version, modified_by, changeset
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23)
        "#,
    )
    .bind(&institution.lei)
    .bind(&institution.name)
    .bind(institution.is_active)
    .bind(&institution.tax_id)
    .bind(institution.rssd_id)
    .bind(&institution.primary_federal_regulator_id)
    .bind(&institution.hmda_institution_type_id)
    .bind(&institution.hq_address_street_1)
    .bind(&institution.hq_address_street_2)
    .bind(&institution.hq_address_street_3)
    .bind(&institution.hq_address_street_4)
    .bind(&institution.hq_address_city)
    .bind(&institution.hq_address_state_code)
    .bind(&institution.hq_address_zip)
    .bind(&institution.parent_lei)
    .bind(&institution.parent_legal_name)
    .bind(institution.parent_rssd_id)
    .bind(&institution.top_holder_lei)
    .bind(&institution.top_holder_legal_name)
    .bind(institution.top_holder_rssd_id)
    .bind(institution.version)
    .bind(&institution.modified_by)
    .bind(changeset)
    .execute(&mut **tx)
    .await?;

    for mapping in mappings {
        sqlx::query(
            r#"
            INSERT INTO fi_to_type_mapping_history (lei, type_id, details, version, modified_by)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&mapping.lei)
        .bind(&mapping.type_id)
        .bind(&mapping.details)
        .bind(mapping.version)
        .bind(&mapping.modified_by)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
