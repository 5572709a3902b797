//! SBL institution type associations and the association reconciler
//!
//! An institution is linked to SBL institution types through a join entity
//! that carries its own metadata (free-text `details` for the "Other" type,
//! a `version` mirroring the parent institution). Reconciliation of a
//! submitted association list against the persisted one is a pure set diff
//! keyed by (type id, details) value equality.

use crate::domain::lookup::InstitutionType;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;

/// Sentinel type id whose associations require free-text details
pub const OTHER_SBL_TYPE_ID: &str = "13";

/// Persisted association row between an institution and an SBL type
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SblTypeMapping {
    pub lei: String,
    pub type_id: String,
    pub details: Option<String>,
    pub version: i32,
    pub modified_by: String,
    pub event_time: DateTime<Utc>,
}

/// Value view of an association, used for diffing and submission.
///
/// Equality is by (type id, details); a details edit on an existing type id
/// is therefore expressed as a remove+add pair, never an in-place update.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SblTypeAssociation {
    pub type_id: String,
    pub details: Option<String>,
}

impl From<&SblTypeMapping> for SblTypeAssociation {
    fn from(mapping: &SblTypeMapping) -> Self {
        Self {
            type_id: mapping.type_id.clone(),
            details: mapping.details.clone(),
        }
    }
}

/// A submitted association: either a bare type id or a structured entry
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeAssociationInput {
    Id(String),
    Entry { id: String, details: Option<String> },
}

impl TypeAssociationInput {
    /// Validate and normalize a submitted association.
    ///
    /// The "Other" type requires non-empty details; every other type id has
    /// its details forced to null regardless of input.
    pub fn normalize(&self) -> Result<SblTypeAssociation> {
        let (id, details) = match self {
            TypeAssociationInput::Id(id) => (id.clone(), None),
            TypeAssociationInput::Entry { id, details } => (id.clone(), details.clone()),
        };
        if id == OTHER_SBL_TYPE_ID {
            match details {
                Some(d) if !d.trim().is_empty() => Ok(SblTypeAssociation {
                    type_id: id,
                    details: Some(d),
                }),
                _ => Err(AppError::Validation(format!(
                    "SBL institution type '{OTHER_SBL_TYPE_ID}' requires additional details"
                ))),
            }
        } else {
            Ok(SblTypeAssociation {
                type_id: id,
                details: None,
            })
        }
    }
}

/// Normalize a full submitted association list.
///
/// The association identity is (institution, type id), so a list naming the
/// same type id twice is rejected.
pub fn normalize_associations(inputs: &[TypeAssociationInput]) -> Result<Vec<SblTypeAssociation>> {
    let mut seen = BTreeSet::new();
    inputs
        .iter()
        .map(|input| {
            let assoc = input.normalize()?;
            if !seen.insert(assoc.type_id.clone()) {
                return Err(AppError::Validation(format!(
                    "duplicate SBL institution type id '{}'",
                    assoc.type_id
                )));
            }
            Ok(assoc)
        })
        .collect()
}

/// Minimal add/remove operations produced by [`reconcile`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationDiff {
    pub to_add: Vec<SblTypeAssociation>,
    pub to_remove: Vec<SblTypeAssociation>,
}

impl AssociationDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the symmetric difference between the persisted association set
/// and a submitted one.
///
/// Pure function; the caller applies the diff transactionally. Output order
/// is deterministic (sorted by type id, then details).
pub fn reconcile(
    existing: &[SblTypeAssociation],
    submitted: &[SblTypeAssociation],
) -> AssociationDiff {
    let existing: BTreeSet<&SblTypeAssociation> = existing.iter().collect();
    let submitted: BTreeSet<&SblTypeAssociation> = submitted.iter().collect();

    AssociationDiff {
        to_add: submitted
            .difference(&existing)
            .map(|a| (*a).clone())
            .collect(),
        to_remove: existing
            .difference(&submitted)
            .map(|a| (*a).clone())
            .collect(),
    }
}

/// Association as serialized in API responses, with the type resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SblTypeAssociationDetails {
    pub sbl_type: InstitutionType,
    pub details: Option<String>,
}

/// Body of the association-replacement endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SblTypeAssociationPatch {
    pub sbl_institution_types: Vec<TypeAssociationInput>,
}
