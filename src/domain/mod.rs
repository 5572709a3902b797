//! Domain models and DTOs

pub mod auth;
pub mod institution;
pub mod lookup;
pub mod sbl_type;

pub use auth::AuthenticatedUser;
pub use institution::{
    AssociatedInstitution, DomainCreate, FinancialInstitution, InstitutionDomain,
    InstitutionFilter, InstitutionUpsert, InstitutionWithRelations,
};
pub use lookup::{AddressState, DeniedDomain, FederalRegulator, InstitutionType};
pub use sbl_type::{
    normalize_associations, reconcile, AssociationDiff, SblTypeAssociation,
    SblTypeAssociationDetails, SblTypeAssociationPatch, SblTypeMapping, TypeAssociationInput,
    OTHER_SBL_TYPE_ID,
};
