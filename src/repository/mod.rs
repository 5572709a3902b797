//! Data access layer
//!
//! Repositories own all SQL; services depend on the traits so unit tests can
//! substitute mocks.

pub mod denied_domain;
pub mod institution;
pub mod lookup;

pub use denied_domain::{DeniedDomainRepository, DeniedDomainRepositoryImpl};
pub use institution::{InstitutionRepository, InstitutionRepositoryImpl};
pub use lookup::{LookupRepository, LookupRepositoryImpl};

#[cfg(test)]
pub use denied_domain::MockDeniedDomainRepository;
#[cfg(test)]
pub use institution::MockInstitutionRepository;
#[cfg(test)]
pub use lookup::MockLookupRepository;
