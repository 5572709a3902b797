//! Business logic layer

pub mod institution;
pub mod lookup;

pub use institution::InstitutionService;
pub use lookup::LookupService;
