//! Institution business logic
//!
//! Validation and orchestration only; persistence and the audited write
//! paths live in the repository. A payload that fails validation never
//! reaches the store.

use crate::domain::{
    normalize_associations, AssociatedInstitution, AuthenticatedUser, DomainCreate,
    InstitutionDomain, InstitutionFilter, InstitutionUpsert, InstitutionWithRelations,
    SblTypeAssociation, TypeAssociationInput,
};
use crate::error::{AppError, Result};
use crate::repository::{DeniedDomainRepository, InstitutionRepository};
use std::sync::Arc;
use validator::Validate;

pub struct InstitutionService<R: InstitutionRepository, D: DeniedDomainRepository> {
    repo: Arc<R>,
    denied_repo: Arc<D>,
}

impl<R: InstitutionRepository, D: DeniedDomainRepository> InstitutionService<R, D> {
    pub fn new(repo: Arc<R>, denied_repo: Arc<D>) -> Self {
        Self { repo, denied_repo }
    }

    pub async fn get(&self, lei: &str) -> Result<InstitutionWithRelations> {
        self.repo
            .find(lei)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("institution {lei} not found")))
    }

    pub async fn search(&self, filter: InstitutionFilter) -> Result<Vec<InstitutionWithRelations>> {
        self.repo.list(&filter).await
    }

    /// Create or update an institution from an upsert payload.
    ///
    /// Actors with a denied email domain are rejected before validation or
    /// any store access.
    pub async fn upsert(
        &self,
        payload: InstitutionUpsert,
        acting_user: &AuthenticatedUser,
    ) -> Result<InstitutionWithRelations> {
        self.ensure_actor_domain_allowed(acting_user).await?;
        payload.validate()?;
        let types = payload
            .sbl_institution_types
            .as_deref()
            .map(normalize_associations)
            .transpose()?;
        self.repo.upsert(&payload, types, &acting_user.id).await
    }

    /// Replace the SBL type association set of an existing institution
    pub async fn replace_sbl_types(
        &self,
        lei: &str,
        inputs: &[TypeAssociationInput],
        acting_user: &AuthenticatedUser,
    ) -> Result<InstitutionWithRelations> {
        self.ensure_actor_domain_allowed(acting_user).await?;
        let types: Vec<SblTypeAssociation> = normalize_associations(inputs)?;
        self.repo
            .update_sbl_types(lei, types, &acting_user.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("institution {lei} not found")))
    }

    /// Register email domains under an institution
    pub async fn add_domains(
        &self,
        lei: &str,
        domains: Vec<DomainCreate>,
        acting_user: &AuthenticatedUser,
    ) -> Result<Vec<InstitutionDomain>> {
        self.ensure_actor_domain_allowed(acting_user).await?;
        for domain in &domains {
            domain.validate()?;
        }
        if self.repo.find(lei).await?.is_none() {
            return Err(AppError::NotFound(format!("institution {lei} not found")));
        }
        self.repo.add_domains(lei, domains).await
    }

    /// Institutions associated with the acting user, each flagged with
    /// whether the user's email domain is registered on it
    pub async fn associated(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Vec<AssociatedInstitution>> {
        let leis: Vec<String> = user
            .institutions
            .iter()
            .filter(|lei| !lei.is_empty())
            .cloned()
            .collect();
        if leis.is_empty() {
            return Ok(vec![]);
        }

        let count = leis.len() as i64;
        let institutions = self
            .repo
            .list(&InstitutionFilter {
                leis: Some(leis),
                domain: None,
                page: 0,
                count,
            })
            .await?;

        let email_domain = user.email_domain();
        Ok(institutions
            .into_iter()
            .map(|institution| {
                let approved = email_domain
                    .map(|d| institution.domains.iter().any(|reg| reg.domain == d))
                    .unwrap_or(false);
                AssociatedInstitution {
                    institution,
                    approved,
                }
            })
            .collect())
    }

    /// Whether an email domain may be registered at all
    pub async fn is_domain_allowed(&self, domain: &str) -> Result<bool> {
        Ok(!self.denied_repo.is_denied(domain).await?)
    }

    /// Reject actors whose own email domain is on the deny list before any
    /// domain registration is attempted
    pub async fn ensure_actor_domain_allowed(&self, user: &AuthenticatedUser) -> Result<()> {
        let domain = user
            .email_domain()
            .ok_or_else(|| AppError::Forbidden("actor has no email domain".to_string()))?;
        if self.denied_repo.is_denied(domain).await? {
            return Err(AppError::Forbidden(format!(
                "email domain {domain} is denied"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sbl_type::OTHER_SBL_TYPE_ID;
    use crate::domain::{FinancialInstitution, InstitutionDomain};
    use crate::repository::{MockDeniedDomainRepository, MockInstitutionRepository};
    use chrono::Utc;

    fn service(
        repo: MockInstitutionRepository,
        denied: MockDeniedDomainRepository,
    ) -> InstitutionService<MockInstitutionRepository, MockDeniedDomainRepository> {
        InstitutionService::new(Arc::new(repo), Arc::new(denied))
    }

    fn user(institutions: &[&str], email: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            id: "test_user_id".to_string(),
            name: "Test User".to_string(),
            username: "test_user".to_string(),
            email: email.to_string(),
            scopes: vec![],
            institutions: institutions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn institution_with_domains(lei: &str, domains: &[&str]) -> InstitutionWithRelations {
        InstitutionWithRelations {
            institution: FinancialInstitution {
                lei: lei.to_string(),
                name: "Test Bank 123".to_string(),
                is_active: true,
                tax_id: None,
                rssd_id: None,
                primary_federal_regulator_id: None,
                hmda_institution_type_id: None,
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
                version: 1,
                modified_by: "test_user_id".to_string(),
                event_time: Utc::now(),
            },
            primary_federal_regulator: None,
            hmda_institution_type: None,
            sbl_institution_types: vec![],
            hq_address_state: None,
            domains: domains
                .iter()
                .map(|d| InstitutionDomain {
                    domain: d.to_string(),
                    lei: lei.to_string(),
                })
                .collect(),
        }
    }

    fn valid_upsert() -> InstitutionUpsert {
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

    fn denied_for(denied_domain: &str) -> MockDeniedDomainRepository {
        let denied_domain = denied_domain.to_string();
        let mut denied = MockDeniedDomainRepository::new();
        denied
            .expect_is_denied()
            .returning(move |domain| Ok(domain == denied_domain));
        denied
    }

    #[tokio::test]
    async fn test_upsert_validation_failure_leaves_store_untouched() {
        // No expectations on the institution mock: any call would panic
        let svc = service(MockInstitutionRepository::new(), denied_for("denied.bank"));
        let mut payload = valid_upsert();
        payload.lei = "SHORT".to_string();

        let result = svc.upsert(payload, &user(&[], "a@b.c")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_upsert_denied_actor_rejected_before_store() {
        // Neither validation nor the institution repository runs for a
        // denied-domain actor, admin or not
        let svc = service(MockInstitutionRepository::new(), denied_for("denied.bank"));

        let result = svc.upsert(valid_upsert(), &user(&[], "a@denied.bank")).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_replace_sbl_types_denied_actor_rejected_before_store() {
        let svc = service(MockInstitutionRepository::new(), denied_for("denied.bank"));

        let result = svc
            .replace_sbl_types(
                "TESTBANK123000000000",
                &[TypeAssociationInput::Id("1".to_string())],
                &user(&["TESTBANK123000000000"], "a@denied.bank"),
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_add_domains_denied_actor_rejected_before_store() {
        let svc = service(MockInstitutionRepository::new(), denied_for("denied.bank"));

        let result = svc
            .add_domains(
                "TESTBANK123000000000",
                vec![DomainCreate {
                    domain: "test.bank".to_string(),
                }],
                &user(&["TESTBANK123000000000"], "a@denied.bank"),
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_upsert_invalid_association_leaves_store_untouched() {
        let svc = service(MockInstitutionRepository::new(), denied_for("denied.bank"));
        let mut payload = valid_upsert();
        // "Other" without details never reaches the repository
        payload.sbl_institution_types =
            Some(vec![TypeAssociationInput::Id(OTHER_SBL_TYPE_ID.to_string())]);

        let result = svc.upsert(payload, &user(&[], "a@b.c")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_upsert_passes_normalized_associations() {
        let mut repo = MockInstitutionRepository::new();
        repo.expect_upsert()
            .withf(|payload, types, acting_user| {
                payload.lei == "TESTBANK123000000000"
                    && acting_user == "test_user_id"
                    && types.as_deref()
                        == Some(
                            &[
                                SblTypeAssociation {
                                    type_id: "1".to_string(),
                                    details: None,
                                },
                                SblTypeAssociation {
                                    type_id: "13".to_string(),
                                    details: Some("test".to_string()),
                                },
                            ][..],
                        )
            })
            .returning(|payload, _, _| {
                let lei = payload.lei.clone();
                Ok(institution_with_domains(&lei, &[]))
            });
        let svc = service(repo, denied_for("denied.bank"));

        let mut payload = valid_upsert();
        payload.sbl_institution_types = Some(vec![
            TypeAssociationInput::Id("1".to_string()),
            TypeAssociationInput::Entry {
                id: "13".to_string(),
                details: Some("test".to_string()),
            },
        ]);

        assert!(svc.upsert(payload, &user(&[], "a@b.c")).await.is_ok());
    }

    #[tokio::test]
    async fn test_replace_sbl_types_unknown_lei_is_not_found() {
        let mut repo = MockInstitutionRepository::new();
        repo.expect_update_sbl_types().returning(|_, _, _| Ok(None));
        let svc = service(repo, denied_for("denied.bank"));

        let result = svc
            .replace_sbl_types(
                "UNKNOWNBANK000000000",
                &[TypeAssociationInput::Id("1".to_string())],
                &user(&[], "a@b.c"),
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_replace_sbl_types_invalid_input_never_hits_store() {
        let svc = service(MockInstitutionRepository::new(), denied_for("denied.bank"));
        let result = svc
            .replace_sbl_types(
                "TESTBANK123000000000",
                &[TypeAssociationInput::Id(OTHER_SBL_TYPE_ID.to_string())],
                &user(&[], "a@b.c"),
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_lei_is_not_found() {
        let mut repo = MockInstitutionRepository::new();
        repo.expect_find().returning(|_| Ok(None));
        let svc = service(repo, MockDeniedDomainRepository::new());

        let result = svc.get("UNKNOWNBANK000000000").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_add_domains_unknown_lei_is_not_found() {
        let mut repo = MockInstitutionRepository::new();
        repo.expect_find().returning(|_| Ok(None));
        let svc = service(repo, denied_for("denied.bank"));

        let result = svc
            .add_domains(
                "UNKNOWNBANK000000000",
                vec![DomainCreate {
                    domain: "test.bank".to_string(),
                }],
                &user(&[], "a@test.bank"),
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_associated_without_institutions_short_circuits() {
        // Repository must not be queried for an empty association list
        let svc = service(
            MockInstitutionRepository::new(),
            MockDeniedDomainRepository::new(),
        );
        let result = svc.associated(&user(&[], "test_user@test.bank")).await;
        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_associated_derives_approved_from_email_domain() {
        let mut repo = MockInstitutionRepository::new();
        repo.expect_list().returning(|_| {
            Ok(vec![
                institution_with_domains("TESTBANK123000000000", &["test.bank"]),
                institution_with_domains("TESTBANK234000000000", &["other.bank"]),
            ])
        });
        let svc = service(repo, MockDeniedDomainRepository::new());

        let result = svc
            .associated(&user(
                &["TESTBANK123000000000", "TESTBANK234000000000"],
                "test_user@test.bank",
            ))
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert!(result[0].approved);
        assert!(!result[1].approved);
    }

    #[tokio::test]
    async fn test_ensure_actor_domain_allowed() {
        let mut denied = MockDeniedDomainRepository::new();
        denied
            .expect_is_denied()
            .returning(|domain| Ok(domain == "denied.bank"));
        let svc = service(MockInstitutionRepository::new(), denied);

        assert!(svc
            .ensure_actor_domain_allowed(&user(&[], "a@test.bank"))
            .await
            .is_ok());
        assert!(matches!(
            svc.ensure_actor_domain_allowed(&user(&[], "a@denied.bank"))
                .await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_is_domain_allowed_inverts_deny_list() {
        let mut denied = MockDeniedDomainRepository::new();
        denied
            .expect_is_denied()
            .returning(|domain| Ok(domain == "denied.bank"));
        let svc = service(MockInstitutionRepository::new(), denied);

        assert!(svc.is_domain_allowed("test.bank").await.unwrap());
        assert!(!svc.is_domain_allowed("denied.bank").await.unwrap());
    }
}
