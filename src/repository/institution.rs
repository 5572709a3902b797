//! Financial institution repository
//!
//! All mutating operations run in a single transaction: reconcile the
//! association set, persist the merged record, bump and propagate the
//! version, write the history rows, commit. A mutation that changes no
//! tracked attribute writes nothing.

use crate::audit::{audit_changes, changeset_to_value, record_history};
use crate::domain::{
    reconcile, DomainCreate, FinancialInstitution, InstitutionDomain, InstitutionFilter,
    InstitutionUpsert, InstitutionWithRelations, SblTypeAssociation,
};
use crate::domain::lookup::{AddressState, FederalRegulator, InstitutionType};
use crate::domain::sbl_type::{SblTypeAssociationDetails, SblTypeMapping};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

const INSTITUTION_COLUMNS: &str = r#"
    lei, name, is_active, tax_id, rssd_id,
    primary_federal_regulator_id, hmda_institution_type_id,
    hq_address_street_1, hq_address_street_2, hq_address_street_3, hq_address_street_4,
    hq_address_city, hq_address_state_code, hq_address_zip,
    parent_lei, parent_legal_name, parent_rssd_id,
    top_holder_lei, top_holder_legal_name, top_holder_rssd_id,
    version, modified_by, event_time
"#;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstitutionRepository: Send + Sync {
    async fn find(&self, lei: &str) -> Result<Option<InstitutionWithRelations>>;
    async fn list(&self, filter: &InstitutionFilter) -> Result<Vec<InstitutionWithRelations>>;
    /// Insert or update an institution; `types`, when present, replaces the
    /// association set through the reconciler.
    async fn upsert(
        &self,
        payload: &InstitutionUpsert,
        types: Option<Vec<SblTypeAssociation>>,
        acting_user: &str,
    ) -> Result<InstitutionWithRelations>;
    /// Replace the SBL type association set of an existing institution.
    /// Returns `None` without touching the store when the LEI is unknown.
    async fn update_sbl_types(
        &self,
        lei: &str,
        types: Vec<SblTypeAssociation>,
        acting_user: &str,
    ) -> Result<Option<InstitutionWithRelations>>;
    async fn add_domains(
        &self,
        lei: &str,
        domains: Vec<DomainCreate>,
    ) -> Result<Vec<InstitutionDomain>>;
}

pub struct InstitutionRepositoryImpl {
    pool: PgPool,
}

impl InstitutionRepositoryImpl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_relations(
        &self,
        institution: FinancialInstitution,
    ) -> Result<InstitutionWithRelations> {
        let primary_federal_regulator = match institution.primary_federal_regulator_id.as_deref() {
            Some(id) => {
                sqlx::query_as::<_, FederalRegulator>(
                    "SELECT id, name FROM federal_regulator WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => None,
        };

        let hmda_institution_type = match institution.hmda_institution_type_id.as_deref() {
            Some(id) => {
                sqlx::query_as::<_, InstitutionType>(
                    "SELECT id, name FROM hmda_institution_type WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => None,
        };

        let hq_address_state = sqlx::query_as::<_, AddressState>(
            "SELECT code, name FROM address_state WHERE code = $1",
        )
        .bind(&institution.hq_address_state_code)
        .fetch_optional(&self.pool)
        .await?;

        let sbl_institution_types = sqlx::query_as::<_, (String, String, Option<String>)>(
            r#"
            SELECT t.id, t.name, m.details
            FROM fi_to_type_mapping m
            JOIN sbl_institution_type t ON t.id = m.type_id
            WHERE m.lei = $1
            ORDER BY t.id, m.details
            "#,
        )
        .bind(&institution.lei)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(id, name, details)| SblTypeAssociationDetails {
            sbl_type: InstitutionType { id, name },
            details,
        })
        .collect();

        let domains = sqlx::query_as::<_, InstitutionDomain>(
            r#"
            SELECT domain, lei
            FROM financial_institution_domains
            WHERE lei = $1
            ORDER BY domain
            "#,
        )
        .bind(&institution.lei)
        .fetch_all(&self.pool)
        .await?;

        Ok(InstitutionWithRelations {
            institution,
            primary_federal_regulator,
            hmda_institution_type,
            sbl_institution_types,
            hq_address_state,
            domains,
        })
    }

    async fn find_required(&self, lei: &str) -> Result<InstitutionWithRelations> {
        self.find(lei).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("institution {lei} missing after commit"))
        })
    }
}

/// Select the current institution row inside a transaction, locked for update
async fn select_for_update(
    tx: &mut Transaction<'_, Postgres>,
    lei: &str,
) -> Result<Option<FinancialInstitution>> {
    let institution = sqlx::query_as::<_, FinancialInstitution>(&format!(
        "SELECT {INSTITUTION_COLUMNS} FROM financial_institutions WHERE lei = $1 FOR UPDATE",
    ))
    .bind(lei)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(institution)
}

async fn current_mappings(
    tx: &mut Transaction<'_, Postgres>,
    lei: &str,
) -> Result<Vec<SblTypeMapping>> {
    let mappings = sqlx::query_as::<_, SblTypeMapping>(
        r#"
        SELECT lei, type_id, details, version, modified_by, event_time
        FROM fi_to_type_mapping
        WHERE lei = $1
        ORDER BY type_id, details
        "#,
    )
    .bind(lei)
    .fetch_all(&mut **tx)
    .await?;
    Ok(mappings)
}

/// Apply a reconciliation diff to the mapping table
async fn apply_association_diff(
    tx: &mut Transaction<'_, Postgres>,
    lei: &str,
    existing: &[SblTypeAssociation],
    submitted: &[SblTypeAssociation],
    version: i32,
    acting_user: &str,
) -> Result<()> {
    let diff = reconcile(existing, submitted);

    for removed in &diff.to_remove {
        sqlx::query(
            r#"
            DELETE FROM fi_to_type_mapping
            WHERE lei = $1 AND type_id = $2 AND details IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(lei)
        .bind(&removed.type_id)
        .bind(&removed.details)
        .execute(&mut **tx)
        .await?;
    }

    for added in &diff.to_add {
        sqlx::query(
            r#"
            INSERT INTO fi_to_type_mapping (lei, type_id, details, version, modified_by, event_time)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(lei)
        .bind(&added.type_id)
        .bind(&added.details)
        .bind(version)
        .bind(acting_user)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Stamp the committed version onto every remaining association row
async fn propagate_version(
    tx: &mut Transaction<'_, Postgres>,
    lei: &str,
    version: i32,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE fi_to_type_mapping
        SET version = $1, event_time = NOW()
        WHERE lei = $2 AND version <> $1
        "#,
    )
    .bind(version)
    .bind(lei)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn write_institution(
    tx: &mut Transaction<'_, Postgres>,
    institution: &FinancialInstitution,
    exists: bool,
) -> Result<()> {
    let query = if exists {
        r#"
        UPDATE financial_institutions SET
            name = $2, is_active = $3, tax_id = $4, rssd_id = $5,
            primary_federal_regulator_id = $6, hmda_institution_type_id = $7,
            hq_address_street_1 = $8, hq_address_street_2 = $9,
            hq_address_street_3 = $10, hq_address_street_4 = $11,
            hq_address_city = $12, hq_address_state_code = $13, hq_address_zip = $14,
            parent_lei = $15, parent_legal_name = $16, parent_rssd_id = $17,
            top_holder_lei = $18, top_holder_legal_name = $19, top_holder_rssd_id = $20,
            version = $21, modified_by = $22, event_time = $23
        WHERE lei = $1
        "#
    } else {
        r#"
        INSERT INTO financial_institutions (
            lei, name, is_active, tax_id, rssd_id,
            primary_federal_regulator_id, hmda_institution_type_id,
            hq_address_street_1, hq_address_street_2, hq_address_street_3, hq_address_street_4,
            hq_address_city, hq_address_state_code, hq_address_zip,
            parent_lei, parent_legal_name, parent_rssd_id,
            top_holder_lei, top_holder_legal_name, top_holder_rssd_id,
            version, modified_by, event_time
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23)
        "#
    };

    sqlx::query(query)
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
        .bind(institution.event_time)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl InstitutionRepository for InstitutionRepositoryImpl {
    async fn find(&self, lei: &str) -> Result<Option<InstitutionWithRelations>> {
        let institution = sqlx::query_as::<_, FinancialInstitution>(&format!(
            "SELECT {INSTITUTION_COLUMNS} FROM financial_institutions WHERE lei = $1",
        ))
        .bind(lei)
        .fetch_optional(&self.pool)
        .await?;

        match institution {
            Some(institution) => Ok(Some(self.load_relations(institution).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &InstitutionFilter) -> Result<Vec<InstitutionWithRelations>> {
        let offset = filter.page * filter.count;

        let institutions = if let Some(leis) = filter.leis.as_ref() {
            sqlx::query_as::<_, FinancialInstitution>(&format!(
                r#"
                SELECT {INSTITUTION_COLUMNS}
                FROM financial_institutions
                WHERE lei = ANY($1)
                ORDER BY lei
                LIMIT $2 OFFSET $3
                "#,
            ))
            .bind(leis)
            .bind(filter.count)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        } else if let Some(domain) = filter.domain.as_ref() {
            sqlx::query_as::<_, FinancialInstitution>(&format!(
                r#"
                SELECT {INSTITUTION_COLUMNS}
                FROM financial_institutions
                WHERE lei IN (
                    SELECT lei FROM financial_institution_domains WHERE domain = $1
                )
                ORDER BY lei
                LIMIT $2 OFFSET $3
                "#,
            ))
            .bind(domain)
            .bind(filter.count)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, FinancialInstitution>(&format!(
                r#"
                SELECT {INSTITUTION_COLUMNS}
                FROM financial_institutions
                ORDER BY lei
                LIMIT $1 OFFSET $2
                "#,
            ))
            .bind(filter.count)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
        };

        let mut results = Vec::with_capacity(institutions.len());
        for institution in institutions {
            results.push(self.load_relations(institution).await?);
        }
        Ok(results)
    }

    async fn upsert(
        &self,
        payload: &InstitutionUpsert,
        types: Option<Vec<SblTypeAssociation>>,
        acting_user: &str,
    ) -> Result<InstitutionWithRelations> {
        let mut tx = self.pool.begin().await?;

        let existing = select_for_update(&mut tx, &payload.lei).await?;
        let old_mappings = current_mappings(&mut tx, &payload.lei).await?;
        let old_types: Vec<SblTypeAssociation> =
            old_mappings.iter().map(SblTypeAssociation::from).collect();

        let mut merged = payload.merge_onto(existing.as_ref(), acting_user);
        // An absent association list leaves the persisted set untouched
        let new_types = types.clone().unwrap_or_else(|| old_types.clone());

        let Some(outcome) = audit_changes(existing.as_ref(), &merged, &old_types, &new_types)
        else {
            tx.rollback().await?;
            return self.find_required(&payload.lei).await;
        };

        merged.version = outcome.version;
        write_institution(&mut tx, &merged, existing.is_some()).await?;

        if types.is_some() {
            apply_association_diff(
                &mut tx,
                &merged.lei,
                &old_types,
                &new_types,
                outcome.version,
                acting_user,
            )
            .await?;
        }
        propagate_version(&mut tx, &merged.lei, outcome.version).await?;

        let mappings = current_mappings(&mut tx, &merged.lei).await?;
        record_history(
            &mut tx,
            &merged,
            &mappings,
            &changeset_to_value(&outcome.changeset),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(lei = %merged.lei, version = merged.version, "institution upserted");
        self.find_required(&merged.lei).await
    }

    async fn update_sbl_types(
        &self,
        lei: &str,
        types: Vec<SblTypeAssociation>,
        acting_user: &str,
    ) -> Result<Option<InstitutionWithRelations>> {
        let mut tx = self.pool.begin().await?;

        let Some(mut existing) = select_for_update(&mut tx, lei).await? else {
            // Unknown LEI: distinct no-op, nothing written
            tx.rollback().await?;
            return Ok(None);
        };

        let old_mappings = current_mappings(&mut tx, lei).await?;
        let old_types: Vec<SblTypeAssociation> =
            old_mappings.iter().map(SblTypeAssociation::from).collect();

        let snapshot = existing.clone();
        let Some(outcome) = audit_changes(Some(&snapshot), &snapshot, &old_types, &types) else {
            tx.rollback().await?;
            return Ok(Some(self.find_required(lei).await?));
        };

        // The institution row only carries the bumped version; the acting
        // user is recorded on the association rows, not on the institution.
        existing.version = outcome.version;
        sqlx::query(
            "UPDATE financial_institutions SET version = $1, event_time = NOW() WHERE lei = $2",
        )
        .bind(outcome.version)
        .bind(lei)
        .execute(&mut *tx)
        .await?;

        apply_association_diff(&mut tx, lei, &old_types, &types, outcome.version, acting_user)
            .await?;
        propagate_version(&mut tx, lei, outcome.version).await?;

        let mappings = current_mappings(&mut tx, lei).await?;
        record_history(
            &mut tx,
            &existing,
            &mappings,
            &changeset_to_value(&outcome.changeset),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(lei = %lei, version = outcome.version, "sbl type associations replaced");
        Ok(Some(self.find_required(lei).await?))
    }

    async fn add_domains(
        &self,
        lei: &str,
        domains: Vec<DomainCreate>,
    ) -> Result<Vec<InstitutionDomain>> {
        let mut tx = self.pool.begin().await?;

        for create in &domains {
            sqlx::query(
                r#"
                INSERT INTO financial_institution_domains (domain, lei)
                VALUES ($1, $2)
                ON CONFLICT (domain, lei) DO NOTHING
                "#,
            )
            .bind(&create.domain)
            .bind(lei)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let registered = sqlx::query_as::<_, InstitutionDomain>(
            r#"
            SELECT domain, lei
            FROM financial_institution_domains
            WHERE lei = $1 AND domain = ANY($2)
            ORDER BY domain
            "#,
        )
        .bind(lei)
        .bind(
            domains
                .iter()
                .map(|d| d.domain.clone())
                .collect::<Vec<String>>(),
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(registered)
    }
}
