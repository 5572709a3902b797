//! Access control decisions shared by the API handlers
//!
//! The identity provider grants scopes and institution associations; the
//! guard turns those claims into allow/deny decisions. Admins (users holding
//! every configured admin scope) bypass the association checks.

use crate::domain::AuthenticatedUser;
use crate::error::{AppError, Result};
use std::collections::HashSet;

/// Policy evaluator configured with the admin scope set
#[derive(Debug, Clone)]
pub struct AccessGuard {
    admin_scopes: HashSet<String>,
}

impl AccessGuard {
    pub fn new(admin_scopes: HashSet<String>) -> Self {
        Self { admin_scopes }
    }

    /// A user is an admin when their scopes cover every admin scope
    pub fn is_admin(&self, user: &AuthenticatedUser) -> bool {
        let granted: HashSet<&str> = user.scopes.iter().map(String::as_str).collect();
        self.admin_scopes
            .iter()
            .all(|scope| granted.contains(scope.as_str()))
    }

    /// Require the admin scope set, for admin-only operations
    pub fn require_admin(&self, user: &AuthenticatedUser) -> Result<()> {
        if self.is_admin(user) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "admin privileges required".to_string(),
            ))
        }
    }

    /// Require that the user is associated with the given LEI.
    ///
    /// Admins may act on any institution.
    pub fn require_lei_association(&self, user: &AuthenticatedUser, lei: &str) -> Result<()> {
        if self.is_admin(user) {
            return Ok(());
        }
        if user.institutions.iter().any(|i| i == lei) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "user is not associated with institution {lei}"
            )))
        }
    }

    /// Gate an institution search by the requested filters.
    ///
    /// Admins search freely. Non-admins must either filter by LEIs they are
    /// associated with, or filter by the domain of their own email address;
    /// an unfiltered search is forbidden. Empty-string entries in the LEI
    /// filter and the user's association list are ignored.
    pub fn require_search_association(
        &self,
        user: &AuthenticatedUser,
        leis: Option<&[String]>,
        domain: Option<&str>,
    ) -> Result<()> {
        if self.is_admin(user) {
            return Ok(());
        }

        if let Some(leis) = leis.filter(|l| !l.is_empty()) {
            let associated: HashSet<&str> = user
                .institutions
                .iter()
                .map(String::as_str)
                .filter(|lei| !lei.is_empty())
                .collect();
            let requested: HashSet<&str> = leis
                .iter()
                .map(String::as_str)
                .filter(|lei| !lei.is_empty())
                .collect();
            if requested.is_subset(&associated) {
                return Ok(());
            }
            return Err(AppError::Forbidden(
                "search filtered by institutions the user is not associated with".to_string(),
            ));
        }

        if let Some(domain) = domain {
            if user.email_domain() == Some(domain) {
                return Ok(());
            }
            return Err(AppError::Forbidden(
                "search filtered by a domain that is not the user's email domain".to_string(),
            ));
        }

        Err(AppError::Forbidden(
            "unfiltered institution search requires admin privileges".to_string(),
        ))
    }
}
