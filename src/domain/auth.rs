//! Authenticated identity as consumed from the identity provider

use serde::{Deserialize, Serialize};

/// Identity of the acting user, sourced from a verified bearer token.
///
/// The identity provider owns accounts and group membership; this service
/// only reads the claims it needs: an opaque id, permission scopes and the
/// list of associated institutions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    /// Permission scopes granted by the identity provider
    pub scopes: Vec<String>,
    /// LEIs of institutions the user is associated with
    pub institutions: Vec<String>,
}

impl AuthenticatedUser {
    /// Parse the institution list returned by the identity provider.
    ///
    /// Institutions arrive as full group paths which may be nested,
    /// e.g. `"/ROOT/CHILD/GRAND_CHILD"`; only the leaf segment names the
    /// institution.
    pub fn parse_institutions(institutions: Option<&[String]>) -> Vec<String> {
        institutions
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(|path| path.split('/').next_back())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Domain part of the user's email address, if any
    pub fn email_domain(&self) -> Option<&str> {
        email_domain(&self.email)
    }
}

/// Extract the domain part of an email address
pub fn email_domain(email: &str) -> Option<&str> {
    if email.is_empty() {
        return None;
    }
    email.rsplit('@').next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_institutions_takes_leaf_segment() {
        let paths = vec![
            "/ROOT_INSTITUTION/CHILD_INSTITUTION/GRAND_CHILD_INSTITUTION".to_string(),
            "/TESTBANK123".to_string(),
        ];
        let parsed = AuthenticatedUser::parse_institutions(Some(&paths));
        assert_eq!(parsed, vec!["GRAND_CHILD_INSTITUTION", "TESTBANK123"]);
    }

    #[test]
    fn test_parse_institutions_none() {
        assert!(AuthenticatedUser::parse_institutions(None).is_empty());
    }

    #[test]
    fn test_email_domain() {
        assert_eq!(email_domain("user@test.bank"), Some("test.bank"));
        assert_eq!(email_domain(""), None);
    }
}
