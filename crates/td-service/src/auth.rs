//! # Authorization and Company Settings
//!
//! Ports to the surrounding platform. The service only needs to know which
//! companies a user belongs to and two per-company settings used by the
//! takeover signatures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use td_core::{Bsd, PartyRole, Siret, UserId};

/// An authenticated user and the companies it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub companies: Vec<Siret>,
}

impl User {
    pub fn new(id: impl Into<String>, companies: Vec<Siret>) -> Self {
        Self {
            id: UserId(id.into()),
            companies,
        }
    }
}

/// Membership and role checks.
pub trait Authorizer: Send + Sync + 'static {
    fn is_company_member(&self, user: &User, siret: &Siret) -> bool;
}

/// The first company of `user` holding one of `roles` on `document`.
pub fn acting_company<T: Bsd>(
    authorizer: &dyn Authorizer,
    user: &User,
    document: &T,
    roles: &[PartyRole],
) -> Option<Siret> {
    document
        .parties()
        .into_iter()
        .filter(|p| roles.contains(&p.role))
        .find(|p| authorizer.is_company_member(user, &p.siret))
        .map(|p| p.siret)
}

/// Trusts the company list carried by the user.
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipAuthorizer;

impl Authorizer for MembershipAuthorizer {
    fn is_company_member(&self, user: &User, siret: &Siret) -> bool {
        user.companies.contains(siret)
    }
}

/// Company settings consulted when signing.
#[async_trait]
pub trait CompanyDirectory: Send + Sync + 'static {
    /// The company's current security code, if it has one.
    async fn security_code(&self, siret: &Siret) -> Option<String>;

    /// Whether the company lets transporters take waste over without its
    /// emission signature.
    async fn allows_direct_takeover(&self, siret: &Siret) -> bool;
}

#[derive(Debug, Clone, Default)]
struct CompanySettings {
    security_code: Option<String>,
    direct_takeover: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCompanyDirectory {
    companies: Arc<RwLock<HashMap<Siret, CompanySettings>>>,
}

impl InMemoryCompanyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_security_code(&self, siret: Siret, code: impl Into<String>) {
        self.companies.write().entry(siret).or_default().security_code = Some(code.into());
    }

    pub fn set_direct_takeover(&self, siret: Siret, allowed: bool) {
        self.companies.write().entry(siret).or_default().direct_takeover = allowed;
    }
}

#[async_trait]
impl CompanyDirectory for InMemoryCompanyDirectory {
    async fn security_code(&self, siret: &Siret) -> Option<String> {
        self.companies.read().get(siret).and_then(|c| c.security_code.clone())
    }

    async fn allows_direct_takeover(&self, siret: &Siret) -> bool {
        self.companies.read().get(siret).map_or(false, |c| c.direct_takeover)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use td_core::BsdId;
    use td_state::Form;

    fn siret(n: char) -> Siret {
        Siret::parse(&n.to_string().repeat(14)).unwrap()
    }

    #[test]
    fn test_acting_company_picks_member_with_role() {
        let form = Form {
            emitter_company_siret: Some(siret('1')),
            recipient_company_siret: Some(siret('2')),
            ..Form::new(BsdId::from("BSD-1"))
        };
        let user = User::new("u", vec![siret('2')]);
        let auth = MembershipAuthorizer;
        assert_eq!(
            acting_company(&auth, &user, &form, &[PartyRole::Destination]),
            Some(siret('2'))
        );
        assert_eq!(acting_company(&auth, &user, &form, &[PartyRole::Emitter]), None);
    }

    #[tokio::test]
    async fn test_directory_settings() {
        let directory = InMemoryCompanyDirectory::new();
        directory.set_security_code(siret('1'), "1234");
        directory.set_direct_takeover(siret('1'), true);
        assert_eq!(directory.security_code(&siret('1')).await.as_deref(), Some("1234"));
        assert!(directory.allows_direct_takeover(&siret('1')).await);
        assert!(!directory.allows_direct_takeover(&siret('2')).await);
    }
}
