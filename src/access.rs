use serde::Serialize;

/// What the current caller may do with the table and its side stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Viewer,
}

/// Identity resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub email: Option<String>,
    pub role: Role,
}

impl Actor {
    pub fn admin(email: impl Into<String>) -> Self {
        Actor {
            email: Some(email.into()),
            role: Role::Admin,
        }
    }

    pub fn viewer(email: Option<String>) -> Self {
        Actor {
            email,
            role: Role::Viewer,
        }
    }

    /// Anonymous read-only caller.
    pub fn anonymous() -> Self {
        Actor::viewer(None)
    }

    pub fn can_edit(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Maps an authenticated email to a [`Role`].
///
/// Exactly one identity is the administrator; everyone else can read only.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    admin_email: Option<String>,
}

impl AccessPolicy {
    pub fn new(admin_email: Option<String>) -> Self {
        let admin_email = admin_email
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty());
        AccessPolicy { admin_email }
    }

    pub fn admin_email(&self) -> Option<&str> {
        self.admin_email.as_deref()
    }

    pub fn resolve(&self, email: Option<&str>) -> Actor {
        let email = email.map(str::trim).filter(|email| !email.is_empty());
        match (email, self.admin_email.as_deref()) {
            (Some(email), Some(admin)) if email.eq_ignore_ascii_case(admin) => Actor::admin(email),
            (email, _) => Actor::viewer(email.map(str::to_string)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_configured_email_is_admin() {
        let policy = AccessPolicy::new(Some("owner@example.com".into()));
        assert!(policy.resolve(Some("Owner@Example.com ")).can_edit());
        assert!(!policy.resolve(Some("guest@example.com")).can_edit());
        assert!(!policy.resolve(None).can_edit());
    }

    #[test]
    fn no_admin_configured_means_read_only() {
        let policy = AccessPolicy::new(Some("   ".into()));
        assert_eq!(policy.admin_email(), None);
        assert_eq!(policy.resolve(Some("anyone@example.com")).role, Role::Viewer);
    }
}
