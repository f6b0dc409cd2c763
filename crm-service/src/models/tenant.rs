//! Tenant accounts. A tenant is the login owner of every other record.
//!
//! Every account is also a tenant; `admin` accounts may additionally manage
//! the other accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Strict parse, for values supplied by callers.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Lenient read of a stored value. Anything unknown has no privileges.
    pub fn from_string(s: &str) -> Self {
        Self::parse(s).unwrap_or(Role::User)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub company_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn role(&self) -> Role {
        Role::from_string(&self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }
}

/// Tenant as returned over HTTP; never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub company_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Tenant> for TenantProfile {
    fn from(t: Tenant) -> Self {
        let role = t.role();
        Self {
            id: t.tenant_id,
            email: t.email,
            name: t.name,
            role,
            company_name: t.company_name,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTenant {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[serde(alias = "currentPassword")]
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[serde(alias = "newPassword")]
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Role change requested by an admin. The value is checked by the handler so
/// that an unknown role reads as a plain 400.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleUpdate {
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_strictly_and_read_leniently() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("Admin"), None);
        assert_eq!(Role::parse("owner"), None);
        assert_eq!(Role::from_string("owner"), Role::User);
        assert_eq!(Role::from_string("admin"), Role::Admin);
    }

    #[test]
    fn password_change_accepts_camel_case_fields() {
        let req: ChangePasswordRequest = serde_json::from_str(
            r#"{"currentPassword": "old-password", "newPassword": "new-password"}"#,
        )
        .unwrap();
        assert_eq!(req.current_password, "old-password");
        assert!(req.validate().is_ok());

        let short: ChangePasswordRequest =
            serde_json::from_str(r#"{"current_password": "x", "new_password": "short"}"#).unwrap();
        assert!(short.validate().is_err());
    }
}
