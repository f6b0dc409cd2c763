//! Startup provisioning of the configured admin account.

use service_core::error::AppError;
use tracing::{info, instrument};

use crate::config::AdminSeed;
use crate::models::{NewTenant, Role, Tenant};
use crate::services::storage::Storage;
use crate::utils::{hash_password, Password};

/// Make sure the configured account exists and holds the admin role. An
/// existing account is promoted; its password is left alone.
#[instrument(skip(storage, seed), fields(email = %seed.email))]
pub async fn ensure_admin(storage: &dyn Storage, seed: &AdminSeed) -> Result<Tenant, AppError> {
    let email = seed.email.trim().to_lowercase();

    if let Some(existing) = storage.find_tenant_by_email(&email).await? {
        if existing.is_admin() {
            return Ok(existing);
        }
        let promoted = storage
            .update_tenant_role(existing.tenant_id, Role::Admin)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Admin account vanished")))?;
        info!(tenant_id = %promoted.tenant_id, "Existing account promoted to admin");
        return Ok(promoted);
    }

    let password_hash = hash_password(&Password::new(seed.password.clone()))?;
    let created = storage
        .create_tenant(&NewTenant {
            email,
            password_hash: password_hash.into_string(),
            name: seed.name.clone(),
            role: Role::Admin,
            company_name: None,
        })
        .await?;
    info!(tenant_id = %created.tenant_id, "Admin account created");
    Ok(created)
}
