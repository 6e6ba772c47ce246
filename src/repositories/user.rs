//! # User Repository
//!
//! Account CRUD. Authorization is decided by [`crate::policy`] before any of
//! these are called; this layer owns validation, email uniqueness and
//! password hashing.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, ModelTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::auth::hash_password;
use crate::error::RepositoryError;
use crate::models::user::{self, ActiveModel as UserActiveModel, Entity as User};
use crate::models::{Role, tenant};

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
        .unwrap_or_else(|e| unreachable!("email pattern is valid: {e}"))
});

/// Input for creating a tenant-scoped account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub tenant_id: Uuid,
}

/// Partial update of an account.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    /// Re-hashed when present
    pub password: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub struct UserRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: NewUser) -> Result<user::Model, RepositoryError> {
        let email = validate_email(&request.email)?;
        let name = validate_name(&request.name)?;
        validate_password(&request.password)?;
        validate_assignable_role(request.role)?;

        if tenant::Entity::find_by_id(request.tenant_id)
            .one(self.db)
            .await?
            .is_none()
        {
            return Err(RepositoryError::validation(
                "tenantId",
                "Tenant does not exist",
            ));
        }

        self.ensure_email_available(&email, None).await?;

        let password_hash = hash(&request.password)?;

        let now = Utc::now();
        let created = UserActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            name: Set(Some(name)),
            password_hash: Set(password_hash),
            role: Set(request.role.as_str().to_string()),
            tenant_id: Set(Some(request.tenant_id)),
            is_active: Set(true),
            last_login_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db)
        .await?;

        tracing::info!(
            user_id = %created.id,
            tenant_id = ?created.tenant_id,
            role = %created.role,
            "User created"
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        existing: user::Model,
        change: UserUpdate,
    ) -> Result<user::Model, RepositoryError> {
        let user_id = existing.id;
        let current_email = existing.email.clone();
        let current_role = existing.role();
        let has_tenant = existing.tenant_id.is_some();
        let mut active = existing.into_active_model();

        if let Some(email) = change.email {
            let email = validate_email(&email)?;
            if email != current_email {
                self.ensure_email_available(&email, Some(user_id)).await?;
            }
            active.email = Set(email);
        }
        if let Some(name) = change.name {
            active.name = Set(Some(validate_name(&name)?));
        }
        if let Some(password) = change.password {
            validate_password(&password)?;
            active.password_hash = Set(hash(&password)?);
        }
        if let Some(role) = change.role
            && role != current_role
        {
            validate_assignable_role(role)?;
            validate_role_has_tenant(role, has_tenant)?;
            active.role = Set(role.as_str().to_string());
        }
        if let Some(is_active) = change.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(self.db).await?;
        tracing::info!(user_id = %updated.id, role = %updated.role, "User updated");
        Ok(updated)
    }

    pub async fn delete(&self, existing: user::Model) -> Result<(), RepositoryError> {
        let user_id = existing.id;
        existing.delete(self.db).await?;
        tracing::info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<user::Model>, RepositoryError> {
        Ok(User::find_by_id(id).one(self.db).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, RepositoryError> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db)
            .await?)
    }

    /// Accounts, newest first, for one tenant or all.
    pub async fn list(&self, tenant_id: Option<Uuid>) -> Result<Vec<user::Model>, RepositoryError> {
        let mut query = User::find().order_by_desc(user::Column::CreatedAt);
        if let Some(tenant_id) = tenant_id {
            query = query.filter(user::Column::TenantId.eq(tenant_id));
        }
        Ok(query.all(self.db).await?)
    }

    /// Create or reset the bootstrap SUPER_ADMIN account.
    ///
    /// An existing account with the email is promoted, reactivated and given
    /// the new password.
    pub async fn upsert_super_admin(
        &self,
        email: &str,
        password: &str,
    ) -> Result<user::Model, RepositoryError> {
        let email = validate_email(email)?;
        validate_password(password)?;
        let password_hash = hash(password)?;
        let now = Utc::now();

        let saved = match self.find_by_email(&email).await? {
            Some(existing) => {
                let mut active = existing.into_active_model();
                active.password_hash = Set(password_hash);
                active.role = Set(Role::SuperAdmin.as_str().to_string());
                active.tenant_id = Set(None);
                active.is_active = Set(true);
                active.updated_at = Set(now.into());
                active.update(self.db).await?
            }
            None => {
                UserActiveModel {
                    id: Set(Uuid::new_v4()),
                    email: Set(email),
                    name: Set(Some("Super Admin".to_string())),
                    password_hash: Set(password_hash),
                    role: Set(Role::SuperAdmin.as_str().to_string()),
                    tenant_id: Set(None),
                    is_active: Set(true),
                    last_login_at: Set(None),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                }
                .insert(self.db)
                .await?
            }
        };

        tracing::info!(user_id = %saved.id, "Super admin account ensured");
        Ok(saved)
    }

    async fn ensure_email_available(
        &self,
        email: &str,
        except: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        match self.find_by_email(email).await? {
            Some(other) if Some(other.id) != except => Err(RepositoryError::Conflict(
                "A user with this email already exists".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn hash(password: &str) -> Result<String, RepositoryError> {
    hash_password(password).map_err(|e| RepositoryError::Database(DbErr::Custom(e.to_string())))
}

fn validate_email(email: &str) -> Result<String, RepositoryError> {
    let email = email.trim();
    if !EMAIL.is_match(email) {
        return Err(RepositoryError::validation("email", "Invalid email address"));
    }
    Ok(email.to_string())
}

fn validate_name(name: &str) -> Result<String, RepositoryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RepositoryError::validation("name", "Name is required"));
    }
    Ok(name.to_string())
}

fn validate_password(password: &str) -> Result<(), RepositoryError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(RepositoryError::validation(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

fn validate_assignable_role(role: Role) -> Result<(), RepositoryError> {
    match role {
        Role::Admin | Role::Editor | Role::Viewer => Ok(()),
        Role::SuperAdmin => Err(RepositoryError::validation(
            "role",
            "Role must be one of ADMIN, EDITOR, VIEWER",
        )),
    }
}

/// Only SUPER_ADMIN accounts live outside a tenant.
fn validate_role_has_tenant(role: Role, has_tenant: bool) -> Result<(), RepositoryError> {
    if role != Role::SuperAdmin && !has_tenant {
        return Err(RepositoryError::validation(
            "role",
            "An account without a tenant must remain a super admin",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert_eq!(validate_email(" ed@acme.test ").unwrap(), "ed@acme.test");
        for bad in ["", "ed", "ed@", "@acme.test", "ed@acme", "e d@acme.test"] {
            assert!(validate_email(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn password_minimum_length() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn super_admin_is_not_assignable() {
        assert!(validate_assignable_role(Role::SuperAdmin).is_err());
        assert!(validate_assignable_role(Role::Admin).is_ok());
    }

    #[test]
    fn tenantless_accounts_stay_super_admin() {
        assert!(validate_role_has_tenant(Role::Editor, false).is_err());
        assert!(validate_role_has_tenant(Role::Admin, false).is_err());
        assert!(validate_role_has_tenant(Role::Editor, true).is_ok());
    }
}
