//! # Authorization Policy
//!
//! Pure decisions over a [`SessionUser`] and a target tenant or account. No
//! I/O happens here; handlers load the target first and ask.
//!
//! Denials come in two flavours. [`PolicyError::Forbidden`] means the caller
//! may see the target but not act on it. [`PolicyError::OutOfScope`] means
//! the target lives in a tenant the caller cannot see at all, and is reported
//! exactly like a missing record.

use thiserror::Error;
use uuid::Uuid;

use crate::auth::SessionUser;
use crate::error::{ApiError, RepositoryError, forbidden};
use crate::models::Role;

/// Reason an operation was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("{0}")]
    Forbidden(&'static str),
    /// The named resource is outside the caller's tenant scope
    #[error("{0} not found")]
    OutOfScope(&'static str),
}

const INSUFFICIENT: &str = "Insufficient permissions";

impl From<PolicyError> for RepositoryError {
    fn from(error: PolicyError) -> Self {
        match error {
            PolicyError::Forbidden(message) => RepositoryError::Forbidden(message.to_string()),
            PolicyError::OutOfScope(resource) => RepositoryError::not_found(resource),
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(error: PolicyError) -> Self {
        match error {
            PolicyError::Forbidden(message) => forbidden(Some(message)),
            out_of_scope => RepositoryError::from(out_of_scope).into(),
        }
    }
}

/// Target of a user-management operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserTarget {
    pub id: Uuid,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
}

impl From<&crate::models::user::Model> for UserTarget {
    fn from(user: &crate::models::user::Model) -> Self {
        Self {
            id: user.id,
            role: user.role(),
            tenant_id: user.tenant_id,
        }
    }
}

/// Fields of a user update that are subject to escalation rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserChange {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub fn is_super_admin(session: &SessionUser) -> bool {
    session.role == Role::SuperAdmin
}

fn is_member(session: &SessionUser, tenant_id: Uuid) -> bool {
    session.tenant_id == Some(tenant_id)
}

fn is_tenant_admin(session: &SessionUser, tenant_id: Uuid) -> bool {
    session.role == Role::Admin && is_member(session, tenant_id)
}

/// Whether the caller may see data of `tenant_id`.
pub fn can_view_tenant(session: &SessionUser, tenant_id: Uuid) -> bool {
    is_super_admin(session) || is_member(session, tenant_id)
}

/// SUPER_ADMIN, or an ADMIN/EDITOR of that tenant.
pub fn can_edit_pages(session: &SessionUser, tenant_id: Uuid) -> bool {
    is_super_admin(session)
        || (is_member(session, tenant_id) && matches!(session.role, Role::Admin | Role::Editor))
}

/// Gate for any mutation scoped to `tenant_id`.
pub fn require_tenant(session: &SessionUser, tenant_id: Uuid) -> Result<(), PolicyError> {
    if can_view_tenant(session, tenant_id) {
        Ok(())
    } else {
        Err(PolicyError::Forbidden(INSUFFICIENT))
    }
}

/// Gate for reading a record of `tenant_id` addressed by its own id.
pub fn require_visible(
    session: &SessionUser,
    tenant_id: Uuid,
    resource: &'static str,
) -> Result<(), PolicyError> {
    if can_view_tenant(session, tenant_id) {
        Ok(())
    } else {
        Err(PolicyError::OutOfScope(resource))
    }
}

/// Gate for writing a page (or triggering a build) of `tenant_id`.
pub fn require_page_editor(session: &SessionUser, tenant_id: Uuid) -> Result<(), PolicyError> {
    require_tenant(session, tenant_id)?;
    if can_edit_pages(session, tenant_id) {
        Ok(())
    } else {
        Err(PolicyError::Forbidden(INSUFFICIENT))
    }
}

/// Only SUPER_ADMIN creates and reconfigures tenants.
pub fn require_super_admin(session: &SessionUser) -> Result<(), PolicyError> {
    if is_super_admin(session) {
        Ok(())
    } else {
        Err(PolicyError::Forbidden(INSUFFICIENT))
    }
}

/// SUPER_ADMIN, or an ADMIN of that tenant.
pub fn require_tenant_admin(session: &SessionUser, tenant_id: Uuid) -> Result<(), PolicyError> {
    require_tenant(session, tenant_id)?;
    if is_super_admin(session) || is_tenant_admin(session, tenant_id) {
        Ok(())
    } else {
        Err(PolicyError::Forbidden(INSUFFICIENT))
    }
}

/// Tenant filter for a tenant-scoped listing.
///
/// SUPER_ADMIN gets whatever was requested (`None` meaning every tenant).
/// Everyone else is pinned to their own tenant and may not ask for another.
pub fn listing_scope(
    session: &SessionUser,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>, PolicyError> {
    if is_super_admin(session) {
        return Ok(requested);
    }

    match (session.tenant_id, requested) {
        (Some(own), None) => Ok(Some(own)),
        (Some(own), Some(requested)) if own == requested => Ok(Some(own)),
        _ => Err(PolicyError::Forbidden(INSUFFICIENT)),
    }
}

/// Tenant filter for listing user accounts: like [`listing_scope`], but only
/// SUPER_ADMIN and tenant ADMINs may list accounts at all.
pub fn user_listing_scope(
    session: &SessionUser,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>, PolicyError> {
    if !is_super_admin(session) && session.role != Role::Admin {
        return Err(PolicyError::Forbidden(INSUFFICIENT));
    }
    listing_scope(session, requested)
}

/// Reading a single account: SUPER_ADMIN, the account itself, or an ADMIN of
/// the account's tenant.
pub fn authorize_user_read(session: &SessionUser, target: &UserTarget) -> Result<(), PolicyError> {
    if is_super_admin(session) || session.id == target.id {
        return Ok(());
    }

    match target.tenant_id {
        Some(tenant_id) if is_member(session, tenant_id) => {
            if session.role == Role::Admin {
                Ok(())
            } else {
                Err(PolicyError::Forbidden(INSUFFICIENT))
            }
        }
        _ => Err(PolicyError::OutOfScope("User")),
    }
}

/// Creating an account with `role` in `tenant_id`.
pub fn authorize_user_create(
    session: &SessionUser,
    role: Role,
    tenant_id: Uuid,
) -> Result<(), PolicyError> {
    if is_super_admin(session) {
        return Ok(());
    }

    if !is_tenant_admin(session, tenant_id) {
        return Err(PolicyError::Forbidden(INSUFFICIENT));
    }

    match role {
        Role::Editor | Role::Viewer => Ok(()),
        Role::Admin | Role::SuperAdmin => Err(PolicyError::Forbidden(
            "Only a super admin may create admin accounts",
        )),
    }
}

/// Updating `target` with `change`.
///
/// Nobody changes their own role or deactivates themselves. A tenant ADMIN
/// may edit EDITOR and VIEWER accounts of their tenant without granting
/// ADMIN, and may edit their own profile.
pub fn authorize_user_update(
    session: &SessionUser,
    target: &UserTarget,
    change: &UserChange,
) -> Result<(), PolicyError> {
    if target.id == session.id {
        let role_changes = change.role.is_some_and(|role| role != target.role);
        if role_changes || change.is_active.is_some_and(|active| !active) {
            return Err(PolicyError::Forbidden(
                "You cannot change your own role or deactivate yourself",
            ));
        }
    }

    if is_super_admin(session) {
        return Ok(());
    }

    let Some(tenant_id) = target.tenant_id.filter(|id| is_member(session, *id)) else {
        return Err(PolicyError::OutOfScope("User"));
    };

    if !is_tenant_admin(session, tenant_id) {
        return Err(PolicyError::Forbidden(INSUFFICIENT));
    }

    if matches!(change.role, Some(Role::Admin | Role::SuperAdmin)) && change.role != Some(target.role) {
        return Err(PolicyError::Forbidden(
            "Only a super admin may grant the admin role",
        ));
    }

    if target.id == session.id {
        return Ok(());
    }

    match target.role {
        Role::Editor | Role::Viewer => Ok(()),
        Role::Admin | Role::SuperAdmin => Err(PolicyError::Forbidden(
            "Only a super admin may edit admin accounts",
        )),
    }
}

/// Deleting `target`. Nobody deletes their own account.
pub fn authorize_user_delete(session: &SessionUser, target: &UserTarget) -> Result<(), PolicyError> {
    if session.id == target.id {
        return Err(PolicyError::Forbidden("You cannot delete your own account"));
    }

    if is_super_admin(session) {
        return Ok(());
    }

    let Some(tenant_id) = target.tenant_id.filter(|id| is_member(session, *id)) else {
        return Err(PolicyError::OutOfScope("User"));
    };

    if !is_tenant_admin(session, tenant_id) {
        return Err(PolicyError::Forbidden(INSUFFICIENT));
    }

    match target.role {
        Role::Editor | Role::Viewer => Ok(()),
        Role::Admin | Role::SuperAdmin => Err(PolicyError::Forbidden(
            "Only a super admin may delete admin accounts",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Role, tenant_id: Option<Uuid>) -> SessionUser {
        SessionUser {
            id: Uuid::new_v4(),
            email: format!("{}@example.test", role.as_str().to_lowercase()),
            name: None,
            role,
            tenant_id,
        }
    }

    fn target(role: Role, tenant_id: Option<Uuid>) -> UserTarget {
        UserTarget {
            id: Uuid::new_v4(),
            role,
            tenant_id,
        }
    }

    fn forbidden_err(result: Result<(), PolicyError>) -> bool {
        matches!(result, Err(PolicyError::Forbidden(_)))
    }

    #[test]
    fn page_editing_matrix() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let cases = [
            (Role::SuperAdmin, None, a, true),
            (Role::SuperAdmin, None, b, true),
            (Role::Admin, Some(a), a, true),
            (Role::Editor, Some(a), a, true),
            (Role::Viewer, Some(a), a, false),
            (Role::Admin, Some(a), b, false),
            (Role::Editor, Some(a), b, false),
            (Role::Viewer, Some(a), b, false),
            (Role::Editor, None, a, false),
        ];

        for (role, own, target_tenant, expected) in cases {
            let caller = session(role, own);
            assert_eq!(
                can_edit_pages(&caller, target_tenant),
                expected,
                "{role} of {own:?} editing {target_tenant}"
            );
            assert_eq!(require_page_editor(&caller, target_tenant).is_ok(), expected);
        }
    }

    #[test]
    fn require_tenant_checks_membership_only() {
        let a = Uuid::new_v4();
        assert!(require_tenant(&session(Role::Viewer, Some(a)), a).is_ok());
        assert!(require_tenant(&session(Role::SuperAdmin, None), a).is_ok());
        assert!(forbidden_err(require_tenant(
            &session(Role::Admin, Some(Uuid::new_v4())),
            a
        )));
    }

    #[test]
    fn foreign_records_are_out_of_scope() {
        let a = Uuid::new_v4();
        let caller = session(Role::Editor, Some(Uuid::new_v4()));
        assert_eq!(
            require_visible(&caller, a, "Page"),
            Err(PolicyError::OutOfScope("Page"))
        );
        let api: ApiError = PolicyError::OutOfScope("Page").into();
        assert_eq!(api.status, axum::http::StatusCode::NOT_FOUND);
        assert_eq!(api.message, Box::from("Page not found"));
    }

    #[test]
    fn listing_scope_pins_non_super_admins() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let editor = session(Role::Editor, Some(a));
        let root = session(Role::SuperAdmin, None);

        assert_eq!(listing_scope(&root, None), Ok(None));
        assert_eq!(listing_scope(&root, Some(b)), Ok(Some(b)));
        assert_eq!(listing_scope(&editor, None), Ok(Some(a)));
        assert_eq!(listing_scope(&editor, Some(a)), Ok(Some(a)));
        assert!(listing_scope(&editor, Some(b)).is_err());
        assert!(listing_scope(&session(Role::Viewer, None), None).is_err());

        assert!(user_listing_scope(&editor, None).is_err());
        assert_eq!(user_listing_scope(&session(Role::Admin, Some(a)), None), Ok(Some(a)));
    }

    #[test]
    fn admin_cannot_create_admins() {
        let a = Uuid::new_v4();
        let admin = session(Role::Admin, Some(a));
        let root = session(Role::SuperAdmin, None);

        assert!(forbidden_err(authorize_user_create(&admin, Role::Admin, a)));
        assert!(authorize_user_create(&root, Role::Admin, a).is_ok());
        assert!(authorize_user_create(&admin, Role::Editor, a).is_ok());
        assert!(authorize_user_create(&admin, Role::Viewer, a).is_ok());
        assert!(forbidden_err(authorize_user_create(
            &admin,
            Role::Editor,
            Uuid::new_v4()
        )));
        assert!(forbidden_err(authorize_user_create(
            &session(Role::Editor, Some(a)),
            Role::Viewer,
            a
        )));
    }

    #[test]
    fn admin_update_rules() {
        let a = Uuid::new_v4();
        let admin = session(Role::Admin, Some(a));
        let editor = target(Role::Editor, Some(a));

        assert!(authorize_user_update(&admin, &editor, &UserChange::default()).is_ok());
        assert!(
            authorize_user_update(
                &admin,
                &editor,
                &UserChange {
                    role: Some(Role::Viewer),
                    is_active: Some(false)
                }
            )
            .is_ok()
        );
        assert!(forbidden_err(authorize_user_update(
            &admin,
            &editor,
            &UserChange {
                role: Some(Role::Admin),
                ..Default::default()
            }
        )));
        assert!(forbidden_err(authorize_user_update(
            &admin,
            &target(Role::Admin, Some(a)),
            &UserChange::default()
        )));
        assert_eq!(
            authorize_user_update(&admin, &target(Role::SuperAdmin, None), &UserChange::default()),
            Err(PolicyError::OutOfScope("User"))
        );
        assert_eq!(
            authorize_user_update(
                &admin,
                &target(Role::Editor, Some(Uuid::new_v4())),
                &UserChange::default()
            ),
            Err(PolicyError::OutOfScope("User"))
        );
    }

    #[test]
    fn admin_may_edit_own_profile_but_not_demote_self() {
        let a = Uuid::new_v4();
        let admin = session(Role::Admin, Some(a));
        let me = UserTarget {
            id: admin.id,
            role: Role::Admin,
            tenant_id: Some(a),
        };

        assert!(authorize_user_update(&admin, &me, &UserChange::default()).is_ok());
        assert!(
            authorize_user_update(
                &admin,
                &me,
                &UserChange {
                    role: Some(Role::Admin),
                    is_active: Some(true)
                }
            )
            .is_ok()
        );
        assert!(forbidden_err(authorize_user_update(
            &admin,
            &me,
            &UserChange {
                role: Some(Role::Editor),
                ..Default::default()
            }
        )));
        assert!(forbidden_err(authorize_user_update(
            &admin,
            &me,
            &UserChange {
                is_active: Some(false),
                ..Default::default()
            }
        )));
    }

    #[test]
    fn editors_cannot_manage_accounts() {
        let a = Uuid::new_v4();
        let editor = session(Role::Editor, Some(a));
        let viewer = target(Role::Viewer, Some(a));

        assert!(forbidden_err(authorize_user_update(
            &editor,
            &viewer,
            &UserChange::default()
        )));
        assert!(forbidden_err(authorize_user_delete(&editor, &viewer)));
        assert!(forbidden_err(authorize_user_read(&editor, &viewer)));
    }

    #[test]
    fn delete_rules() {
        let a = Uuid::new_v4();
        let admin = session(Role::Admin, Some(a));
        let root = session(Role::SuperAdmin, None);

        let myself = UserTarget {
            id: admin.id,
            role: Role::Admin,
            tenant_id: Some(a),
        };
        assert!(forbidden_err(authorize_user_delete(&admin, &myself)));

        let root_self = UserTarget {
            id: root.id,
            role: Role::SuperAdmin,
            tenant_id: None,
        };
        assert!(forbidden_err(authorize_user_delete(&root, &root_self)));

        assert!(authorize_user_delete(&admin, &target(Role::Editor, Some(a))).is_ok());
        assert!(forbidden_err(authorize_user_delete(
            &admin,
            &target(Role::Admin, Some(a))
        )));
        assert!(authorize_user_delete(&admin, &target(Role::SuperAdmin, None)).is_err());
        assert!(authorize_user_delete(&root, &target(Role::SuperAdmin, None)).is_ok());
        assert!(authorize_user_delete(&root, &target(Role::Admin, Some(a))).is_ok());
    }

    #[test]
    fn user_read_rules() {
        let a = Uuid::new_v4();
        let viewer = session(Role::Viewer, Some(a));
        let me = UserTarget {
            id: viewer.id,
            role: Role::Viewer,
            tenant_id: Some(a),
        };

        assert!(authorize_user_read(&viewer, &me).is_ok());
        assert!(authorize_user_read(&session(Role::Admin, Some(a)), &me).is_ok());
        assert_eq!(
            authorize_user_read(&session(Role::Admin, Some(Uuid::new_v4())), &me),
            Err(PolicyError::OutOfScope("User"))
        );
    }

    #[test]
    fn super_admin_keeps_own_role_and_access() {
        let root = session(Role::SuperAdmin, None);
        let me = UserTarget {
            id: root.id,
            role: Role::SuperAdmin,
            tenant_id: None,
        };

        let demote = UserChange {
            role: Some(Role::Editor),
            is_active: None,
        };
        let deactivate = UserChange {
            role: None,
            is_active: Some(false),
        };
        assert!(forbidden_err(authorize_user_update(&root, &me, &demote)));
        assert!(forbidden_err(authorize_user_update(&root, &me, &deactivate)));
        assert!(authorize_user_update(&root, &me, &UserChange::default()).is_ok());

        let other_root = target(Role::SuperAdmin, None);
        assert!(authorize_user_update(&root, &other_root, &demote).is_ok());
    }

    #[test]
    fn tenant_admin_gate() {
        let a = Uuid::new_v4();
        assert!(require_tenant_admin(&session(Role::Admin, Some(a)), a).is_ok());
        assert!(require_tenant_admin(&session(Role::SuperAdmin, None), a).is_ok());
        assert!(require_tenant_admin(&session(Role::Editor, Some(a)), a).is_err());
        assert!(require_tenant_admin(&session(Role::Admin, Some(Uuid::new_v4())), a).is_err());
        assert!(require_super_admin(&session(Role::Admin, Some(a))).is_err());
    }
}
