//! Role-based authorization policy.
//!
//! Single decision point for every mutating operation. Roles form a total
//! order (basic < admin < super admin), so a permission check is a monotone
//! comparison against the minimum role of an action rather than scattered
//! per-view conditionals. Adding a role or an action is a one-line change
//! here, and the whole table is exhaustively testable.

use std::fmt;

use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Role {
    Basic,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Basic, Role::Admin, Role::SuperAdmin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Basic => "BASIC",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "BASIC" => Some(Role::Basic),
            "ADMIN" => Some(Role::Admin),
            "SUPER_ADMIN" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Role::Basic => 1,
            Role::Admin => 2,
            Role::SuperAdmin => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Action {
    ViewCredentials,
    CreateCredential,
    UpdateCredential,
    DeleteCredential,
    CreateCompany,
    UpdateCompany,
    DeleteCompany,
    InviteUser,
    ListUsers,
    ChangeUserRole,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::ViewCredentials,
        Action::CreateCredential,
        Action::UpdateCredential,
        Action::DeleteCredential,
        Action::CreateCompany,
        Action::UpdateCompany,
        Action::DeleteCompany,
        Action::InviteUser,
        Action::ListUsers,
        Action::ChangeUserRole,
    ];

    /// Lowest role able to perform this action.
    pub fn min_role(self) -> Role {
        match self {
            Action::ViewCredentials => Role::Basic,
            Action::CreateCredential | Action::UpdateCredential => Role::Admin,
            Action::DeleteCredential => Role::SuperAdmin,
            Action::CreateCompany | Action::UpdateCompany => Role::Admin,
            Action::DeleteCompany => Role::SuperAdmin,
            Action::InviteUser | Action::ListUsers | Action::ChangeUserRole => Role::SuperAdmin,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::ViewCredentials => "view credentials",
            Action::CreateCredential => "create credential",
            Action::UpdateCredential => "update credential",
            Action::DeleteCredential => "delete credential",
            Action::CreateCompany => "create company",
            Action::UpdateCompany => "update company",
            Action::DeleteCompany => "delete company",
            Action::InviteUser => "invite user",
            Action::ListUsers => "list users",
            Action::ChangeUserRole => "change user role",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum PolicyError {
    /// The caller's profile has not been resolved yet. Distinct from an
    /// explicit denial: callers in this state must be treated as still
    /// loading, never as rejected.
    #[error("role not resolved")]
    RoleUnknown,
    #[error("{action} requires role {required} or higher")]
    Denied { action: Action, required: Role },
}

pub fn permits(role: Role, action: Action) -> bool {
    role >= action.min_role()
}

/// Decide whether `role` may perform `action`.
///
/// Total over every (role, action) pair. Runs before any mutation reaches
/// the stores; a rejection here means the request never leaves the process.
pub fn authorize(role: Option<Role>, action: Action) -> Result<Role, PolicyError> {
    let role = role.ok_or(PolicyError::RoleUnknown)?;
    if permits(role, action) {
        Ok(role)
    } else {
        Err(PolicyError::Denied {
            action,
            required: action.min_role(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_role_table_is_exact() {
        let expected = [
            (Action::ViewCredentials, Role::Basic),
            (Action::CreateCredential, Role::Admin),
            (Action::UpdateCredential, Role::Admin),
            (Action::DeleteCredential, Role::SuperAdmin),
            (Action::CreateCompany, Role::Admin),
            (Action::UpdateCompany, Role::Admin),
            (Action::DeleteCompany, Role::SuperAdmin),
            (Action::InviteUser, Role::SuperAdmin),
            (Action::ListUsers, Role::SuperAdmin),
            (Action::ChangeUserRole, Role::SuperAdmin),
        ];
        assert_eq!(expected.len(), Action::ALL.len());
        for (action, min) in expected {
            assert_eq!(action.min_role(), min, "{}", action);
            for role in Role::ALL {
                assert_eq!(
                    permits(role, action),
                    role >= min,
                    "{} as {}",
                    action,
                    role
                );
            }
        }
    }

    #[test]
    fn permissions_are_monotone_in_role() {
        for action in Action::ALL {
            for (i, lower) in Role::ALL.iter().enumerate() {
                for higher in &Role::ALL[i..] {
                    if permits(*lower, action) {
                        assert!(
                            permits(*higher, action),
                            "{} permitted for {} but not {}",
                            action,
                            lower,
                            higher
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn unknown_role_authorizes_nothing() {
        for action in Action::ALL {
            assert_eq!(authorize(None, action), Err(PolicyError::RoleUnknown));
        }
    }

    #[test]
    fn denial_names_the_required_role() {
        let err = authorize(Some(Role::Basic), Action::DeleteCompany).unwrap_err();
        assert_eq!(
            err,
            PolicyError::Denied {
                action: Action::DeleteCompany,
                required: Role::SuperAdmin,
            }
        );
    }

    #[test]
    fn super_admin_is_permitted_everything() {
        for action in Action::ALL {
            assert!(authorize(Some(Role::SuperAdmin), action).is_ok());
        }
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in Role::ALL {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("OWNER"), None);
    }
}
