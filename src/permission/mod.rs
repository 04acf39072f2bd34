//! Access control for tournaments, their rosters and their matches.
//!
//! All mutation paths go through [`authorize`]; there are no per-resource
//! variants of the check.

use crate::{
    auth::Principal,
    error::CoreError,
    ids::IdRef,
};

/// A capability a principal asks to exercise on a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    /// Rename or delete a tournament.
    ManageTournament,
    /// Add or remove teams on a tournament's roster.
    ManageTeams,
    /// Create, edit or delete match results.
    ManageMatches,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denial {
    NotAuthenticated,
    Forbidden,
}

impl From<Denial> for CoreError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::NotAuthenticated => CoreError::NotAuthenticated,
            Denial::Forbidden => CoreError::Forbidden,
        }
    }
}

/// Decides whether `principal` may exercise `permission` on a resource owned
/// by `owner`.
///
/// Rules, first match wins: no principal is denied as not authenticated; an
/// elevated role is allowed; the owner is allowed; anyone else is forbidden.
/// Ownership is compared on canonical id strings, so owners recorded either as
/// raw strings or as typed references are recognised.
pub fn authorize(
    principal: Option<&Principal>,
    owner: &IdRef,
    permission: Permission,
) -> Result<(), Denial> {
    let Some(principal) = principal else {
        return Err(Denial::NotAuthenticated);
    };

    if principal.role.is_elevated() {
        tracing::trace!(user = %principal.id, ?permission, "allowed by role");
        return Ok(());
    }

    if IdRef::from(principal.id).refers_to(owner) {
        tracing::trace!(user = %principal.id, ?permission, "allowed as owner");
        return Ok(());
    }

    tracing::debug!(
        user = %principal.id,
        owner = %owner,
        ?permission,
        "permission denied"
    );
    Err(Denial::Forbidden)
}

/// For operations open to any signed-in principal.
pub fn require_principal(
    principal: Option<&Principal>,
) -> Result<&Principal, CoreError> {
    principal.ok_or(CoreError::NotAuthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::Role, ids::UserId};

    fn principal(role: Role) -> Principal {
        Principal {
            id: UserId::generate(),
            email: "someone@example.com".into(),
            role,
        }
    }

    const ALL: [Permission; 3] = [
        Permission::ManageTournament,
        Permission::ManageTeams,
        Permission::ManageMatches,
    ];

    #[test]
    fn admin_is_always_allowed() {
        let admin = principal(Role::Admin);
        for permission in ALL {
            for owner in [
                IdRef::from(UserId::generate()),
                IdRef::Raw(String::new()),
                IdRef::Typed {
                    oid: "garbage".into(),
                },
            ] {
                assert_eq!(authorize(Some(&admin), &owner, permission), Ok(()));
            }
        }
    }

    #[test]
    fn non_owner_is_forbidden() {
        let user = principal(Role::User);
        for permission in ALL {
            let owner = IdRef::from(UserId::generate());
            assert_eq!(
                authorize(Some(&user), &owner, permission),
                Err(Denial::Forbidden)
            );
        }
    }

    #[test]
    fn missing_principal_is_not_authenticated() {
        for permission in ALL {
            assert_eq!(
                authorize(None, &IdRef::Raw("nobody".into()), permission),
                Err(Denial::NotAuthenticated)
            );
            assert_eq!(
                authorize(None, &IdRef::Raw(String::new()), permission),
                Err(Denial::NotAuthenticated)
            );
        }
    }

    #[test]
    fn owner_matches_either_representation() {
        let user = principal(Role::User);
        let raw = IdRef::from(user.id);
        let typed = IdRef::Typed {
            oid: user.id.as_uuid().simple().to_string().to_uppercase(),
        };

        assert_eq!(
            authorize(Some(&user), &raw, Permission::ManageTeams),
            Ok(())
        );
        assert_eq!(
            authorize(Some(&user), &typed, Permission::ManageMatches),
            Ok(())
        );
    }

    #[test]
    fn denials_map_to_distinct_errors() {
        assert_eq!(
            CoreError::from(Denial::NotAuthenticated).reason(),
            "not_authenticated"
        );
        assert_eq!(CoreError::from(Denial::Forbidden).reason(), "forbidden");
    }
}
