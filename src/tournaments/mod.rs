use chrono::NaiveDateTime;
use serde::Serialize;

use crate::{
    auth::Principal,
    error::{CoreError, Resource, StoreError},
    ids::{IdRef, TeamId, TournamentId},
    permission::{Permission, authorize},
    store::Store,
    tournaments::teams::Team,
};

pub mod create;
pub mod manage;
pub mod standings;
pub mod teams;
pub mod view;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub owner_id: IdRef,
    pub teams: Vec<Team>,
    /// Read counter. Increments may be lost under concurrent reads.
    pub views: i64,
    pub created_at: NaiveDateTime,
}

impl Tournament {
    #[tracing::instrument(skip(store))]
    pub fn fetch(id: &str, store: &dyn Store) -> Result<Tournament, CoreError> {
        let id = TournamentId::parse(id)?;
        let found = store.find_tournament(&id)?;
        tracing::trace!(%id, found = found.is_some(), "tournament lookup");

        found.ok_or(CoreError::NotFound(Resource::Tournament))
    }

    pub fn check_user_has_permission(
        &self,
        principal: Option<&Principal>,
        permission: Permission,
    ) -> Result<(), CoreError> {
        Ok(authorize(principal, &self.owner_id, permission)?)
    }

    pub fn team(&self, id: &TeamId) -> Option<&Team> {
        self.teams.iter().find(|team| &team.id == id)
    }

    /// Loads a tournament for an owner-only operation. Checks run in the order
    /// callers observe them: signed in, well-formed id, tournament exists,
    /// principal permitted.
    pub fn fetch_for_management(
        id: &str,
        principal: Option<&Principal>,
        permission: Permission,
        store: &dyn Store,
    ) -> Result<Tournament, CoreError> {
        if principal.is_none() {
            return Err(CoreError::NotAuthenticated);
        }
        let tournament = Tournament::fetch(id, store)?;
        tournament.check_user_has_permission(principal, permission)?;
        Ok(tournament)
    }
}

/// Settles a two-step cascade delete. Both steps have already been attempted;
/// nothing is rolled back. A failure in either step is logged as a consistency
/// warning and reported as [`CoreError::StoreUnavailable`]. On success returns
/// the number of parent records removed.
pub fn finish_cascade(
    what: &str,
    parent: Result<u64, StoreError>,
    children: Result<u64, StoreError>,
) -> Result<u64, CoreError> {
    match (parent, children) {
        (Ok(parents), Ok(matches)) => {
            tracing::debug!(what, parents, matches, "cascade delete complete");
            Ok(parents)
        }
        (Ok(parents), Err(e)) => {
            tracing::warn!(
                what,
                parents,
                error = %e,
                "parent deleted but dependent matches were not; orphaned matches remain"
            );
            Err(CoreError::StoreUnavailable)
        }
        (Err(e), Ok(matches)) => {
            tracing::warn!(
                what,
                matches,
                error = %e,
                "dependent matches deleted but parent deletion failed"
            );
            Err(CoreError::StoreUnavailable)
        }
        (Err(parent_err), Err(child_err)) => {
            tracing::warn!(
                what,
                parent_error = %parent_err,
                child_error = %child_err,
                "cascade delete failed in both steps"
            );
            Err(CoreError::StoreUnavailable)
        }
    }
}
