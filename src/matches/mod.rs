use chrono::NaiveDateTime;
use serde::Serialize;

use crate::{
    auth::Principal,
    error::{CoreError, Resource},
    ids::{IdRef, MatchId, TeamId, TournamentId},
    permission::{Permission, authorize},
    store::Store,
    tournaments::Tournament,
    validation::ValidMatch,
};

pub mod create;
pub mod manage;
pub mod view;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    /// `None` for matches recorded outside any tournament.
    pub tournament_id: Option<TournamentId>,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub home_score: u32,
    pub away_score: u32,
    /// Opaque; used for display and ordering only.
    pub date: String,
    /// The principal that recorded the match.
    pub owner_id: IdRef,
    pub created_at: NaiveDateTime,
}

impl Match {
    #[tracing::instrument(skip(store))]
    pub fn fetch(id: &str, store: &dyn Store) -> Result<Match, CoreError> {
        let id = MatchId::parse(id)?;
        store
            .find_match(&id)?
            .ok_or(CoreError::NotFound(Resource::Match))
    }

    pub fn apply(&mut self, valid: ValidMatch) {
        self.home_team_id = valid.home_team_id;
        self.away_team_id = valid.away_team_id;
        self.home_score = valid.home_score;
        self.away_score = valid.away_score;
        self.date = valid.date;
    }

    /// The tournament this match belongs to, if it still exists.
    pub fn tournament(
        &self,
        store: &dyn Store,
    ) -> Result<Option<Tournament>, CoreError> {
        match self.tournament_id {
            Some(tid) => Ok(store.find_tournament(&tid)?),
            None => Ok(None),
        }
    }

    /// Checks that `principal` may edit or delete this match. Authority rests
    /// with the owner of the match's tournament; a match with no surviving
    /// tournament falls back to whoever recorded it.
    pub fn check_user_has_permission(
        &self,
        principal: Option<&Principal>,
        store: &dyn Store,
    ) -> Result<Option<Tournament>, CoreError> {
        let tournament = self.tournament(store)?;
        let owner = match &tournament {
            Some(t) => &t.owner_id,
            None => &self.owner_id,
        };
        authorize(principal, owner, Permission::ManageMatches)?;
        Ok(tournament)
    }
}

/// Both teams of a tournament match must be on that tournament's roster.
pub fn check_teams_on_roster(
    tournament: &Tournament,
    valid: &ValidMatch,
) -> Result<(), CoreError> {
    if tournament.team(&valid.home_team_id).is_none() {
        return Err(CoreError::validation("homeTeamId", "unknown team"));
    }
    if tournament.team(&valid.away_team_id).is_none() {
        return Err(CoreError::validation("awayTeamId", "unknown team"));
    }
    Ok(())
}
