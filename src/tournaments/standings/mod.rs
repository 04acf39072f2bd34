use axum::extract::{Path, State};
use serde::Serialize;

use crate::{
    auth::{Principal, Session},
    error::CoreError,
    ids::TournamentId,
    permission::require_principal,
    state::AppState,
    store::{MatchFilter, Store},
    tournaments::{
        Tournament,
        standings::compute::{StandingsRow, compute_standings},
    },
    util_resp::{StandardResponse, success},
};

pub mod compute;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TournamentStandings {
    pub tournament_id: TournamentId,
    pub standings: Vec<StandingsRow>,
}

impl TournamentStandings {
    #[tracing::instrument(skip(store, principal))]
    pub fn fetch(
        tournament_id: &str,
        principal: Option<&Principal>,
        store: &dyn Store,
    ) -> Result<Self, CoreError> {
        require_principal(principal)?;
        let tournament = Tournament::fetch(tournament_id, store)?;

        let matches = store
            .find_matches(&MatchFilter::of_tournament(tournament.id), None, None)?
            .items;

        tracing::trace!(matches = matches.len(), "computing standings");

        Ok(TournamentStandings {
            tournament_id: tournament.id,
            standings: compute_standings(
                tournament.id,
                &tournament.teams,
                &matches,
            ),
        })
    }
}

pub async fn standings_page(
    Path(tournament_id): Path<String>,
    State(state): State<AppState>,
    session: Session,
) -> StandardResponse {
    let principal = session.0;

    let standings = state
        .run(move |store| {
            TournamentStandings::fetch(&tournament_id, principal.as_ref(), store)
        })
        .await?;

    success(standings)
}
