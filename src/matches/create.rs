use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use chrono::Utc;
use serde_json::json;

use crate::{
    auth::{Principal, Session},
    error::{CoreError, Resource},
    ids::{IdRef, MatchId},
    matches::{Match, check_teams_on_roster},
    permission::{Permission, require_principal},
    state::AppState,
    store::Store,
    tournaments::Tournament,
    util_resp::{StandardResponse, created, json_body},
    validation::{MatchPayload, ValidMatch, validate_match_payload},
};

fn record(
    valid: ValidMatch,
    tournament: Option<&Tournament>,
    principal: &Principal,
    store: &dyn Store,
) -> Result<Match, CoreError> {
    let m = Match {
        id: MatchId::generate(),
        tournament_id: tournament.map(|t| t.id),
        home_team_id: valid.home_team_id,
        away_team_id: valid.away_team_id,
        home_score: valid.home_score,
        away_score: valid.away_score,
        date: valid.date,
        owner_id: IdRef::from(principal.id),
        created_at: Utc::now().naive_utc(),
    };
    store.insert_match(&m)?;

    tracing::info!(
        match_id = %m.id,
        tournament = ?m.tournament_id,
        "recorded match"
    );

    Ok(m)
}

/// Records a result under a tournament. Only the tournament's owner or an
/// admin may do so.
#[tracing::instrument(skip(store, principal, payload))]
pub fn create_tournament_match(
    tournament_id: &str,
    payload: &MatchPayload,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<Match, CoreError> {
    let tournament = Tournament::fetch_for_management(
        tournament_id,
        principal,
        Permission::ManageMatches,
        store,
    )?;
    let principal = require_principal(principal)?;

    let valid = validate_match_payload(payload)?;
    check_teams_on_roster(&tournament, &valid)?;

    record(valid, Some(&tournament), principal, store)
}

/// Records a result through the unscoped route. The payload may still name a
/// tournament, in which case the same rules as
/// [`create_tournament_match`] apply.
#[tracing::instrument(skip(store, principal, payload))]
pub fn create_match(
    payload: &MatchPayload,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<Match, CoreError> {
    let principal = require_principal(principal)?;
    let valid = validate_match_payload(payload)?;

    let tournament = match payload.tournament()? {
        Some(tid) => {
            let tournament = store
                .find_tournament(&tid)?
                .ok_or(CoreError::NotFound(Resource::Tournament))?;
            tournament.check_user_has_permission(
                Some(principal),
                Permission::ManageMatches,
            )?;
            check_teams_on_roster(&tournament, &valid)?;
            Some(tournament)
        }
        None => None,
    };

    record(valid, tournament.as_ref(), principal, store)
}

pub async fn do_create_tournament_match(
    Path(tournament_id): Path<String>,
    State(state): State<AppState>,
    session: Session,
    payload: Result<Json<MatchPayload>, JsonRejection>,
) -> StandardResponse {
    let principal = session.0;
    let payload = match principal {
        Some(_) => json_body(payload)?,
        None => MatchPayload::default(),
    };

    let m = state
        .run(move |store| {
            create_tournament_match(
                &tournament_id,
                &payload,
                principal.as_ref(),
                store,
            )
        })
        .await?;

    created(json!({ "id": m.id }))
}

pub async fn do_create_match(
    State(state): State<AppState>,
    session: Session,
    payload: Result<Json<MatchPayload>, JsonRejection>,
) -> StandardResponse {
    let principal = require_principal(session.principal())?.clone();
    let payload = json_body(payload)?;

    let m = state
        .run(move |store| create_match(&payload, Some(&principal), store))
        .await?;

    created(json!({ "id": m.id }))
}
