use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{Principal, Session},
    error::CoreError,
    ids::{IdRef, TournamentId},
    permission::require_principal,
    state::AppState,
    store::Store,
    tournaments::Tournament,
    util_resp::{StandardResponse, created, json_body},
    validation::valid_name,
};

#[derive(Deserialize, Default)]
pub struct TournamentForm {
    pub name: Option<String>,
}

#[tracing::instrument(skip(store, principal))]
pub fn create_tournament(
    name: Option<&str>,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<Tournament, CoreError> {
    let principal = require_principal(principal)?;
    let name = valid_name("name", name)?;

    let tournament = Tournament {
        id: TournamentId::generate(),
        name,
        owner_id: IdRef::from(principal.id),
        teams: vec![],
        views: 0,
        created_at: Utc::now().naive_utc(),
    };
    store.insert_tournament(&tournament)?;

    tracing::info!(tournament = %tournament.id, owner = %principal.id, "created tournament");

    Ok(tournament)
}

pub async fn do_create_tournament(
    State(state): State<AppState>,
    session: Session,
    form: Result<Json<TournamentForm>, JsonRejection>,
) -> StandardResponse {
    let principal = require_principal(session.principal())?.clone();
    let form = json_body(form)?;

    let tournament = state
        .run(move |store| {
            create_tournament(form.name.as_deref(), Some(&principal), store)
        })
        .await?;

    created(json!({ "id": tournament.id }))
}
