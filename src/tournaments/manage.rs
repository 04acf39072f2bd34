use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use crate::{
    auth::{Principal, Session},
    error::{CoreError, Resource},
    permission::Permission,
    state::AppState,
    store::{MatchFilter, Store},
    tournaments::{Tournament, create::TournamentForm, finish_cascade},
    util_resp::{StandardResponse, json_body, message, no_content},
    validation::valid_name,
};

#[tracing::instrument(skip(store, principal))]
pub fn rename_tournament(
    id: &str,
    name: Option<&str>,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<(), CoreError> {
    let tournament = Tournament::fetch_for_management(
        id,
        principal,
        Permission::ManageTournament,
        store,
    )?;
    let name = valid_name("name", name)?;

    match store.rename_tournament(&tournament.id, &name)? {
        0 => Err(CoreError::NotFound(Resource::Tournament)),
        _ => Ok(()),
    }
}

/// Deletes the tournament, then every match that references it. The second
/// step is attempted even when the first fails.
#[tracing::instrument(skip(store, principal))]
pub fn delete_tournament(
    id: &str,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<(), CoreError> {
    let tournament = Tournament::fetch_for_management(
        id,
        principal,
        Permission::ManageTournament,
        store,
    )?;

    let parent = store.delete_tournament(&tournament.id);
    let children = store.delete_matches(&MatchFilter::of_tournament(tournament.id));
    finish_cascade("tournament", parent, children)?;

    tracing::info!(tournament = %tournament.id, "deleted tournament");

    Ok(())
}

pub async fn do_rename_tournament(
    Path(tournament_id): Path<String>,
    State(state): State<AppState>,
    session: Session,
    form: Result<Json<TournamentForm>, JsonRejection>,
) -> StandardResponse {
    let principal = session.0;
    // A missing session takes precedence over a malformed body.
    let form = match principal {
        Some(_) => json_body(form)?,
        None => TournamentForm::default(),
    };

    state
        .run(move |store| {
            rename_tournament(
                &tournament_id,
                form.name.as_deref(),
                principal.as_ref(),
                store,
            )
        })
        .await?;

    message("Tournament updated")
}

pub async fn do_delete_tournament(
    Path(tournament_id): Path<String>,
    State(state): State<AppState>,
    session: Session,
) -> StandardResponse {
    let principal = session.0;

    state
        .run(move |store| {
            delete_tournament(&tournament_id, principal.as_ref(), store)
        })
        .await?;

    no_content()
}
