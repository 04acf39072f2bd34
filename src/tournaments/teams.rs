use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::{Principal, Session},
    error::CoreError,
    ids::TeamId,
    permission::Permission,
    state::AppState,
    store::{MatchFilter, Store},
    tournaments::{Tournament, finish_cascade},
    util_resp::{StandardResponse, created, json_body, no_content},
    validation::valid_name,
};

/// A roster entry. Teams live inside their tournament and are not addressable
/// on their own.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
}

#[derive(Deserialize, Default)]
pub struct TeamForm {
    pub name: Option<String>,
}

/// Adds a team to the roster. Names are unique within a tournament (compared
/// exactly, after trimming); a duplicate is reported as a conflict and leaves
/// the roster unchanged.
#[tracing::instrument(skip(store, principal))]
pub fn add_team(
    tournament_id: &str,
    name: Option<&str>,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<TeamId, CoreError> {
    let tournament = Tournament::fetch_for_management(
        tournament_id,
        principal,
        Permission::ManageTeams,
        store,
    )?;
    let name = valid_name("name", name)?;

    let team = Team {
        id: TeamId::generate(),
        name,
    };

    match store.insert_team_if_name_free(&tournament.id, &team)? {
        0 => {
            tracing::debug!(tournament = %tournament.id, name = %team.name, "team name taken");
            Err(CoreError::Conflict(
                "team already exists or tournament not found".to_string(),
            ))
        }
        _ => {
            tracing::info!(tournament = %tournament.id, team = %team.id, "added team");
            Ok(team.id)
        }
    }
}

/// Removes a team from the roster and deletes every match of this tournament
/// in which it played. Removing a team that is not on the roster is not an
/// error.
#[tracing::instrument(skip(store, principal))]
pub fn remove_team(
    tournament_id: &str,
    team_id: &str,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<(), CoreError> {
    let tournament = Tournament::fetch_for_management(
        tournament_id,
        principal,
        Permission::ManageTeams,
        store,
    )?;
    let team_id = TeamId::parse(team_id)?;

    let parent = store.remove_team(&tournament.id, &team_id);
    let children = store.delete_matches(&MatchFilter {
        tournament: Some(tournament.id),
        team: Some(team_id),
        ..Default::default()
    });
    finish_cascade("team", parent, children)?;

    Ok(())
}

pub async fn do_add_team(
    Path(tournament_id): Path<String>,
    State(state): State<AppState>,
    session: Session,
    form: Result<Json<TeamForm>, JsonRejection>,
) -> StandardResponse {
    let principal = session.0;
    let form = match principal {
        Some(_) => json_body(form)?,
        None => TeamForm::default(),
    };

    let team_id = state
        .run(move |store| {
            add_team(
                &tournament_id,
                form.name.as_deref(),
                principal.as_ref(),
                store,
            )
        })
        .await?;

    created(json!({ "teamId": team_id }))
}

pub async fn do_remove_team(
    Path((tournament_id, team_id)): Path<(String, String)>,
    State(state): State<AppState>,
    session: Session,
) -> StandardResponse {
    let principal = session.0;

    state
        .run(move |store| {
            remove_team(&tournament_id, &team_id, principal.as_ref(), store)
        })
        .await?;

    no_content()
}
