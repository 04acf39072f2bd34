use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use crate::{
    auth::{Principal, Session},
    error::{CoreError, Resource},
    matches::{Match, check_teams_on_roster},
    state::AppState,
    store::Store,
    util_resp::{StandardResponse, json_body, message, no_content},
    validation::{MatchPayload, validate_match_payload},
};

/// How an edit combines with the stored match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edit {
    /// Every field must be supplied.
    Replace,
    /// Absent fields keep their stored values.
    Patch,
}

/// Edits a match result. The edited match passes the same validation as a
/// new one. The owning tournament and the recording principal never change.
#[tracing::instrument(skip(store, principal, payload))]
pub fn edit_match(
    match_id: &str,
    payload: MatchPayload,
    edit: Edit,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<Match, CoreError> {
    if principal.is_none() {
        return Err(CoreError::NotAuthenticated);
    }
    let mut m = Match::fetch(match_id, store)?;
    let tournament = m.check_user_has_permission(principal, store)?;

    let payload = match edit {
        Edit::Replace => payload,
        Edit::Patch => payload.merged_over(&m),
    };
    let valid = validate_match_payload(&payload)?;
    if let Some(tournament) = &tournament {
        check_teams_on_roster(tournament, &valid)?;
    }

    m.apply(valid);
    match store.update_match(&m)? {
        0 => Err(CoreError::NotFound(Resource::Match)),
        _ => Ok(m),
    }
}

#[tracing::instrument(skip(store, principal))]
pub fn delete_match(
    match_id: &str,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<(), CoreError> {
    if principal.is_none() {
        return Err(CoreError::NotAuthenticated);
    }
    let m = Match::fetch(match_id, store)?;
    m.check_user_has_permission(principal, store)?;

    match store.delete_match(&m.id)? {
        0 => Err(CoreError::NotFound(Resource::Match)),
        _ => Ok(()),
    }
}

async fn do_edit(
    match_id: String,
    state: AppState,
    session: Session,
    payload: Result<Json<MatchPayload>, JsonRejection>,
    edit: Edit,
) -> StandardResponse {
    let principal = session.0;
    let payload = match principal {
        Some(_) => json_body(payload)?,
        None => MatchPayload::default(),
    };

    state
        .run(move |store| {
            edit_match(&match_id, payload, edit, principal.as_ref(), store)
        })
        .await?;

    message("Match updated")
}

pub async fn do_replace_match(
    Path(match_id): Path<String>,
    State(state): State<AppState>,
    session: Session,
    payload: Result<Json<MatchPayload>, JsonRejection>,
) -> StandardResponse {
    do_edit(match_id, state, session, payload, Edit::Replace).await
}

pub async fn do_patch_match(
    Path(match_id): Path<String>,
    State(state): State<AppState>,
    session: Session,
    payload: Result<Json<MatchPayload>, JsonRejection>,
) -> StandardResponse {
    do_edit(match_id, state, session, payload, Edit::Patch).await
}

pub async fn do_delete_match(
    Path(match_id): Path<String>,
    State(state): State<AppState>,
    session: Session,
) -> StandardResponse {
    let principal = session.0;

    state
        .run(move |store| delete_match(&match_id, principal.as_ref(), store))
        .await?;

    no_content()
}
