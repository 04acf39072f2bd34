use axum::extract::{Path, State};
use serde::Deserialize;
use serde_qs::axum::QsQuery;

use crate::{
    auth::{Principal, Session},
    error::{CoreError, Resource},
    ids::{IdRef, TournamentId},
    permission::require_principal,
    state::AppState,
    store::{Page, Paginated, Store},
    tournaments::Tournament,
    util_resp::{StandardResponse, success},
};

#[derive(Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::from_query(self.page.as_deref(), self.limit.as_deref())
    }
}

/// Admins see every tournament; everyone else sees only their own.
pub fn list_tournaments(
    page: Page,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<Paginated<Tournament>, CoreError> {
    let principal = require_principal(principal)?;

    let owner = match principal.role.is_elevated() {
        true => None,
        false => Some(IdRef::from(principal.id)),
    };

    Ok(store.find_tournaments(owner.as_ref(), page)?)
}

/// Reads a tournament, counting the view. Any signed-in principal may read.
pub fn view_tournament(
    id: &str,
    principal: Option<&Principal>,
    store: &dyn Store,
) -> Result<Tournament, CoreError> {
    require_principal(principal)?;
    let id = TournamentId::parse(id)?;

    store
        .increment_views(&id)?
        .ok_or(CoreError::NotFound(Resource::Tournament))
}

pub async fn list_tournaments_page(
    State(state): State<AppState>,
    session: Session,
    QsQuery(query): QsQuery<PageQuery>,
) -> StandardResponse {
    let principal = session.0;
    let page = query.page();

    let tournaments = state
        .run(move |store| list_tournaments(page, principal.as_ref(), store))
        .await?;

    success(tournaments)
}

pub async fn view_tournament_page(
    Path(tournament_id): Path<String>,
    State(state): State<AppState>,
    session: Session,
) -> StandardResponse {
    let principal = session.0;

    let tournament = state
        .run(move |store| {
            view_tournament(&tournament_id, principal.as_ref(), store)
        })
        .await?;

    success(tournament)
}
