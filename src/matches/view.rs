use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Map, Value};
use serde_qs::axum::QsQuery;

use crate::{
    error::CoreError,
    ids::{TeamId, TournamentId},
    matches::Match,
    state::AppState,
    store::{MatchFilter, MatchSort, Page, Paginated, Store},
    util_resp::{StandardResponse, success},
};

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MatchQuery {
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    /// Either side.
    pub team: Option<String>,
    pub tournament: Option<String>,
    /// A field name, prefixed with `-` for descending order.
    pub sort: Option<String>,
    /// Comma-separated list of fields to return.
    pub fields: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl MatchQuery {
    pub fn filter(&self) -> Result<MatchFilter, CoreError> {
        Ok(MatchFilter {
            tournament: non_empty(&self.tournament)
                .map(TournamentId::parse)
                .transpose()?,
            home_team: non_empty(&self.home_team).map(TeamId::parse).transpose()?,
            away_team: non_empty(&self.away_team).map(TeamId::parse).transpose()?,
            team: non_empty(&self.team).map(TeamId::parse).transpose()?,
        })
    }

    pub fn sort(&self) -> Result<Option<MatchSort>, CoreError> {
        non_empty(&self.sort).map(MatchSort::parse).transpose()
    }

    pub fn fields(&self) -> Option<Vec<String>> {
        non_empty(&self.fields).map(|f| {
            f.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    pub fn page(&self) -> Page {
        Page::from_query(self.page.as_deref(), self.limit.as_deref())
    }
}

/// Keeps only the named fields of a serialised match. The id is always kept.
pub fn project(m: &Match, fields: &[String]) -> Value {
    let Ok(Value::Object(all)) = serde_json::to_value(m) else {
        return Value::Null;
    };
    let kept: Map<String, Value> = all
        .into_iter()
        .filter(|(k, _)| k == "id" || fields.iter().any(|f| f == k))
        .collect();
    Value::Object(kept)
}

/// Lists matches. Public.
#[tracing::instrument(skip(store))]
pub fn list_matches(
    query: &MatchQuery,
    store: &dyn Store,
) -> Result<Paginated<Value>, CoreError> {
    let filter = query.filter()?;
    let sort = query.sort()?;
    let fields = query.fields();

    let found = store.find_matches(&filter, sort, Some(query.page()))?;

    Ok(found.map(|m| match &fields {
        Some(fields) => project(&m, fields),
        None => serde_json::to_value(&m).unwrap_or(Value::Null),
    }))
}

pub async fn list_matches_page(
    State(state): State<AppState>,
    QsQuery(query): QsQuery<MatchQuery>,
) -> StandardResponse {
    let matches = state.run(move |store| list_matches(&query, store)).await?;

    success(matches)
}

pub async fn view_match_page(
    Path(match_id): Path<String>,
    State(state): State<AppState>,
) -> StandardResponse {
    let m = state.run(move |store| Match::fetch(&match_id, store)).await?;

    success(m)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ids::{IdRef, MatchId, UserId};

    #[test]
    fn projection_keeps_id_and_requested_fields() {
        let m = Match {
            id: MatchId::generate(),
            tournament_id: None,
            home_team_id: TeamId::generate(),
            away_team_id: TeamId::generate(),
            home_score: 4,
            away_score: 1,
            date: "2024-03-02".into(),
            owner_id: IdRef::from(UserId::generate()),
            created_at: Utc::now().naive_utc(),
        };
        let v = project(&m, &["homeScore".into(), "nonsense".into()]);
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["homeScore"], 4);
        assert_eq!(obj["id"], m.id.to_string());
    }

    #[test]
    fn query_parsing() {
        let q = MatchQuery {
            team: Some("  ".into()),
            sort: Some("-date".into()),
            fields: Some("date, homeScore,".into()),
            ..Default::default()
        };
        assert_eq!(q.filter().unwrap(), MatchFilter::default());
        assert!(q.sort().unwrap().unwrap().descending);
        assert_eq!(
            q.fields().unwrap(),
            vec!["date".to_string(), "homeScore".to_string()]
        );

        let bad = MatchQuery {
            home_team: Some("nope".into()),
            ..Default::default()
        };
        assert_eq!(bad.filter().unwrap_err().reason(), "invalid_identifier");
    }
}
