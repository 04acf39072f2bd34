//! The document store the core reads and writes through.
//!
//! Handlers receive a [`Store`] through [`crate::state::AppState`]; nothing
//! in the core holds a global connection. [`sqlite::SqliteStore`] is the
//! production implementation and [`memory::MemoryStore`] an in-process fake.
//!
//! Store calls are blocking. Async callers go through
//! [`crate::state::AppState::run`].

use std::cmp::Ordering;

use serde::Serialize;

use crate::{
    auth::User,
    error::{CoreError, StoreError},
    ids::{IdRef, MatchId, TeamId, TournamentId, UserId},
    matches::Match,
    tournaments::{Tournament, teams::Team},
};

pub mod memory;
pub mod sqlite;

pub type StoreResult<T> = Result<T, StoreError>;

pub trait Store: Send + Sync {
    fn find_user(&self, id: &UserId) -> StoreResult<Option<User>>;
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Inserts `user` unless another user already has the same email.
    /// Returns whether the insert happened.
    fn insert_user_if_email_free(&self, user: &User) -> StoreResult<bool>;

    fn find_tournament(
        &self,
        id: &TournamentId,
    ) -> StoreResult<Option<Tournament>>;
    /// Newest first. `owner` restricts the listing to one owner.
    fn find_tournaments(
        &self,
        owner: Option<&IdRef>,
        page: Page,
    ) -> StoreResult<Paginated<Tournament>>;
    fn insert_tournament(&self, tournament: &Tournament) -> StoreResult<()>;
    /// Bumps the view counter and returns the tournament as it is afterwards.
    fn increment_views(
        &self,
        id: &TournamentId,
    ) -> StoreResult<Option<Tournament>>;
    /// Returns the number of tournaments matched.
    fn rename_tournament(
        &self,
        id: &TournamentId,
        name: &str,
    ) -> StoreResult<u64>;
    /// Deletes the tournament and its embedded roster. Matches referencing it
    /// are not touched.
    fn delete_tournament(&self, id: &TournamentId) -> StoreResult<u64>;

    /// Adds `team` to the roster only if the tournament exists and has no
    /// team of the same name, as one atomic step. Returns the number of
    /// tournaments matched (0 or 1).
    fn insert_team_if_name_free(
        &self,
        tournament: &TournamentId,
        team: &Team,
    ) -> StoreResult<u64>;
    fn remove_team(
        &self,
        tournament: &TournamentId,
        team: &TeamId,
    ) -> StoreResult<u64>;

    fn find_match(&self, id: &MatchId) -> StoreResult<Option<Match>>;
    /// `page: None` returns every match satisfying the filter.
    fn find_matches(
        &self,
        filter: &MatchFilter,
        sort: Option<MatchSort>,
        page: Option<Page>,
    ) -> StoreResult<Paginated<Match>>;
    fn insert_match(&self, m: &Match) -> StoreResult<()>;
    /// Replaces the stored match with the same id. Returns the number matched.
    fn update_match(&self, m: &Match) -> StoreResult<u64>;
    fn delete_match(&self, id: &MatchId) -> StoreResult<u64>;
    fn delete_matches(&self, filter: &MatchFilter) -> StoreResult<u64>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchFilter {
    pub tournament: Option<TournamentId>,
    pub home_team: Option<TeamId>,
    pub away_team: Option<TeamId>,
    /// Either side.
    pub team: Option<TeamId>,
}

impl MatchFilter {
    pub fn of_tournament(tournament: TournamentId) -> Self {
        MatchFilter {
            tournament: Some(tournament),
            ..Default::default()
        }
    }

    pub fn accepts(&self, m: &Match) -> bool {
        self.tournament.is_none_or(|t| m.tournament_id == Some(t))
            && self.home_team.is_none_or(|t| m.home_team_id == t)
            && self.away_team.is_none_or(|t| m.away_team_id == t)
            && self
                .team
                .is_none_or(|t| m.home_team_id == t || m.away_team_id == t)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchSortField {
    Date,
    HomeScore,
    AwayScore,
    CreatedAt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchSort {
    pub field: MatchSortField,
    pub descending: bool,
}

impl MatchSort {
    /// Parses `field` or `-field` (descending).
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match name {
            "date" => MatchSortField::Date,
            "homeScore" => MatchSortField::HomeScore,
            "awayScore" => MatchSortField::AwayScore,
            "createdAt" => MatchSortField::CreatedAt,
            _ => {
                return Err(CoreError::validation(
                    "sort",
                    format!("cannot sort by `{name}`"),
                ));
            }
        };
        Ok(MatchSort { field, descending })
    }

    /// Orders two matches by this sort, falling back to id order.
    pub fn compare(&self, a: &Match, b: &Match) -> Ordering {
        let ord = match self.field {
            MatchSortField::Date => a.date.cmp(&b.date),
            MatchSortField::HomeScore => a.home_score.cmp(&b.home_score),
            MatchSortField::AwayScore => a.away_score.cmp(&b.away_score),
            MatchSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        };
        let ord = if self.descending { ord.reverse() } else { ord };
        ord.then_with(|| a.id.cmp(&b.id))
    }
}

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    /// 1-based.
    pub page: u64,
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    /// Lenient parsing of query-string values: anything unparsable falls back
    /// to the default, and the limit is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .max(1) as u64;
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE as i64)
            .clamp(1, MAX_PAGE_SIZE as i64) as u64;
        Page { page, limit }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: Page, total: u64) -> Self {
        Paginated {
            items,
            page: page.page,
            limit: page.limit,
            total,
            pages: total.div_ceil(page.limit),
        }
    }

    /// A single page holding everything.
    pub fn unpaged(items: Vec<T>) -> Self {
        let total = items.len() as u64;
        Paginated {
            items,
            page: 1,
            limit: total,
            total,
            pages: u64::from(total > 0),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
            pages: self.pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_parsing_is_lenient_and_clamped() {
        assert_eq!(Page::from_query(None, None), Page::default());
        assert_eq!(
            Page::from_query(Some("0"), Some("500")),
            Page { page: 1, limit: 50 }
        );
        assert_eq!(
            Page::from_query(Some("abc"), Some("-3")),
            Page { page: 1, limit: 1 }
        );
        assert_eq!(Page::from_query(Some("3"), Some("20")).offset(), 40);
    }

    #[test]
    fn page_count_rounds_up() {
        let p = Paginated::new(vec![(); 10], Page { page: 1, limit: 10 }, 21);
        assert_eq!(p.pages, 3);
        let empty = Paginated::<()>::new(vec![], Page::default(), 0);
        assert_eq!(empty.pages, 0);
    }

    #[test]
    fn sort_parsing() {
        assert_eq!(
            MatchSort::parse("-homeScore").unwrap(),
            MatchSort {
                field: MatchSortField::HomeScore,
                descending: true
            }
        );
        assert_eq!(
            MatchSort::parse("date").unwrap().field,
            MatchSortField::Date
        );
        assert_eq!(
            MatchSort::parse("$where").unwrap_err().reason(),
            "validation_failed"
        );
    }
}
