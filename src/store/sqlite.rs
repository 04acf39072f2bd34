use chrono::NaiveDateTime;
use diesel::{
    SqliteConnection,
    dsl::{count_star, exists},
    prelude::*,
    r2d2::{ConnectionManager, PooledConnection},
    select,
    sqlite::Sqlite,
};
use diesel_migrations::MigrationHarness;
use itertools::Itertools;
use uuid::Uuid;

use crate::{
    MIGRATIONS,
    auth::{Role, User},
    error::StoreError,
    ids::{IdRef, MatchId, TeamId, TournamentId, UserId},
    matches::Match,
    schema::{matches, tournament_teams, tournaments, users},
    state::{DbPool, build_pool},
    store::{
        MatchFilter, MatchSort, MatchSortField, Page, Paginated, Store,
        StoreResult,
    },
    tournaments::{Tournament, teams::Team},
};

type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// The production [`Store`], backed by SQLite through a diesel pool.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Connects to `db_url` and brings the schema up to date.
    pub fn open(db_url: &str) -> Result<Self, StoreError> {
        Self::from_pool(build_pool(db_url)?)
    }

    pub fn from_pool(pool: DbPool) -> Result<Self, StoreError> {
        let mut conn = pool.get()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::debug!(applied = applied.len(), "migrations up to date");
        drop(conn);

        Ok(SqliteStore { pool })
    }

    fn conn(&self) -> StoreResult<Conn> {
        Ok(self.pool.get()?)
    }
}

fn parse_id<T: From<Uuid>>(column: &str, value: &str) -> StoreResult<T> {
    Uuid::parse_str(value)
        .map(T::from)
        .map_err(|_| StoreError::Corrupt(format!("{column} holds `{value}`")))
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(Sqlite))]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: NaiveDateTime,
}

impl UserRow {
    fn from_user(user: &User) -> Self {
        UserRow {
            id: user.id.to_string(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role.as_str().to_string(),
            created_at: user.created_at,
        }
    }

    fn into_user(self) -> StoreResult<User> {
        Ok(User {
            id: parse_id("users.id", &self.id)?,
            email: self.email,
            password_hash: self.password_hash,
            role: Role::from_stored(&self.role),
            created_at: self.created_at,
        })
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = tournaments)]
#[diesel(check_for_backend(Sqlite))]
struct TournamentRow {
    id: String,
    name: String,
    owner_id: String,
    views: i64,
    created_at: NaiveDateTime,
}

impl TournamentRow {
    fn into_tournament(self, teams: Vec<Team>) -> StoreResult<Tournament> {
        Ok(Tournament {
            id: parse_id("tournaments.id", &self.id)?,
            name: self.name,
            owner_id: IdRef::from_stored(&self.owner_id),
            teams,
            views: self.views,
            created_at: self.created_at,
        })
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = tournament_teams)]
#[diesel(check_for_backend(Sqlite))]
struct TeamRow {
    id: String,
    tournament_id: String,
    name: String,
}

impl TeamRow {
    fn into_team(self) -> StoreResult<Team> {
        Ok(Team {
            id: parse_id("tournament_teams.id", &self.id)?,
            name: self.name,
        })
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = matches)]
#[diesel(check_for_backend(Sqlite))]
struct MatchRow {
    id: String,
    tournament_id: Option<String>,
    home_team_id: String,
    away_team_id: String,
    home_score: i64,
    away_score: i64,
    date: String,
    owner_id: String,
    created_at: NaiveDateTime,
}

fn score(column: &str, value: i64) -> StoreResult<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("{column} holds {value}")))
}

impl MatchRow {
    fn from_match(m: &Match) -> Self {
        MatchRow {
            id: m.id.to_string(),
            tournament_id: m.tournament_id.map(|t| t.to_string()),
            home_team_id: m.home_team_id.to_string(),
            away_team_id: m.away_team_id.to_string(),
            home_score: i64::from(m.home_score),
            away_score: i64::from(m.away_score),
            date: m.date.clone(),
            owner_id: m.owner_id.to_stored(),
            created_at: m.created_at,
        }
    }

    fn into_match(self) -> StoreResult<Match> {
        Ok(Match {
            id: parse_id("matches.id", &self.id)?,
            tournament_id: self
                .tournament_id
                .as_deref()
                .map(|t| parse_id("matches.tournament_id", t))
                .transpose()?,
            home_team_id: parse_id("matches.home_team_id", &self.home_team_id)?,
            away_team_id: parse_id("matches.away_team_id", &self.away_team_id)?,
            home_score: score("matches.home_score", self.home_score)?,
            away_score: score("matches.away_score", self.away_score)?,
            date: self.date,
            owner_id: IdRef::from_stored(&self.owner_id),
            created_at: self.created_at,
        })
    }
}

/// Loads the rosters of `rows` and assembles the tournaments, keeping the
/// order of `rows`.
fn with_rosters(
    rows: Vec<TournamentRow>,
    conn: &mut SqliteConnection,
) -> StoreResult<Vec<Tournament>> {
    let ids = rows.iter().map(|row| row.id.clone()).collect_vec();
    let mut rosters = tournament_teams::table
        .filter(tournament_teams::tournament_id.eq_any(&ids))
        .order_by(tournament_teams::id.asc())
        .select(TeamRow::as_select())
        .load::<TeamRow>(conn)?
        .into_iter()
        .into_group_map_by(|team| team.tournament_id.clone());

    rows.into_iter()
        .map(|row| {
            let teams = rosters
                .remove(&row.id)
                .unwrap_or_default()
                .into_iter()
                .map(TeamRow::into_team)
                .collect::<StoreResult<Vec<_>>>()?;
            row.into_tournament(teams)
        })
        .collect()
}

fn load_tournament(
    id: &TournamentId,
    conn: &mut SqliteConnection,
) -> StoreResult<Option<Tournament>> {
    let row = tournaments::table
        .find(id.to_string())
        .select(TournamentRow::as_select())
        .first::<TournamentRow>(conn)
        .optional()?;

    match row {
        Some(row) => Ok(with_rosters(vec![row], conn)?.pop()),
        None => Ok(None),
    }
}

/// SQLite reads a negative OFFSET as zero, so an offset past `i64::MAX`
/// must saturate instead of wrapping.
fn sql_offset(page: &Page) -> i64 {
    i64::try_from(page.offset()).unwrap_or(i64::MAX)
}

fn filtered(filter: &MatchFilter) -> matches::BoxedQuery<'static, Sqlite> {
    let mut query = matches::table.into_boxed();
    if let Some(t) = filter.tournament {
        query = query.filter(matches::tournament_id.eq(t.to_string()));
    }
    if let Some(t) = filter.home_team {
        query = query.filter(matches::home_team_id.eq(t.to_string()));
    }
    if let Some(t) = filter.away_team {
        query = query.filter(matches::away_team_id.eq(t.to_string()));
    }
    if let Some(t) = filter.team {
        query = query.filter(
            matches::home_team_id
                .eq(t.to_string())
                .or(matches::away_team_id.eq(t.to_string())),
        );
    }
    query
}

fn sorted(
    query: matches::BoxedQuery<'static, Sqlite>,
    sort: Option<MatchSort>,
) -> matches::BoxedQuery<'static, Sqlite> {
    let Some(MatchSort { field, descending }) = sort else {
        return query.order_by(matches::id.asc());
    };
    let query = match (field, descending) {
        (MatchSortField::Date, false) => query.order_by(matches::date.asc()),
        (MatchSortField::Date, true) => query.order_by(matches::date.desc()),
        (MatchSortField::HomeScore, false) => {
            query.order_by(matches::home_score.asc())
        }
        (MatchSortField::HomeScore, true) => {
            query.order_by(matches::home_score.desc())
        }
        (MatchSortField::AwayScore, false) => {
            query.order_by(matches::away_score.asc())
        }
        (MatchSortField::AwayScore, true) => {
            query.order_by(matches::away_score.desc())
        }
        (MatchSortField::CreatedAt, false) => {
            query.order_by(matches::created_at.asc())
        }
        (MatchSortField::CreatedAt, true) => {
            query.order_by(matches::created_at.desc())
        }
    };
    query.then_order_by(matches::id.asc())
}

impl Store for SqliteStore {
    fn find_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        users::table
            .find(id.to_string())
            .select(UserRow::as_select())
            .first::<UserRow>(&mut conn)
            .optional()?
            .map(UserRow::into_user)
            .transpose()
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        users::table
            .filter(users::email.eq(email))
            .select(UserRow::as_select())
            .first::<UserRow>(&mut conn)
            .optional()?
            .map(UserRow::into_user)
            .transpose()
    }

    fn insert_user_if_email_free(&self, user: &User) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let n = diesel::insert_into(users::table)
            .values(UserRow::from_user(user))
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
        Ok(n == 1)
    }

    fn find_tournament(
        &self,
        id: &TournamentId,
    ) -> StoreResult<Option<Tournament>> {
        let mut conn = self.conn()?;
        load_tournament(id, &mut conn)
    }

    fn find_tournaments(
        &self,
        owner: Option<&IdRef>,
        page: Page,
    ) -> StoreResult<Paginated<Tournament>> {
        let mut conn = self.conn()?;
        let newest_first = (tournaments::created_at.desc(), tournaments::id.desc());

        let (rows, total) = match owner {
            None => {
                let total = tournaments::table
                    .select(count_star())
                    .get_result::<i64>(&mut conn)?;
                let rows = tournaments::table
                    .order_by(newest_first)
                    .limit(page.limit as i64)
                    .offset(sql_offset(&page))
                    .select(TournamentRow::as_select())
                    .load::<TournamentRow>(&mut conn)?;
                (rows, total as u64)
            }
            // Owner references may be stored in more than one spelling, so
            // they are compared after loading rather than in SQL.
            Some(owner) => {
                let owned = tournaments::table
                    .order_by(newest_first)
                    .select(TournamentRow::as_select())
                    .load::<TournamentRow>(&mut conn)?
                    .into_iter()
                    .filter(|row| IdRef::from_stored(&row.owner_id).refers_to(owner))
                    .collect_vec();
                let total = owned.len() as u64;
                let rows = owned
                    .into_iter()
                    .skip(page.offset() as usize)
                    .take(page.limit as usize)
                    .collect_vec();
                (rows, total)
            }
        };

        Ok(Paginated::new(with_rosters(rows, &mut conn)?, page, total))
    }

    fn insert_tournament(&self, tournament: &Tournament) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let id = tournament.id.to_string();

        conn.transaction::<_, StoreError, _>(|conn| {
            diesel::insert_into(tournaments::table)
                .values(TournamentRow {
                    id: id.clone(),
                    name: tournament.name.clone(),
                    owner_id: tournament.owner_id.to_stored(),
                    views: tournament.views,
                    created_at: tournament.created_at,
                })
                .execute(conn)?;
            for team in &tournament.teams {
                diesel::insert_into(tournament_teams::table)
                    .values(TeamRow {
                        id: team.id.to_string(),
                        tournament_id: id.clone(),
                        name: team.name.clone(),
                    })
                    .execute(conn)?;
            }
            Ok(())
        })
    }

    fn increment_views(
        &self,
        id: &TournamentId,
    ) -> StoreResult<Option<Tournament>> {
        let mut conn = self.conn()?;
        let n = diesel::update(tournaments::table.find(id.to_string()))
            .set(tournaments::views.eq(tournaments::views + 1))
            .execute(&mut conn)?;
        if n == 0 {
            return Ok(None);
        }
        load_tournament(id, &mut conn)
    }

    fn rename_tournament(
        &self,
        id: &TournamentId,
        name: &str,
    ) -> StoreResult<u64> {
        let mut conn = self.conn()?;
        let n = diesel::update(tournaments::table.find(id.to_string()))
            .set(tournaments::name.eq(name))
            .execute(&mut conn)?;
        Ok(n as u64)
    }

    fn delete_tournament(&self, id: &TournamentId) -> StoreResult<u64> {
        let mut conn = self.conn()?;
        let id = id.to_string();

        conn.transaction::<_, StoreError, _>(|conn| {
            diesel::delete(
                tournament_teams::table
                    .filter(tournament_teams::tournament_id.eq(&id)),
            )
            .execute(conn)?;
            let n = diesel::delete(tournaments::table.find(&id)).execute(conn)?;
            Ok(n as u64)
        })
    }

    fn insert_team_if_name_free(
        &self,
        tournament: &TournamentId,
        team: &Team,
    ) -> StoreResult<u64> {
        let mut conn = self.conn()?;
        let tid = tournament.to_string();

        // Holding the write lock from the start keeps the existence check and
        // the insert together.
        conn.immediate_transaction::<_, StoreError, _>(|conn| {
            let found = select(exists(tournaments::table.find(&tid)))
                .get_result::<bool>(conn)?;
            if !found {
                return Ok(0);
            }
            let n = diesel::insert_into(tournament_teams::table)
                .values(TeamRow {
                    id: team.id.to_string(),
                    tournament_id: tid.clone(),
                    name: team.name.clone(),
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(n as u64)
        })
    }

    fn remove_team(
        &self,
        tournament: &TournamentId,
        team: &TeamId,
    ) -> StoreResult<u64> {
        let mut conn = self.conn()?;
        let tid = tournament.to_string();

        conn.transaction::<_, StoreError, _>(|conn| {
            let found = select(exists(tournaments::table.find(&tid)))
                .get_result::<bool>(conn)?;
            if !found {
                return Ok(0);
            }
            diesel::delete(
                tournament_teams::table
                    .filter(tournament_teams::tournament_id.eq(&tid))
                    .filter(tournament_teams::id.eq(team.to_string())),
            )
            .execute(conn)?;
            Ok(1)
        })
    }

    fn find_match(&self, id: &MatchId) -> StoreResult<Option<Match>> {
        let mut conn = self.conn()?;
        matches::table
            .find(id.to_string())
            .select(MatchRow::as_select())
            .first::<MatchRow>(&mut conn)
            .optional()?
            .map(MatchRow::into_match)
            .transpose()
    }

    fn find_matches(
        &self,
        filter: &MatchFilter,
        sort: Option<MatchSort>,
        page: Option<Page>,
    ) -> StoreResult<Paginated<Match>> {
        let mut conn = self.conn()?;
        let query = sorted(filtered(filter), sort).select(MatchRow::as_select());

        let Some(page) = page else {
            let all = query
                .load::<MatchRow>(&mut conn)?
                .into_iter()
                .map(MatchRow::into_match)
                .collect::<StoreResult<Vec<_>>>()?;
            return Ok(Paginated::unpaged(all));
        };

        let total = filtered(filter)
            .select(count_star())
            .get_result::<i64>(&mut conn)?;
        let items = query
            .limit(page.limit as i64)
            .offset(sql_offset(&page))
            .load::<MatchRow>(&mut conn)?
            .into_iter()
            .map(MatchRow::into_match)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Paginated::new(items, page, total as u64))
    }

    fn insert_match(&self, m: &Match) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(matches::table)
            .values(MatchRow::from_match(m))
            .execute(&mut conn)?;
        Ok(())
    }

    fn update_match(&self, m: &Match) -> StoreResult<u64> {
        let mut conn = self.conn()?;
        let n = diesel::update(matches::table.find(m.id.to_string()))
            .set((
                matches::home_team_id.eq(m.home_team_id.to_string()),
                matches::away_team_id.eq(m.away_team_id.to_string()),
                matches::home_score.eq(i64::from(m.home_score)),
                matches::away_score.eq(i64::from(m.away_score)),
                matches::date.eq(&m.date),
            ))
            .execute(&mut conn)?;
        Ok(n as u64)
    }

    fn delete_match(&self, id: &MatchId) -> StoreResult<u64> {
        let mut conn = self.conn()?;
        let n = diesel::delete(matches::table.find(id.to_string()))
            .execute(&mut conn)?;
        Ok(n as u64)
    }

    fn delete_matches(&self, filter: &MatchFilter) -> StoreResult<u64> {
        let mut conn = self.conn()?;

        // Boxed queries cannot be handed to `delete`, so resolve the ids
        // first.
        conn.transaction::<_, StoreError, _>(|conn| {
            let ids = filtered(filter)
                .select(matches::id)
                .load::<String>(conn)?;
            if ids.is_empty() {
                return Ok(0);
            }
            let n = diesel::delete(matches::table.filter(matches::id.eq_any(&ids)))
                .execute(conn)?;
            Ok(n as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open(":memory:").unwrap()
    }

    fn tournament(owner: IdRef) -> Tournament {
        Tournament {
            id: TournamentId::generate(),
            name: "Autumn League".into(),
            owner_id: owner,
            teams: vec![],
            views: 0,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn fixture(
        store: &SqliteStore,
        t: &Tournament,
        home: TeamId,
        away: TeamId,
        hs: u32,
    ) -> Match {
        let m = Match {
            id: MatchId::generate(),
            tournament_id: Some(t.id),
            home_team_id: home,
            away_team_id: away,
            home_score: hs,
            away_score: 0,
            date: format!("2024-09-{:02}", hs + 1),
            owner_id: t.owner_id.clone(),
            created_at: Utc::now().naive_utc(),
        };
        store.insert_match(&m).unwrap();
        m
    }

    #[test]
    fn users_are_unique_by_email() {
        let store = store();
        let user = User {
            id: UserId::generate(),
            email: "ref@example.com".into(),
            password_hash: "x".into(),
            role: Role::Admin,
            created_at: Utc::now().naive_utc(),
        };
        assert!(store.insert_user_if_email_free(&user).unwrap());
        let twin = User {
            id: UserId::generate(),
            ..user.clone()
        };
        assert!(!store.insert_user_if_email_free(&twin).unwrap());

        let found = store.find_user_by_email("ref@example.com").unwrap().unwrap();
        assert_eq!(found, user);
        assert_eq!(store.find_user(&user.id).unwrap(), Some(user));
    }

    #[test]
    fn team_names_are_unique_per_tournament() {
        let store = store();
        let t = tournament(IdRef::from(UserId::generate()));
        store.insert_tournament(&t).unwrap();

        let eagles = Team {
            id: TeamId::generate(),
            name: "Eagles".into(),
        };
        assert_eq!(store.insert_team_if_name_free(&t.id, &eagles).unwrap(), 1);
        let again = Team {
            id: TeamId::generate(),
            ..eagles.clone()
        };
        assert_eq!(store.insert_team_if_name_free(&t.id, &again).unwrap(), 0);
        assert_eq!(
            store
                .insert_team_if_name_free(&TournamentId::generate(), &again)
                .unwrap(),
            0
        );

        let other = tournament(IdRef::from(UserId::generate()));
        store.insert_tournament(&other).unwrap();
        assert_eq!(store.insert_team_if_name_free(&other.id, &again).unwrap(), 1);

        let loaded = store.find_tournament(&t.id).unwrap().unwrap();
        assert_eq!(loaded.teams, vec![eagles]);
    }

    #[test]
    fn typed_owners_survive_storage() {
        let store = store();
        let user = UserId::generate();
        let typed = tournament(IdRef::Typed {
            oid: user.to_string(),
        });
        store.insert_tournament(&typed).unwrap();
        store
            .insert_tournament(&tournament(IdRef::from(UserId::generate())))
            .unwrap();

        let loaded = store.find_tournament(&typed.id).unwrap().unwrap();
        assert_eq!(loaded.owner_id, typed.owner_id);

        let mine = store
            .find_tournaments(Some(&IdRef::from(user)), Page::default())
            .unwrap();
        assert_eq!(mine.total, 1);
        assert_eq!(mine.items[0].id, typed.id);
        let all = store.find_tournaments(None, Page::default()).unwrap();
        assert_eq!(all.total, 2);
    }

    #[test]
    fn views_rename_and_delete() {
        let store = store();
        let t = tournament(IdRef::from(UserId::generate()));
        store.insert_tournament(&t).unwrap();

        store.increment_views(&t.id).unwrap();
        let viewed = store.increment_views(&t.id).unwrap().unwrap();
        assert_eq!(viewed.views, 2);
        assert!(store.increment_views(&TournamentId::generate()).unwrap().is_none());

        assert_eq!(store.rename_tournament(&t.id, "Winter League").unwrap(), 1);
        assert_eq!(store.find_tournament(&t.id).unwrap().unwrap().name, "Winter League");

        assert_eq!(store.delete_tournament(&t.id).unwrap(), 1);
        assert_eq!(store.delete_tournament(&t.id).unwrap(), 0);
    }

    #[test]
    fn match_queries() {
        let store = store();
        let t = tournament(IdRef::from(UserId::generate()));
        store.insert_tournament(&t).unwrap();
        let (a, b, c) = (TeamId::generate(), TeamId::generate(), TeamId::generate());
        let ab = fixture(&store, &t, a, b, 3);
        let bc = fixture(&store, &t, b, c, 1);
        let ca = fixture(&store, &t, c, a, 2);

        let with_a = store
            .find_matches(
                &MatchFilter {
                    team: Some(a),
                    ..Default::default()
                },
                None,
                None,
            )
            .unwrap();
        assert_eq!(with_a.total, 2);

        let by_score = store
            .find_matches(
                &MatchFilter::of_tournament(t.id),
                Some(MatchSort::parse("-homeScore").unwrap()),
                Some(Page { page: 1, limit: 2 }),
            )
            .unwrap();
        assert_eq!(by_score.total, 3);
        assert_eq!(by_score.pages, 2);
        assert_eq!(
            by_score.items.iter().map(|m| m.id).collect_vec(),
            vec![ab.id, ca.id]
        );

        let mut edited = bc.clone();
        edited.home_score = 7;
        assert_eq!(store.update_match(&edited).unwrap(), 1);
        assert_eq!(store.find_match(&bc.id).unwrap(), Some(edited));

        let removed = store
            .delete_matches(&MatchFilter {
                tournament: Some(t.id),
                team: Some(c),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.delete_match(&ab.id).unwrap(), 1);
        assert_eq!(store.delete_match(&ab.id).unwrap(), 0);
    }

    #[test]
    fn pages_far_past_the_end_are_empty() {
        let store = store();
        let t = tournament(IdRef::from(UserId::generate()));
        store.insert_tournament(&t).unwrap();
        let (a, b) = (TeamId::generate(), TeamId::generate());
        for hs in 0..3 {
            fixture(&store, &t, a, b, hs);
        }

        let far = Page::from_query(Some("1000000000000000000"), Some("10"));
        let results = store
            .find_matches(&MatchFilter::of_tournament(t.id), None, Some(far))
            .unwrap();
        assert_eq!(results.total, 3);
        assert_eq!(results.page, 1_000_000_000_000_000_000);
        assert!(results.items.is_empty());

        let listed = store.find_tournaments(None, far).unwrap();
        assert_eq!(listed.total, 1);
        assert!(listed.items.is_empty());
    }
}
