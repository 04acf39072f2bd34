//! An in-process [`Store`] holding everything behind one lock. Used by unit
//! tests, and handy for poking at the API without a database file.

use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};

use itertools::Itertools;

use crate::{
    auth::User,
    error::StoreError,
    ids::{IdRef, MatchId, TeamId, TournamentId, UserId},
    matches::Match,
    store::{MatchFilter, MatchSort, Page, Paginated, Store, StoreResult},
    tournaments::{Tournament, teams::Team},
};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    tournaments: Vec<Tournament>,
    matches: Vec<Match>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    fail_match_deletes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// While set, only bulk and single match deletions fail. Lets the
    /// half-finished cascade paths be exercised.
    pub fn set_fail_match_deletes(&self, fail: bool) {
        self.fail_match_deletes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store switched off".into()));
        }
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn lock_for_match_delete(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        if self.fail_match_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "match deletes switched off".into(),
            ));
        }
        self.lock()
    }
}

fn paginate<T: Clone>(all: Vec<T>, page: Page) -> Paginated<T> {
    let total = all.len() as u64;
    let items = all
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    Paginated::new(items, page, total)
}

impl Store for MemoryStore {
    fn find_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner.users.iter().find(|u| &u.id == id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    fn insert_user_if_email_free(&self, user: &User) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if inner.users.iter().any(|u| u.email == user.email) {
            return Ok(false);
        }
        inner.users.push(user.clone());
        Ok(true)
    }

    fn find_tournament(
        &self,
        id: &TournamentId,
    ) -> StoreResult<Option<Tournament>> {
        let inner = self.lock()?;
        Ok(inner.tournaments.iter().find(|t| &t.id == id).cloned())
    }

    fn find_tournaments(
        &self,
        owner: Option<&IdRef>,
        page: Page,
    ) -> StoreResult<Paginated<Tournament>> {
        let inner = self.lock()?;
        let all = inner
            .tournaments
            .iter()
            .filter(|t| owner.is_none_or(|o| t.owner_id.refers_to(o)))
            .sorted_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
            })
            .cloned()
            .collect_vec();
        Ok(paginate(all, page))
    }

    fn insert_tournament(&self, tournament: &Tournament) -> StoreResult<()> {
        self.lock()?.tournaments.push(tournament.clone());
        Ok(())
    }

    fn increment_views(
        &self,
        id: &TournamentId,
    ) -> StoreResult<Option<Tournament>> {
        let mut inner = self.lock()?;
        Ok(inner
            .tournaments
            .iter_mut()
            .find(|t| &t.id == id)
            .map(|t| {
                t.views += 1;
                t.clone()
            }))
    }

    fn rename_tournament(
        &self,
        id: &TournamentId,
        name: &str,
    ) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        match inner.tournaments.iter_mut().find(|t| &t.id == id) {
            Some(t) => {
                t.name = name.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete_tournament(&self, id: &TournamentId) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        let before = inner.tournaments.len();
        inner.tournaments.retain(|t| &t.id != id);
        Ok((before - inner.tournaments.len()) as u64)
    }

    fn insert_team_if_name_free(
        &self,
        tournament: &TournamentId,
        team: &Team,
    ) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        let Some(t) = inner.tournaments.iter_mut().find(|t| &t.id == tournament)
        else {
            return Ok(0);
        };
        if t.teams.iter().any(|existing| existing.name == team.name) {
            return Ok(0);
        }
        t.teams.push(team.clone());
        Ok(1)
    }

    fn remove_team(
        &self,
        tournament: &TournamentId,
        team: &TeamId,
    ) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        match inner.tournaments.iter_mut().find(|t| &t.id == tournament) {
            Some(t) => {
                t.teams.retain(|existing| &existing.id != team);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn find_match(&self, id: &MatchId) -> StoreResult<Option<Match>> {
        let inner = self.lock()?;
        Ok(inner.matches.iter().find(|m| &m.id == id).cloned())
    }

    fn find_matches(
        &self,
        filter: &MatchFilter,
        sort: Option<MatchSort>,
        page: Option<Page>,
    ) -> StoreResult<Paginated<Match>> {
        let inner = self.lock()?;
        let mut all = inner
            .matches
            .iter()
            .filter(|m| filter.accepts(m))
            .cloned()
            .collect_vec();
        match sort {
            Some(sort) => all.sort_by(|a, b| sort.compare(a, b)),
            None => all.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        Ok(match page {
            Some(page) => paginate(all, page),
            None => Paginated::unpaged(all),
        })
    }

    fn insert_match(&self, m: &Match) -> StoreResult<()> {
        self.lock()?.matches.push(m.clone());
        Ok(())
    }

    fn update_match(&self, m: &Match) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        match inner.matches.iter_mut().find(|stored| stored.id == m.id) {
            Some(stored) => {
                *stored = m.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete_match(&self, id: &MatchId) -> StoreResult<u64> {
        let mut inner = self.lock_for_match_delete()?;
        let before = inner.matches.len();
        inner.matches.retain(|m| &m.id != id);
        Ok((before - inner.matches.len()) as u64)
    }

    fn delete_matches(&self, filter: &MatchFilter) -> StoreResult<u64> {
        let mut inner = self.lock_for_match_delete()?;
        let before = inner.matches.len();
        inner.matches.retain(|m| !filter.accepts(m));
        Ok((before - inner.matches.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn tournament(name: &str) -> Tournament {
        Tournament {
            id: TournamentId::generate(),
            name: name.into(),
            owner_id: IdRef::from(UserId::generate()),
            teams: vec![],
            views: 0,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn switches_fail_the_expected_calls() {
        let store = MemoryStore::new();
        let t = tournament("Spring Cup");
        store.insert_tournament(&t).unwrap();

        store.set_fail_match_deletes(true);
        assert!(store.find_tournament(&t.id).unwrap().is_some());
        assert!(matches!(
            store.delete_matches(&MatchFilter::of_tournament(t.id)),
            Err(StoreError::Unavailable(_))
        ));
        store.set_fail_match_deletes(false);

        store.set_unavailable(true);
        assert!(matches!(
            store.find_tournament(&t.id),
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert_eq!(store.delete_tournament(&t.id).unwrap(), 1);
    }

    #[test]
    fn pages_past_the_end_are_empty() {
        let store = MemoryStore::new();
        for name in ["Spring Cup", "Summer Cup", "Autumn Cup"] {
            store.insert_tournament(&tournament(name)).unwrap();
        }

        let second = store
            .find_tournaments(None, Page { page: 2, limit: 2 })
            .unwrap();
        assert_eq!((second.total, second.pages, second.items.len()), (3, 2, 1));

        let far = Page::from_query(Some("1000000000000000000"), Some("10"));
        let beyond = store.find_tournaments(None, far).unwrap();
        assert_eq!(beyond.total, 3);
        assert!(beyond.items.is_empty());
    }
}
