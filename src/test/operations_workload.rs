//! Operation-level workload. Drives the tournament, team and match
//! operations directly against [`MemoryStore`], without the HTTP layer.

use chrono::Utc;
use serde_json::json;

use crate::{
    auth::{Principal, Role},
    error::{CoreError, Resource},
    ids::{IdRef, TeamId, TournamentId, UserId},
    matches::{
        create::create_tournament_match,
        manage::{Edit, delete_match, edit_match},
    },
    store::{MatchFilter, Page, Store, memory::MemoryStore},
    tournaments::{
        Tournament,
        create::create_tournament,
        manage::delete_tournament,
        standings::TournamentStandings,
        teams::{add_team, remove_team},
        view::{list_tournaments, view_tournament},
    },
    validation::MatchPayload,
};

fn principal(role: Role) -> Principal {
    Principal {
        id: UserId::generate(),
        email: format!("{}@example.com", UserId::generate()),
        role,
    }
}

fn payload(home: TeamId, away: TeamId, hs: u32, aws: u32) -> MatchPayload {
    serde_json::from_value(json!({
        "homeTeamId": home.to_string(),
        "awayTeamId": away.to_string(),
        "homeScore": hs,
        "awayScore": aws,
        "date": "2024-05-01",
    }))
    .unwrap()
}

struct Fixture {
    store: MemoryStore,
    owner: Principal,
    tournament: Tournament,
    eagles: TeamId,
    lions: TeamId,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let owner = principal(Role::User);
    let t = create_tournament(Some("Spring Cup"), Some(&owner), &store)
        .unwrap();
    let id = t.id.to_string();
    let eagles = add_team(&id, Some("Eagles"), Some(&owner), &store).unwrap();
    let lions = add_team(&id, Some("Lions"), Some(&owner), &store).unwrap();
    let tournament = store.find_tournament(&t.id).unwrap().unwrap();
    Fixture {
        store,
        owner,
        tournament,
        eagles,
        lions,
    }
}

#[test]
fn duplicate_team_is_a_conflict() {
    let f = fixture();
    let id = f.tournament.id.to_string();

    let err = add_team(&id, Some("  Eagles "), Some(&f.owner), &f.store)
        .unwrap_err();
    assert_eq!(err.reason(), "conflict");

    let t = f.store.find_tournament(&f.tournament.id).unwrap().unwrap();
    assert_eq!(
        t.teams.iter().filter(|team| team.name == "Eagles").count(),
        1
    );
    // Names are compared exactly.
    assert!(add_team(&id, Some("eagles"), Some(&f.owner), &f.store).is_ok());
}

#[test]
fn removing_a_team_removes_its_matches() {
    let f = fixture();
    let id = f.tournament.id.to_string();
    create_tournament_match(
        &id,
        &payload(f.eagles, f.lions, 2, 1),
        Some(&f.owner),
        &f.store,
    )
    .unwrap();

    remove_team(&id, &f.lions.to_string(), Some(&f.owner), &f.store)
        .unwrap();

    let standings =
        TournamentStandings::fetch(&id, Some(&f.owner), &f.store).unwrap();
    assert!(standings.standings.is_empty());
    let t = f.store.find_tournament(&f.tournament.id).unwrap().unwrap();
    assert_eq!(t.teams.len(), 1);
}

#[test]
fn deleting_a_tournament_cascades() {
    let f = fixture();
    let id = f.tournament.id.to_string();
    let m = create_tournament_match(
        &id,
        &payload(f.eagles, f.lions, 0, 0),
        Some(&f.owner),
        &f.store,
    )
    .unwrap();

    delete_tournament(&id, Some(&f.owner), &f.store).unwrap();

    assert!(f.store.find_tournament(&f.tournament.id).unwrap().is_none());
    assert!(f.store.find_match(&m.id).unwrap().is_none());
}

#[test]
fn half_finished_cascade_reports_store_unavailable() {
    let f = fixture();
    let id = f.tournament.id.to_string();
    create_tournament_match(
        &id,
        &payload(f.eagles, f.lions, 1, 1),
        Some(&f.owner),
        &f.store,
    )
    .unwrap();

    f.store.set_fail_match_deletes(true);
    let err = delete_tournament(&id, Some(&f.owner), &f.store).unwrap_err();
    assert_eq!(err, CoreError::StoreUnavailable);

    // The parent went; the orphaned match is still there.
    assert!(f.store.find_tournament(&f.tournament.id).unwrap().is_none());
    f.store.set_fail_match_deletes(false);
    let left = f.store.find_matches(&MatchFilter::default(), None, None);
    assert_eq!(left.unwrap().total, 1);
}

#[test]
fn strangers_may_read_but_not_manage() {
    let f = fixture();
    let id = f.tournament.id.to_string();
    let stranger = principal(Role::User);
    let admin = principal(Role::Admin);

    assert!(view_tournament(&id, Some(&stranger), &f.store).is_ok());
    assert_eq!(
        add_team(&id, Some("Wolves"), Some(&stranger), &f.store),
        Err(CoreError::Forbidden)
    );
    assert_eq!(
        add_team(&id, Some("Wolves"), None, &f.store),
        Err(CoreError::NotAuthenticated)
    );
    assert!(add_team(&id, Some("Wolves"), Some(&admin), &f.store).is_ok());
}

#[test]
fn management_checks_run_in_order() {
    let f = fixture();
    let stranger = principal(Role::User);

    assert_eq!(
        delete_tournament("garbage", None, &f.store),
        Err(CoreError::NotAuthenticated)
    );
    assert_eq!(
        delete_tournament("garbage", Some(&stranger), &f.store),
        Err(CoreError::InvalidIdentifier(Resource::Tournament))
    );
    assert_eq!(
        delete_tournament(
            &TournamentId::generate().to_string(),
            Some(&stranger),
            &f.store
        ),
        Err(CoreError::NotFound(Resource::Tournament))
    );
    assert_eq!(
        delete_tournament(
            &f.tournament.id.to_string(),
            Some(&stranger),
            &f.store
        ),
        Err(CoreError::Forbidden)
    );
}

#[test]
fn views_count_reads() {
    let f = fixture();
    let id = f.tournament.id.to_string();
    view_tournament(&id, Some(&f.owner), &f.store).unwrap();
    let t = view_tournament(&id, Some(&f.owner), &f.store).unwrap();
    assert_eq!(t.views, 2);
}

#[test]
fn listing_is_scoped_to_the_owner_unless_admin() {
    let f = fixture();
    let other = principal(Role::User);
    create_tournament(Some("Other Cup"), Some(&other), &f.store).unwrap();

    let mine =
        list_tournaments(Page::default(), Some(&f.owner), &f.store).unwrap();
    assert_eq!(mine.total, 1);
    assert_eq!(mine.items[0].id, f.tournament.id);

    let admin = principal(Role::Admin);
    let all =
        list_tournaments(Page::default(), Some(&admin), &f.store).unwrap();
    assert_eq!(all.total, 2);
    assert_eq!(all.items[0].name, "Other Cup");
}

#[test]
fn typed_owner_references_still_grant_ownership() {
    let store = MemoryStore::new();
    let owner = principal(Role::User);
    let legacy = Tournament {
        id: TournamentId::generate(),
        name: "Legacy".into(),
        owner_id: IdRef::Typed {
            oid: owner.id.to_string().to_uppercase(),
        },
        teams: vec![],
        views: 0,
        created_at: Utc::now().naive_utc(),
    };
    store.insert_tournament(&legacy).unwrap();

    let id = legacy.id.to_string();
    assert!(add_team(&id, Some("Eagles"), Some(&owner), &store).is_ok());
    let listed =
        list_tournaments(Page::default(), Some(&owner), &store).unwrap();
    assert_eq!(listed.total, 1);
}

#[test]
fn match_edits_are_revalidated() {
    let f = fixture();
    let id = f.tournament.id.to_string();
    let m = create_tournament_match(
        &id,
        &payload(f.eagles, f.lions, 3, 0),
        Some(&f.owner),
        &f.store,
    )
    .unwrap();
    let match_id = m.id.to_string();

    let patch: MatchPayload =
        serde_json::from_value(json!({ "awayScore": 2 })).unwrap();
    let edited =
        edit_match(&match_id, patch, Edit::Patch, Some(&f.owner), &f.store)
            .unwrap();
    assert_eq!((edited.home_score, edited.away_score), (3, 2));

    let same_sides: MatchPayload =
        serde_json::from_value(json!({ "awayTeamId": f.eagles.to_string() }))
            .unwrap();
    let err = edit_match(
        &match_id,
        same_sides,
        Edit::Patch,
        Some(&f.owner),
        &f.store,
    )
    .unwrap_err();
    assert_eq!(err.reason(), "validation_failed");

    let partial: MatchPayload =
        serde_json::from_value(json!({ "homeScore": 1 })).unwrap();
    assert!(
        edit_match(&match_id, partial, Edit::Replace, Some(&f.owner), &f.store)
            .is_err()
    );

    let stranger = principal(Role::User);
    assert_eq!(
        delete_match(&match_id, Some(&stranger), &f.store),
        Err(CoreError::Forbidden)
    );
    delete_match(&match_id, Some(&f.owner), &f.store).unwrap();
    assert!(f.store.find_match(&m.id).unwrap().is_none());
}

#[test]
fn off_roster_teams_are_rejected() {
    let f = fixture();
    let err = create_tournament_match(
        &f.tournament.id.to_string(),
        &payload(f.eagles, TeamId::generate(), 1, 0),
        Some(&f.owner),
        &f.store,
    )
    .unwrap_err();
    assert_eq!(
        err,
        CoreError::validation("awayTeamId", "unknown team")
    );
}

#[test]
fn unavailable_store_surfaces_as_store_unavailable() {
    let f = fixture();
    f.store.set_unavailable(true);
    let err = view_tournament(
        &f.tournament.id.to_string(),
        Some(&f.owner),
        &f.store,
    )
    .unwrap_err();
    assert_eq!(err, CoreError::StoreUnavailable);
}
