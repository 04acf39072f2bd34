//! The league table.
//!
//! Each match is split into one line per side, lines are grouped by team and
//! summed, and the totals are ranked. The table only contains teams that have
//! played: a roster entry without any matches gets no row.
//!
//! Ranking is by points, then goal difference, then goals scored, all
//! descending. Teams level on all three are ordered by team id so that the
//! table is the same whatever order the matches were loaded in.

use std::cmp::Ordering;
use std::collections::HashMap;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use crate::{
    ids::{TeamId, TournamentId},
    matches::Match,
    tournaments::teams::Team,
};

pub const POINTS_FOR_WIN: u64 = 3;
pub const POINTS_FOR_DRAW: u64 = 1;

/// Name shown for a team that has left the roster since its matches were
/// recorded.
pub const UNKNOWN_TEAM: &str = "Unknown team";

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StandingsRow {
    pub team_id: TeamId,
    pub team_name: String,
    pub games: u64,
    pub wins: u64,
    pub draws: u64,
    pub losses: u64,
    pub goals_for: u64,
    pub goals_against: u64,
    pub goal_diff: i64,
    pub points: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Win,
    Draw,
    Loss,
}

/// One side's view of a match.
struct Line {
    team: TeamId,
    goals_for: u32,
    goals_against: u32,
}

impl Line {
    fn outcome(&self) -> Outcome {
        match self.goals_for.cmp(&self.goals_against) {
            Ordering::Greater => Outcome::Win,
            Ordering::Equal => Outcome::Draw,
            Ordering::Less => Outcome::Loss,
        }
    }
}

fn lines_of(m: &Match) -> [Line; 2] {
    [
        Line {
            team: m.home_team_id,
            goals_for: m.home_score,
            goals_against: m.away_score,
        },
        Line {
            team: m.away_team_id,
            goals_for: m.away_score,
            goals_against: m.home_score,
        },
    ]
}

#[derive(Default)]
struct Tally {
    games: u64,
    wins: u64,
    draws: u64,
    losses: u64,
    goals_for: u64,
    goals_against: u64,
}

impl Tally {
    fn add(&mut self, line: &Line) {
        self.games += 1;
        match line.outcome() {
            Outcome::Win => self.wins += 1,
            Outcome::Draw => self.draws += 1,
            Outcome::Loss => self.losses += 1,
        }
        self.goals_for += u64::from(line.goals_for);
        self.goals_against += u64::from(line.goals_against);
    }
}

/// Computes the table for `tournament` from its roster and matches. Matches
/// belonging to any other tournament are ignored.
pub fn compute_standings(
    tournament: TournamentId,
    roster: &[Team],
    matches: &[Match],
) -> Vec<StandingsRow> {
    let mut tallies: IndexMap<TeamId, Tally> = IndexMap::new();
    for line in matches
        .iter()
        .filter(|m| m.tournament_id == Some(tournament))
        .flat_map(lines_of)
    {
        tallies.entry(line.team).or_default().add(&line);
    }

    let names: HashMap<TeamId, &str> = roster
        .iter()
        .map(|team| (team.id, team.name.as_str()))
        .collect();

    tallies
        .into_iter()
        .map(|(team_id, tally)| StandingsRow {
            team_id,
            team_name: names
                .get(&team_id)
                .copied()
                .unwrap_or(UNKNOWN_TEAM)
                .to_string(),
            games: tally.games,
            wins: tally.wins,
            draws: tally.draws,
            losses: tally.losses,
            goals_for: tally.goals_for,
            goals_against: tally.goals_against,
            goal_diff: tally.goals_for as i64 - tally.goals_against as i64,
            points: tally.wins * POINTS_FOR_WIN + tally.draws * POINTS_FOR_DRAW,
        })
        .sorted_by(rank)
        .collect()
}

/// The ranking order of the table.
pub fn rank(a: &StandingsRow, b: &StandingsRow) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.goal_diff.cmp(&a.goal_diff))
        .then_with(|| b.goals_for.cmp(&a.goals_for))
        .then_with(|| a.team_id.cmp(&b.team_id))
}

pub fn sort_standings(rows: &mut [StandingsRow]) {
    rows.sort_by(rank);
}
