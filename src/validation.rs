use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::CoreError,
    ids::{TeamId, TournamentId},
    matches::Match,
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Expects an already normalised address.
pub fn is_valid_email(email: &str) -> Result<(), String> {
    match !email.is_empty() && email.contains('@') {
        true => Ok(()),
        false => Err("invalid email".to_string()),
    }
}

pub fn is_valid_password(password: &str) -> Result<(), String> {
    match password.chars().count() >= MIN_PASSWORD_LEN {
        true => Ok(()),
        false => Err(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )),
    }
}

/// Trims a display name, rejecting one that is missing or blank.
pub fn valid_name(
    field: &'static str,
    name: Option<&str>,
) -> Result<String, CoreError> {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(CoreError::validation(field, "name required")),
    }
}

/// A match result as submitted by a client, before validation. Fields are kept
/// as raw JSON so that wrongly typed values can be reported rather than
/// rejected wholesale by the deserialiser.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPayload {
    pub home_team_id: Option<Value>,
    pub away_team_id: Option<Value>,
    pub home_score: Option<Value>,
    pub away_score: Option<Value>,
    pub date: Option<Value>,
    pub tournament_id: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidMatch {
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub home_score: u32,
    pub away_score: u32,
    pub date: String,
}

impl MatchPayload {
    /// Fills every field this payload leaves out from `existing`, for partial
    /// updates.
    pub fn merged_over(self, existing: &Match) -> MatchPayload {
        MatchPayload {
            home_team_id: self
                .home_team_id
                .or_else(|| Some(Value::from(existing.home_team_id.to_string()))),
            away_team_id: self
                .away_team_id
                .or_else(|| Some(Value::from(existing.away_team_id.to_string()))),
            home_score: self
                .home_score
                .or_else(|| Some(Value::from(existing.home_score))),
            away_score: self
                .away_score
                .or_else(|| Some(Value::from(existing.away_score))),
            date: self.date.or_else(|| Some(Value::from(existing.date.clone()))),
            tournament_id: self.tournament_id,
        }
    }

    /// The optional owning tournament named by the payload.
    pub fn tournament(&self) -> Result<Option<TournamentId>, CoreError> {
        match &self.tournament_id {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => TournamentId::parse(s)
                .map(Some)
                .map_err(|_| CoreError::validation("tournamentId", "invalid tournament id")),
            Some(_) => Err(CoreError::validation(
                "tournamentId",
                "invalid tournament id",
            )),
        }
    }
}

/// The write-path checks every match must pass, whichever route creates or
/// edits it. Checked in order: both team ids well formed, teams distinct,
/// date present, scores non-negative integers.
pub fn validate_match_payload(
    payload: &MatchPayload,
) -> Result<ValidMatch, CoreError> {
    let home_team_id = team_id("homeTeamId", payload.home_team_id.as_ref())?;
    let away_team_id = team_id("awayTeamId", payload.away_team_id.as_ref())?;

    if home_team_id == away_team_id {
        return Err(CoreError::validation(
            "awayTeamId",
            "teams must be different",
        ));
    }

    let date = match &payload.date {
        Some(Value::String(date)) if !date.trim().is_empty() => {
            date.trim().to_string()
        }
        Some(Value::String(_)) | Some(Value::Null) | None => {
            return Err(CoreError::validation("date", "date required"));
        }
        Some(_) => {
            return Err(CoreError::validation("date", "date must be a string"));
        }
    };

    let home_score = score("homeScore", payload.home_score.as_ref())?;
    let away_score = score("awayScore", payload.away_score.as_ref())?;

    Ok(ValidMatch {
        home_team_id,
        away_team_id,
        home_score,
        away_score,
        date,
    })
}

fn team_id(
    field: &'static str,
    value: Option<&Value>,
) -> Result<TeamId, CoreError> {
    match value {
        Some(Value::String(s)) => TeamId::parse(s)
            .map_err(|_| CoreError::validation(field, "invalid team id")),
        _ => Err(CoreError::validation(field, "invalid team id")),
    }
}

/// Integral floats such as `2.0` count as integers.
fn score(field: &'static str, value: Option<&Value>) -> Result<u32, CoreError> {
    let whole = |n: &serde_json::Number| match n.as_u64() {
        Some(n) => u32::try_from(n).ok(),
        None => n
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0 && *f >= 0.0)
            .filter(|f| *f <= f64::from(u32::MAX))
            .map(|f| f as u32),
    };

    let parsed = match value {
        Some(Value::Number(n)) => whole(n),
        _ => None,
    };
    parsed.ok_or_else(|| {
        CoreError::validation(field, "must be a non-negative integer")
    })
}
