use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, Key, SameSite},
};
use chrono::{NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::CoreError,
    ids::UserId,
    state::AppState,
};

pub mod login;
pub mod register;

pub const LOGIN_COOKIE: &str = "sid";

/// The closed set of roles a principal may hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Tournament organisers. Older records spell this `organizer`.
    #[serde(alias = "organizer")]
    Admin,
    #[serde(alias = "participant")]
    User,
}

impl Role {
    /// Whether the role may act on resources it does not own.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Anything that is not a recognised elevated role is an ordinary user.
    pub fn from_stored(s: &str) -> Role {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "organizer" => Role::Admin,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
}

/// The authenticated actor of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Principal {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct LoginSession {
    id: UserId,
    expiry: NaiveDateTime,
}

/// The principal attached to a request, if any.
///
/// A missing, undecryptable or expired cookie, or one naming a user that no
/// longer exists, yields `Session(None)`; deciding whether that is acceptable
/// is left to [`crate::permission::authorize`]. Only a store failure rejects.
pub struct Session(pub Option<Principal>);

impl Session {
    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    AppState: FromRef<S>,
    Key: FromRef<S>,
{
    type Rejection = CoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar<Key> =
            match PrivateCookieJar::from_request_parts(parts, state).await {
                Ok(jar) => jar,
                Err(_) => return Ok(Session(None)),
            };

        let login = match jar
            .get(LOGIN_COOKIE)
            .and_then(|c| serde_json::from_str::<LoginSession>(c.value()).ok())
        {
            Some(login) if Utc::now().naive_utc() < login.expiry => login,
            _ => return Ok(Session(None)),
        };

        let app = AppState::from_ref(state);
        let user = app
            .run(move |store| Ok(store.find_user(&login.id)?))
            .await?;

        if user.is_none() {
            tracing::debug!("session refers to a user that no longer exists");
        }

        Ok(Session(user.as_ref().map(Principal::from)))
    }
}

pub fn set_login_cookie(
    id: UserId,
    session_hours: i64,
    jar: PrivateCookieJar,
) -> Result<PrivateCookieJar, CoreError> {
    let expiry = TimeDelta::try_hours(session_hours)
        .and_then(|d| Utc::now().naive_utc().checked_add_signed(d))
        .ok_or(CoreError::Internal)?;
    let value = serde_json::to_string(&LoginSession { id, expiry })
        .map_err(|_| CoreError::Internal)?;

    Ok(jar.add(
        Cookie::build((LOGIN_COOKIE, value))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/"),
    ))
}

pub fn clear_login_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(LOGIN_COOKIE).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_roles() {
        assert_eq!(Role::from_stored("organizer"), Role::Admin);
        assert_eq!(Role::from_stored(" ADMIN "), Role::Admin);
        assert_eq!(Role::from_stored("participant"), Role::User);
        assert_eq!(Role::from_stored(""), Role::User);
    }

    #[test]
    fn roles_deserialise_from_either_spelling() {
        let role: Role = serde_json::from_str(r#""organizer""#).unwrap();
        assert_eq!(role, Role::Admin);
        let role: Role = serde_json::from_str(r#""user""#).unwrap();
        assert_eq!(role, Role::User);
    }
}
