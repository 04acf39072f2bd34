use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::Response,
};
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{Principal, Session, User, clear_login_cookie, set_login_cookie},
    error::CoreError,
    permission::require_principal,
    state::AppState,
    store::Store,
    util_resp::{json_body, message, success},
    validation::normalize_email,
};

#[derive(Deserialize, Default)]
pub struct LoginForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Checks a user's credentials. An unknown email and a wrong password are
/// reported identically.
#[tracing::instrument(skip(form, store))]
pub fn login(form: &LoginForm, store: &dyn Store) -> Result<User, CoreError> {
    let (Some(email), Some(password)) = (&form.email, &form.password) else {
        return Err(CoreError::validation(
            "email",
            "email and password required",
        ));
    };

    let Some(user) = store.find_user_by_email(&normalize_email(email))? else {
        return Err(CoreError::InvalidCredentials);
    };

    let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|e| {
        tracing::error!(user = %user.id, error = %e, "stored password hash is unreadable");
        CoreError::Internal
    })?;
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(CoreError::InvalidCredentials);
    }

    tracing::debug!(user = %user.id, "logged in");

    Ok(user)
}

pub async fn do_login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    form: Result<Json<LoginForm>, JsonRejection>,
) -> Result<(PrivateCookieJar, Response), CoreError> {
    let form = json_body(form)?;

    let user = state.run(move |store| login(&form, store)).await?;

    let jar = set_login_cookie(user.id, state.settings.session_hours, jar)?;

    Ok((
        jar,
        success(json!({ "message": "Logged in", "role": user.role }))?,
    ))
}

pub async fn do_logout(
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Response), CoreError> {
    Ok((clear_login_cookie(jar), message("Logged out")?))
}

pub async fn me(session: Session) -> Result<Response, CoreError> {
    let principal: &Principal = require_principal(session.principal())?;

    success(json!({ "user": principal }))
}
