use argon2::Argon2;
use argon2::PasswordHasher;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::Response,
};
use axum_extra::extract::PrivateCookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{Role, User, set_login_cookie},
    error::CoreError,
    ids::UserId,
    state::AppState,
    store::Store,
    util_resp::{created, json_body},
    validation::{is_valid_email, is_valid_password, normalize_email},
};

#[derive(Deserialize, Default)]
pub struct RegisterForm {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String, CoreError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "failed to hash password");
            CoreError::Internal
        })
}

/// Creates a user. An elevated role is granted only when `allow_admin` is set;
/// otherwise every registration is an ordinary user.
#[tracing::instrument(skip(form, store))]
pub fn register(
    form: &RegisterForm,
    allow_admin: bool,
    store: &dyn Store,
) -> Result<User, CoreError> {
    let (Some(email), Some(password)) = (&form.email, &form.password) else {
        return Err(CoreError::validation(
            "email",
            "email and password required",
        ));
    };

    let email = normalize_email(email);
    is_valid_email(&email).map_err(|e| CoreError::validation("email", e))?;
    is_valid_password(password)
        .map_err(|e| CoreError::validation("password", e))?;

    let requested = form.role.as_deref().map(Role::from_stored);
    let role = match requested {
        Some(Role::Admin) if allow_admin => Role::Admin,
        _ => Role::User,
    };

    if store.find_user_by_email(&email)?.is_some() {
        return Err(CoreError::Conflict("email already exists".to_string()));
    }

    let user = User {
        id: UserId::generate(),
        email,
        password_hash: hash_password(password)?,
        role,
        created_at: Utc::now().naive_utc(),
    };

    // The lookup above only spares a hash; this is the authoritative check.
    if !store.insert_user_if_email_free(&user)? {
        return Err(CoreError::Conflict("email already exists".to_string()));
    }

    tracing::info!(user = %user.id, role = user.role.as_str(), "registered user");

    Ok(user)
}

pub async fn do_register(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    form: Result<Json<RegisterForm>, JsonRejection>,
) -> Result<(PrivateCookieJar, Response), CoreError> {
    let form = json_body(form)?;
    let allow_admin = state.settings.allow_admin_registration;

    let user = state
        .run(move |store| register(&form, allow_admin, store))
        .await?;

    // Registration signs the new user straight in.
    let jar = set_login_cookie(user.id, state.settings.session_hours, jar)?;

    Ok((
        jar,
        created(json!({
            "message": "Registered",
            "role": user.role,
        }))?,
    ))
}
