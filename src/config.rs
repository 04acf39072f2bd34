use std::{net::SocketAddr, path::Path};

use axum::{
    Router,
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::Key;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    auth::{
        login::{do_login, do_logout, me},
        register::do_register,
    },
    error::Resource,
    matches::{
        create::{do_create_match, do_create_tournament_match},
        manage::{do_delete_match, do_patch_match, do_replace_match},
        view::{list_matches_page, view_match_page},
    },
    state::AppState,
    tournaments::{
        create::do_create_tournament,
        manage::{do_delete_tournament, do_rename_tournament},
        standings::standings_page,
        teams::{do_add_team, do_remove_team},
        view::{list_tournaments_page, view_tournament_page},
    },
    util_resp::{StandardResponse, err_not_found, success},
};

/// Minimum length of `secret_key`, as required to derive cookie keys.
pub const MIN_SECRET_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub database_url: String,
    pub bind: SocketAddr,
    /// Key material for the session cookie. A random key is generated when
    /// absent, which signs everyone out on restart.
    pub secret_key: Option<String>,
    pub session_hours: i64,
    /// Whether self-registration may request the admin role.
    pub allow_admin_registration: bool,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: ":memory:".to_string(),
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            secret_key: None,
            session_hours: 2,
            allow_admin_registration: false,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Settings {
    pub fn from_toml_file(path: &Path) -> Result<Settings, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies `DATABASE_URL`, `SECRET_KEY` and `BIND_ADDR` when set.
    pub fn merge_env(mut self) -> Result<Settings, ConfigError> {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(secret) = std::env::var("SECRET_KEY") {
            self.secret_key = Some(secret);
        }
        if let Ok(bind) = std::env::var("BIND_ADDR") {
            self.bind = bind.parse().map_err(|_| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: format!("`{bind}` is not a socket address"),
            })?;
        }
        Ok(self)
    }

    pub fn cookie_key(&self) -> Result<Key, ConfigError> {
        match &self.secret_key {
            Some(secret) => Key::try_from(secret.as_bytes()).map_err(|_| {
                ConfigError::Invalid {
                    name: "secret_key",
                    reason: format!(
                        "must be at least {MIN_SECRET_KEY_LEN} bytes"
                    ),
                }
            }),
            None => {
                tracing::warn!(
                    "no secret key configured; sessions will not survive a restart"
                );
                Ok(Key::generate())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "session_hours",
                reason: "must be positive".to_string(),
            });
        }
        if self
            .log_level
            .parse::<tracing::Level>()
            .is_err()
        {
            return Err(ConfigError::Invalid {
                name: "log_level",
                reason: format!("`{}` is not a log level", self.log_level),
            });
        }
        Ok(())
    }
}

pub async fn version() -> StandardResponse {
    success(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn api_not_found() -> StandardResponse {
    err_not_found(Resource::Route)
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/register", post(do_register))
        .route("/api/auth/login", post(do_login))
        .route("/api/auth/logout", post(do_logout))
        .route("/api/auth/me", get(me))
        .route(
            "/api/tournaments",
            get(list_tournaments_page).post(do_create_tournament),
        )
        .route(
            "/api/tournaments/:id",
            get(view_tournament_page)
                .put(do_rename_tournament)
                .delete(do_delete_tournament),
        )
        .route("/api/tournaments/:id/teams", post(do_add_team))
        .route("/api/tournaments/:id/teams/:team_id", delete(do_remove_team))
        .route(
            "/api/tournaments/:id/matches",
            post(do_create_tournament_match),
        )
        .route("/api/tournaments/:id/standings", get(standings_page))
        .route(
            "/api/matches",
            get(list_matches_page).post(do_create_match),
        )
        .route(
            "/api/matches/:id",
            get(view_match_page)
                .put(do_replace_match)
                .patch(do_patch_match)
                .delete(do_delete_match),
        )
        .route("/api/version", get(version))
        .fallback(api_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
