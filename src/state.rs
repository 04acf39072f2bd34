use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use diesel::{
    SqliteConnection,
    r2d2::{ConnectionManager, Pool},
};

use crate::{
    config::Settings,
    error::{CoreError, StoreError},
    store::Store,
};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Builds a connection pool. An in-memory database exists per connection, so
/// `:memory:` gets a pool of exactly one.
pub fn build_pool(db_url: &str) -> Result<DbPool, StoreError> {
    Ok(Pool::builder()
        .max_size(if db_url == ":memory:" { 1 } else { 10 })
        .build(ConnectionManager::<SqliteConnection>::new(db_url))?)
}

/// Shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub key: Key,
    pub settings: Arc<Settings>,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, key: Key, settings: Settings) -> Self {
        AppState {
            store,
            key,
            settings: Arc::new(settings),
        }
    }

    /// Runs a blocking unit of work against the store off the async runtime.
    pub async fn run<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&dyn Store) -> Result<T, CoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "store task did not complete");
                CoreError::Internal
            })?
    }
}
