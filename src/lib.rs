use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub mod auth;
pub mod config;
pub mod error;
pub mod ids;
pub mod matches;
pub mod permission;
pub mod schema;
pub mod state;
pub mod store;
pub mod tournaments;
pub mod util_resp;
pub mod validation;

#[cfg(test)]
mod test;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
