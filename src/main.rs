use std::{
    error::Error,
    net::SocketAddr,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use touchline::{
    auth::register::{RegisterForm, register},
    config::{ConfigError, Settings, create_app},
    error::CoreError,
    state::AppState,
    store::sqlite::SqliteStore,
};

#[derive(Parser)]
#[command(version, about = "Football tournament results and standings")]
struct Cli {
    /// TOML settings file. Environment variables override it, and flags
    /// override both.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serves the HTTP API.
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Creates a user directly in the store. Does nothing if the email is
    /// already registered.
    SeedUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "user")]
        role: String,
    },
}

fn load_settings(
    config: Option<&Path>,
    database_url: Option<String>,
) -> Result<Settings, ConfigError> {
    let settings = match config {
        Some(path) => Settings::from_toml_file(path)?,
        None => Settings::default(),
    };
    let mut settings = settings.merge_env()?;
    if let Some(url) = database_url {
        settings.database_url = url;
    }
    Ok(settings)
}

fn init_tracing(settings: &Settings) {
    let level = settings
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn serve(
    mut settings: Settings,
    bind: Option<SocketAddr>,
) -> Result<(), Box<dyn Error>> {
    if let Some(bind) = bind {
        settings.bind = bind;
    }
    settings.validate()?;
    init_tracing(&settings);

    let key = settings.cookie_key()?;
    let store = SqliteStore::open(&settings.database_url)?;
    tracing::info!(database = %settings.database_url, "store ready");

    let addr = settings.bind;
    let app = create_app(AppState::new(Arc::new(store), key, settings));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn seed_user(
    settings: Settings,
    email: String,
    password: String,
    role: String,
) -> Result<(), Box<dyn Error>> {
    settings.validate()?;
    init_tracing(&settings);

    let store = SqliteStore::open(&settings.database_url)?;
    let form = RegisterForm {
        email: Some(email.clone()),
        password: Some(password),
        role: Some(role),
    };

    match register(&form, true, &store) {
        Ok(user) => {
            println!("created {} ({})", user.email, user.role.as_str());
            Ok(())
        }
        Err(CoreError::Conflict(_)) => {
            println!("{email} already exists");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result =
        match load_settings(cli.config.as_deref(), cli.database_url) {
            Ok(settings) => match cli.command {
                Command::Serve { bind } => serve(settings, bind).await,
                Command::SeedUser {
                    email,
                    password,
                    role,
                } => seed_user(settings, email, password, role),
            },
            Err(e) => Err(e.into()),
        };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("touchline: {e}");
            ExitCode::FAILURE
        }
    }
}
