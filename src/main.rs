use std::{error::Error, sync::Arc};

use clap::{Parser, Subcommand};
use recipe_api::{
    actions::users::create_superuser,
    config::Config,
    memory::MemoryStore,
    postgres::PgStore,
    repository::Store,
    routes::{api, AppContext},
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "recipe-api", version, about = "Recipe, tag and ingredient API server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Create an account with staff and superuser rights
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

async fn connect(config: &Config) -> Result<Arc<dyn Store>, Box<dyn Error>> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(
                url,
                config.database_max_connections,
                config.database_wait_attempts,
            )
            .await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        None => {
            log::warn!("DATABASE_URL not set, data is kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let dotenv = dotenvy::dotenv();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    if let Ok(path) = dotenv {
        log::info!("Loaded environment from {}", path.display());
    }

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let store = connect(&config).await?;
            tokio::fs::create_dir_all(&config.media_root).await?;

            let address = config.bind_address;
            let routes = api(AppContext::new(store, config));

            log::info!("Listening on {address}");
            warp::serve(routes).run(address).await;
        }
        Command::Migrate => {
            let Some(url) = &config.database_url else {
                return Err("DATABASE_URL must be set to run migrations".into());
            };
            let store = PgStore::connect(
                url,
                config.database_max_connections,
                config.database_wait_attempts,
            )
            .await?;
            store.migrate().await?;
            log::info!("Migrations applied");
        }
        Command::CreateSuperuser { email, password } => {
            let store = connect(&config).await?;
            let user = create_superuser(store.as_ref(), &email, &password).await?;
            log::info!("Superuser {} created with id {}", user.email, user.id);
        }
    }

    Ok(())
}
