use std::sync::Arc;
use std::time::Duration;

use auth::TokenCodec;
use auth_service::config::Config;
use auth_service::config::StorageBackend;
use auth_service::lifecycle::Supervisor;
use auth_service::memory::InMemoryCredentialDirectory;
use auth_service::memory::InMemoryPairRegistry;
use auth_service::memory::InMemoryRevocationRegistry;
use auth_service::repositories::PostgresCredentialDirectory;
use auth_service::repositories::PostgresPairRegistry;
use auth_service::repositories::PostgresRevocationRegistry;
use auth_service::repositories::PostgresStore;
use auth_service::session::errors::StorageError;
use auth_service::session::models::EmailAddress;
use auth_service::session::models::NewAccount;
use auth_service::session::ports::SessionServicePort;
use auth_service::session::service::SessionService;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEMO_EMAIL: &str = "example@example.com";
const DEMO_PASSWORD: &str = "password";
const DEMO_ROLE: &str = "student";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_service=debug,auth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        service = "auth-service",
        version = env!("CARGO_PKG_VERSION"),
        "Service starting"
    );

    let config = Config::load()?;

    tracing::info!(
        environment = %config.environment,
        backend = ?config.storage.backend,
        access_ttl_secs = config.tokens.access_ttl_secs,
        refresh_ttl_secs = config.tokens.refresh_ttl_secs,
        "Configuration loaded"
    );

    let codec = Arc::new(TokenCodec::new(
        config.tokens.secret.as_bytes(),
        config.tokens.access_ttl(),
        config.tokens.refresh_ttl(),
    )?);

    match config.storage.backend {
        StorageBackend::Memory => run_in_memory(&config, codec).await,
        StorageBackend::Postgres => run_postgres(&config, codec).await,
    }
}

async fn run_in_memory(config: &Config, codec: Arc<TokenCodec>) -> Result<(), anyhow::Error> {
    let credentials = Arc::new(InMemoryCredentialDirectory::new());
    let pairs = Arc::new(InMemoryPairRegistry::new(
        codec.refresh_ttl(),
        Arc::new(Supervisor::new("memory-pairs")),
    ));
    let revocations = Arc::new(InMemoryRevocationRegistry::new(
        Arc::clone(&codec),
        Arc::new(Supervisor::new("memory-revocations")),
    ));

    pairs.spawn_purge(config.storage.purge_interval());
    revocations.spawn_purge(config.storage.purge_interval());
    tracing::info!(backend = "memory", "Session storage ready");

    if !config.is_production() {
        let demo = NewAccount::new(EmailAddress::new(DEMO_EMAIL)?, DEMO_PASSWORD, DEMO_ROLE);
        seed_result(credentials.add_account(demo).await)?;
    }

    let service = SessionService::new(codec, credentials, pairs, revocations);
    run_until_stopped(service, config.shutdown.grace_period()).await
}

async fn run_postgres(config: &Config, codec: Arc<TokenCodec>) -> Result<(), anyhow::Error> {
    let database_url = config
        .storage
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("storage.database_url is required for the postgres backend"))?;

    let pg_pool = PgPoolOptions::new()
        .max_connections(config.storage.max_connections)
        .connect(database_url)
        .await?;
    tracing::info!(
        max_connections = config.storage.max_connections,
        database = "postgresql",
        "Database connection pool created"
    );

    sqlx::migrate!("./migrations").run(&pg_pool).await?;
    tracing::info!(database = "postgresql", "Database migrations completed");

    let store = Arc::new(PostgresStore::new(pg_pool));
    let credentials = Arc::new(PostgresCredentialDirectory::new(Arc::clone(&store)));
    let pairs = Arc::new(PostgresPairRegistry::new(Arc::clone(&store), codec.refresh_ttl()));
    let revocations = Arc::new(PostgresRevocationRegistry::new(
        Arc::clone(&store),
        Arc::clone(&codec),
    ));

    store.spawn_health_check(config.storage.health_check_interval());
    pairs.spawn_purge(config.storage.purge_interval());
    revocations.spawn_purge(config.storage.purge_interval());
    tracing::info!(backend = "postgres", "Session storage ready");

    if !config.is_production() {
        let demo = NewAccount::new(EmailAddress::new(DEMO_EMAIL)?, DEMO_PASSWORD, DEMO_ROLE);
        seed_result(credentials.add_account(demo).await)?;
    }

    let service = SessionService::new(codec, credentials, pairs, revocations);
    run_until_stopped(service, config.shutdown.grace_period()).await
}

fn seed_result<T>(result: Result<T, StorageError>) -> Result<(), anyhow::Error> {
    match result {
        Ok(_) => {
            tracing::info!(email = DEMO_EMAIL, role = DEMO_ROLE, "Demonstration account seeded");
            Ok(())
        }
        Err(StorageError::AlreadyExists(_)) => {
            tracing::debug!(email = DEMO_EMAIL, "Demonstration account already present");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_until_stopped<S>(service: S, grace: Duration) -> Result<(), anyhow::Error>
where
    S: SessionServicePort,
{
    tracing::info!("Session service running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!(grace_period_secs = grace.as_secs(), "Shutdown requested");

    match service.shut_down(grace).await {
        Ok(()) => {
            tracing::info!("Service stopped");
            Ok(())
        }
        Err(e) => {
            for failure in &e.failures {
                tracing::error!(component = %failure.component, error = %failure.message, "Component failed to stop");
            }
            Err(e.into())
        }
    }
}
