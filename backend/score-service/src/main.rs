use anyhow::Context;
use score_service::http::{shutdown_signal, start_http_server, HttpServerState};
use score_service::{Config, PgScoreStore, RunMode, ScoreBatchJob};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mode = RunMode::from_args(std::env::args())?;
    let config = Config::from_env().context("Failed to load config")?;

    info!(
        service = %config.service.service_name,
        env = %config.service.app_env,
        mode = ?mode,
        "Starting score service"
    );

    config.database.log_config();
    let pool = db_pool::create_pool(config.database.clone())
        .await
        .context("Failed to create database pool")?;

    if config.run_migrations {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
    }

    let store = Arc::new(PgScoreStore::new(pool.clone()));
    let job = Arc::new(ScoreBatchJob::new(store, config.batch.clone()));

    let outcome = match mode {
        RunMode::Batch => {
            let result = job.run().await;
            if result.success {
                Ok(())
            } else {
                Err(anyhow::anyhow!("Score batch did not complete for every kind"))
            }
        }
        RunMode::Serve => {
            let allow_unauthenticated = config.service.is_development();
            if config.trigger.secret.is_none() && allow_unauthenticated {
                warn!("SCORE_BATCH_TRIGGER_SECRET not set - trigger is unauthenticated");
            }
            let state = HttpServerState {
                job,
                trigger_secret: config.trigger.secret.clone(),
                allow_unauthenticated,
            };
            start_http_server(
                state,
                &config.service.http_host,
                config.service.http_port,
                shutdown_signal(),
            )
            .await
        }
    };

    pool.close().await;

    if let Err(e) = &outcome {
        error!(error = %e, "Score service exited with error");
    }
    outcome
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("score_service=info,resilience=info,db_pool=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
