use std::sync::Arc;

use actions::{ConfirmPaymentAction, ExpirationReaper, ReserveAction};
use backend::{config::AppConfig, logger::init_tracing};
use coordination::idempotency::RedisIdempotencyStore;
use coordination::lock::RedisLockStore;
use events::{LapinEventPublisher, declare_topology};
use lapin::{Connection, ConnectionProperties};
use store::{Db, PgReservationRepository, ReservationRepository};

/// Connects Postgres, Redis and RabbitMQ, runs migrations, declares the AMQP
/// topology, and wires the three actions that make up the core.
async fn bootstrap(cfg: &AppConfig) -> anyhow::Result<(Arc<ReserveAction>, Arc<ConfirmPaymentAction>, Arc<ExpirationReaper>)> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;
    let repo: Arc<dyn ReservationRepository> = Arc::new(PgReservationRepository::new((*db.pool).clone()));

    let redis_client = redis::Client::open(cfg.redis_url())?;
    let redis_conn = redis_client.get_connection_manager().await?;
    let locks = Arc::new(RedisLockStore::from_connection_manager(redis_conn.clone()));
    let idempotency = Arc::new(RedisIdempotencyStore::from_connection_manager(redis_conn));

    let amqp = Connection::connect(&cfg.rabbitmq_uri, ConnectionProperties::default()).await?;
    let channel = amqp.create_channel().await?;
    declare_topology(&channel).await?;
    let publisher = Arc::new(LapinEventPublisher::new(channel));

    let reserve = Arc::new(ReserveAction::new(
        repo.clone(),
        locks.clone(),
        idempotency,
        publisher.clone(),
    ));
    let confirm = Arc::new(ConfirmPaymentAction::new(repo.clone(), locks.clone(), publisher.clone()));
    let reaper = Arc::new(ExpirationReaper::new(repo, locks, publisher));

    Ok((reserve, confirm, reaper))
}

/// Runs `reaper.tick()` on a fixed cadence. Every replica runs this loop;
/// the reaper's own leader lock decides which one actually sweeps on a
/// given tick.
fn start_reaper_loop(reaper: Arc<ExpirationReaper>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            reaper.tick().await;
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("starting cinema reservation backend");

    let cfg = AppConfig::from_env();
    let (_reserve, _confirm, reaper) = bootstrap(&cfg).await?;

    start_reaper_loop(reaper, cfg.reaper_tick_interval());

    tracing::info!(port = cfg.port, "backend started; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    Ok(())
}
