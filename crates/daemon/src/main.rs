//! Beacon delivery daemon binary entrypoint.

use std::sync::Arc;

use tokio::sync::watch;

use beacon_common::config::AppConfig;
use beacon_common::connections;
use beacon_pager::{
    DeliveryPolicy, DeliveryQueue, DeliveryScheduler, PgPagerStore, RedisEventSink,
    SchedulerIntervals, TapTransmitter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_daemon=info,beacon_pager=info".into()),
        )
        .json()
        .init();

    tracing::info!("Beacon delivery daemon starting...");

    let config = AppConfig::from_env()?;
    let policy = DeliveryPolicy::from_config(&config)?;

    let pool = connections::create_pool(&config.database_url, config.db_max_connections).await?;
    connections::migrate(&pool).await?;

    let redis = connections::create_redis_manager(&config.redis_url).await?;

    let store = PgPagerStore::new(pool);
    let transport_key = config.pager_transport_key.clone();

    // One daemon per transport key; per-message claims still guard other senders
    let Some(lock) = store.acquire_consumer_lock(&transport_key).await? else {
        anyhow::bail!("another delivery daemon already serves transport '{transport_key}'");
    };

    let queue = DeliveryQueue::new(
        Arc::new(store),
        Arc::new(TapTransmitter::new(
            config.pager_transmitter_addr.clone(),
            config.pager_transmit_timeout(),
        )),
        Arc::new(RedisEventSink::new(redis, config.pager_events_channel.clone())),
        policy,
    );
    let scheduler = DeliveryScheduler::new(
        Arc::new(queue),
        transport_key.clone(),
        SchedulerIntervals::from_config(&config),
    );

    tracing::info!(
        transport_key = %transport_key,
        transmitter = %config.pager_transmitter_addr,
        "Starting delivery scheduler"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut handle = tokio::spawn(async move { scheduler.run(stop_rx).await });

    // Run with graceful shutdown on Ctrl+C; a send in progress is allowed to finish
    let outcome = tokio::select! {
        result = &mut handle => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
            let _ = stop_tx.send(true);
            handle.await
        }
    };

    if let Err(e) = lock.release().await {
        tracing::warn!(error = %e, "Failed to release consumer lock");
    }

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Delivery scheduler exited with error");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!("Beacon delivery daemon stopped.");
    Ok(())
}
