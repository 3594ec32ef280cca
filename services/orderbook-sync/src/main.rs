use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;
use orderbook_sync::analytics::format_compact;
use orderbook_sync::http::create_router;
use orderbook_sync::transport::WsConnector;
use orderbook_sync::{ConnectionSession, OrderBookSession, ServiceConfig};
use tokio::net::TcpListener;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;
use types::errors::{FatalError, SessionError};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env().context("reading ORDERBOOK_* configuration")?;
    config.session.validate()?;

    tracing::info!(
        venue = %config.session.venue,
        symbol = %config.session.symbol,
        version = orderbook_sync::SERVICE_VERSION,
        "Starting order book sync"
    );

    let connector = WsConnector::new(config.session.connect_timeout);
    let session = ConnectionSession::new(config.session.clone(), connector);
    let handle = session.handle();

    let mut ingestion = tokio::spawn(session.run());
    let summary = tokio::spawn(log_summaries(Arc::clone(&handle), config.summary_interval));

    let listener = TcpListener::bind(config.http_addr).await?;
    tracing::info!("Listening on {}", config.http_addr);

    let shutdown_handle = Arc::clone(&handle);
    let server = axum::serve(listener, create_router(Arc::clone(&handle)))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
            shutdown_handle.shutdown();
        })
        .into_future();

    let outcome = tokio::select! {
        served = server => {
            served?;
            handle.shutdown();
            (&mut ingestion).await
        }
        joined = &mut ingestion => joined,
    };
    summary.abort();

    match outcome {
        Ok(result) => result.map_err(Into::into),
        Err(join_error) => {
            Err(SessionError::from(FatalError::TaskAborted(join_error.to_string())).into())
        }
    }
}

async fn log_summaries(session: Arc<OrderBookSession>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let book = session.current_book();
        let (metrics, depth) = session.current_metrics();

        tracing::info!(
            symbol = %book.symbol,
            state = session.connection_state().as_str(),
            bids = book.bids.len(),
            asks = book.asks.len(),
            best_bid = %book.best_bid().map_or("-", |l| l.price.text()),
            best_ask = %book.best_ask().map_or("-", |l| l.price.text()),
            spread_pct = %metrics.spread_pct.round_dp(4),
            bid_depth = %format_compact(depth.cumulative_bid),
            ask_depth = %format_compact(depth.cumulative_ask),
            imbalance = %metrics.liquidity_imbalance.round_dp(4),
            momentum = %metrics.trend.momentum.round_dp(6),
            "Book summary"
        );
    }
}
