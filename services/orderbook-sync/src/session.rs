//! Connection state machine and consumer handle
//!
//! ```text
//! Disconnected → Connecting → Subscribed → Streaming
//!                    ▲                         │ error / close / timeout
//!                    └──── Reconnecting ◄──────┘  (clear, 1s backoff)
//! ```
//!
//! `ConnectionSession::run` is the single ingestion task. Consumers hold an
//! `Arc<OrderBookSession>` and only ever see copies of the book.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use types::errors::{SessionError, SymbolError, TransportError};
use types::symbol::Symbol;
use uuid::Uuid;

use crate::analytics::{
    compute_book_metrics, compute_depth_metrics, DepthMetrics, MidPriceHistory, OrderBookMetrics,
    PriceTrend,
};
use crate::config::{SessionConfig, Venue};
use crate::decoder::ProtocolAdapter;
use crate::events::BookEvent;
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::metrics::SessionMetrics;
use crate::order_book::OrderBookStore;
use crate::snapshot::BookSnapshot;
use crate::transport::{Connector, Frame, Transport};

/// Lifecycle of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

/// Point-in-time status for monitoring consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub venue: Venue,
    pub state: ConnectionState,
    /// Symbol the book currently holds.
    pub symbol: Symbol,
    /// Latest symbol requested by a consumer.
    pub requested_symbol: Symbol,
    pub update_count: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub counters: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct TrendState {
    trend: PriceTrend,
    history: MidPriceHistory,
}

/// Shared handle between the ingestion task and consumers.
#[derive(Debug)]
pub struct OrderBookSession {
    venue: Venue,
    store: OrderBookStore,
    trend: Mutex<TrendState>,
    symbol_tx: watch::Sender<Symbol>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    metrics: SessionMetrics,
}

impl OrderBookSession {
    pub fn new(venue: Venue, symbol: Symbol) -> Self {
        let (symbol_tx, _) = watch::channel(symbol.clone());
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            venue,
            store: OrderBookStore::new(symbol),
            trend: Mutex::new(TrendState::default()),
            symbol_tx,
            state_tx,
            shutdown_tx,
            metrics: SessionMetrics::new(),
        }
    }

    /// Immutable copy of the current book.
    pub fn current_book(&self) -> BookSnapshot {
        self.store.snapshot()
    }

    /// Metrics derived from a fresh snapshot plus the rolling trend.
    pub fn current_metrics(&self) -> (OrderBookMetrics, DepthMetrics) {
        let snapshot = self.store.snapshot();
        let mut book_metrics = compute_book_metrics(&snapshot);
        let depth_metrics = compute_depth_metrics(&snapshot);

        let trend = self.lock_trend();
        book_metrics.trend = trend.trend.summary();
        book_metrics.twap = trend.history.twap();

        (book_metrics, depth_metrics)
    }

    /// Ask the ingestion task to follow another symbol.
    ///
    /// Returns `Ok(false)` when `base`/`quote` already name the requested
    /// symbol.
    pub fn request_symbol_change(&self, base: &str, quote: &str) -> Result<bool, SymbolError> {
        let symbol = Symbol::try_new(base, quote)?;
        let changed = self.symbol_tx.send_if_modified(|current| {
            if *current == symbol {
                false
            } else {
                *current = symbol.clone();
                true
            }
        });

        if changed {
            info!(symbol = %symbol, "Symbol change requested");
        }
        Ok(changed)
    }

    pub fn requested_symbol(&self) -> Symbol {
        self.symbol_tx.borrow().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Stop the ingestion task at its next await point.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn status(&self) -> SessionStatus {
        let (symbol, update_count, last_update) = self
            .store
            .read(|book| (book.symbol().clone(), book.update_count(), book.last_update()));

        SessionStatus {
            venue: self.venue,
            state: self.connection_state(),
            symbol,
            requested_symbol: self.requested_symbol(),
            update_count,
            last_update,
            counters: self.metrics.export(),
        }
    }

    /// Apply a decoded event and feed the trend with the resulting mid.
    pub fn ingest(&self, event: &BookEvent) -> bool {
        if !event.touches_book() {
            self.metrics.record_event_ignored();
            return false;
        }

        let started = std::time::Instant::now();
        let changed = self.store.apply_event(event);
        let latency_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.metrics.record_event_applied(latency_ns);

        if changed {
            if let Some(mid) = self.store.mid_price() {
                let mut trend = self.lock_trend();
                trend.trend.record(mid);
                trend.history.record(mid, Utc::now());
            }
        }
        changed
    }

    /// Prepare the book for a new connection to `symbol`.
    ///
    /// Same symbol: levels are cleared, the trend survives. New symbol: book
    /// and trend both start over.
    pub fn begin_cycle(&self, symbol: &Symbol) {
        if self.store.symbol() == *symbol {
            self.store.clear();
            return;
        }

        self.store.reset(symbol.clone());
        let mut trend = self.lock_trend();
        trend.trend.reset();
        trend.history.clear();
    }

    fn clear_book(&self) {
        self.store.clear();
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(state = state.as_str(), "Connection state changed");
        }
    }

    fn symbol_receiver(&self) -> watch::Receiver<Symbol> {
        self.symbol_tx.subscribe()
    }

    fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    fn lock_trend(&self) -> MutexGuard<'_, TrendState> {
        self.trend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How one connect cycle ended.
#[derive(Debug)]
enum CycleEnd {
    Shutdown,
    SymbolChanged,
    Failed(SessionError),
}

/// What woke the read loop.
enum Wake {
    Shutdown,
    SymbolChanged,
    Heartbeat,
    Frame(Result<Option<Frame>, TransportError>),
}

/// The ingestion task: connect, subscribe, stream, reconnect.
pub struct ConnectionSession<C: Connector> {
    config: SessionConfig,
    adapter: Arc<dyn ProtocolAdapter>,
    connector: C,
    shared: Arc<OrderBookSession>,
    symbol_rx: watch::Receiver<Symbol>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<C: Connector> ConnectionSession<C> {
    pub fn new(config: SessionConfig, connector: C) -> Self {
        let shared = Arc::new(OrderBookSession::new(config.venue, config.symbol.clone()));
        let adapter = config.adapter();
        let symbol_rx = shared.symbol_receiver();
        let shutdown_rx = shared.shutdown_receiver();

        Self {
            config,
            adapter,
            connector,
            shared,
            symbol_rx,
            shutdown_rx,
        }
    }

    /// Consumer handle; clone freely.
    pub fn handle(&self) -> Arc<OrderBookSession> {
        Arc::clone(&self.shared)
    }

    /// Run until shutdown. Only configuration errors end the loop early.
    pub async fn run(mut self) -> Result<(), SessionError> {
        self.config.validate()?;

        info!(
            venue = %self.config.venue,
            protocol = self.adapter.name(),
            endpoint = %self.config.endpoint,
            "Session starting"
        );

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            let symbol = self.symbol_rx.borrow_and_update().clone();
            let connection_id = Uuid::now_v7();
            let span = info_span!("connection", %connection_id, %symbol);

            match self.cycle(&symbol).instrument(span).await {
                CycleEnd::Shutdown => break,
                CycleEnd::SymbolChanged => {
                    self.shared.metrics.record_symbol_change();
                    info!(%connection_id, from = %symbol, "Resubscribing for new symbol");
                }
                CycleEnd::Failed(err) => {
                    warn!(%connection_id, symbol = %symbol, error = %err, "Connection lost, reconnecting");
                    self.shared.set_state(ConnectionState::Reconnecting);
                    self.shared.clear_book();
                    self.shared.metrics.record_reconnect();

                    if self.backoff().await {
                        break;
                    }
                }
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        info!("Session stopped");
        Ok(())
    }

    /// Wait out the reconnect backoff. Returns true on shutdown.
    async fn backoff(&mut self) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown_rx.changed() => true,
            _ = self.symbol_rx.changed() => false,
            _ = sleep(self.config.reconnect_backoff) => false,
        }
    }

    async fn cycle(&mut self, symbol: &Symbol) -> CycleEnd {
        self.shared.set_state(ConnectionState::Connecting);
        self.shared.begin_cycle(symbol);
        self.shared.metrics.record_connect_attempt();

        let connected = tokio::select! {
            biased;
            _ = self.shutdown_rx.changed() => return CycleEnd::Shutdown,
            _ = self.symbol_rx.changed() => return CycleEnd::SymbolChanged,
            result = self.connector.connect(&self.config.endpoint) => result,
        };
        let mut transport = match connected {
            Ok(transport) => transport,
            Err(err) => {
                self.shared.metrics.record_connect_failure();
                return CycleEnd::Failed(err.into());
            }
        };

        self.shared.set_state(ConnectionState::Subscribed);
        let subscription = self.adapter.subscription_message(symbol);
        if let Err(err) = transport.send_text(subscription).await {
            transport.close().await;
            return CycleEnd::Failed(err.into());
        }
        info!(protocol = self.adapter.name(), "Subscribed");

        self.shared.set_state(ConnectionState::Streaming);
        let end = self.stream(&mut transport, symbol).await;
        transport.close().await;
        end
    }

    /// Read loop for one connection.
    async fn stream(&mut self, transport: &mut C::Transport, symbol: &Symbol) -> CycleEnd {
        let ping = self.adapter.ping_message();
        let mut heartbeat = ping
            .as_ref()
            .map(|_| HeartbeatMonitor::new(self.config.heartbeat, Instant::now()));

        loop {
            let deadline = heartbeat.as_ref().map(HeartbeatMonitor::next_deadline);

            let wake = tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => Wake::Shutdown,
                _ = self.symbol_rx.changed() => Wake::SymbolChanged,
                frame = transport.next_frame() => Wake::Frame(frame),
                _ = sleep_until_deadline(deadline) => Wake::Heartbeat,
            };

            match wake {
                Wake::Shutdown => return CycleEnd::Shutdown,
                Wake::SymbolChanged => {
                    if *self.symbol_rx.borrow() != *symbol {
                        return CycleEnd::SymbolChanged;
                    }
                }
                Wake::Heartbeat => {}
                Wake::Frame(Ok(Some(frame))) => {
                    if let Some(monitor) = heartbeat.as_mut() {
                        monitor.record_message(Instant::now());
                    }
                    self.shared.metrics.record_frame();
                    let kind = frame.kind();
                    if let Err(err) = self.handle_frame(frame) {
                        if err.requires_reconnect() {
                            return CycleEnd::Failed(err);
                        }
                        self.shared.metrics.record_decode_error();
                        warn!(frame = kind, error = %err, "Dropping undecodable message");
                    }
                }
                Wake::Frame(Ok(None)) => return CycleEnd::Failed(TransportError::Closed.into()),
                Wake::Frame(Err(err)) => return CycleEnd::Failed(err.into()),
            }

            // Checked on every wake so a busy stream still gets its pings.
            if let (Some(monitor), Some(ping)) = (heartbeat.as_mut(), ping.as_deref()) {
                if let Err(err) = self.service_heartbeat(transport, monitor, ping).await {
                    return CycleEnd::Failed(err);
                }
            }
        }
    }

    /// Send a ping when one is due; fail once the silence limit is exceeded.
    async fn service_heartbeat(
        &self,
        transport: &mut C::Transport,
        monitor: &mut HeartbeatMonitor,
        ping: &str,
    ) -> Result<(), SessionError> {
        let now = Instant::now();
        match monitor.poll(now) {
            HeartbeatAction::Idle => Ok(()),
            HeartbeatAction::SendPing => {
                transport.send_text(ping.to_string()).await?;
                monitor.record_ping(now);
                self.shared.metrics.record_ping();
                debug!("Ping sent");
                Ok(())
            }
            HeartbeatAction::TimedOut(err) => {
                self.shared.metrics.record_heartbeat_timeout();
                Err(err.into())
            }
        }
    }

    /// Decode and apply one frame. A close frame surfaces as a transport
    /// error; anything undecodable as a decode error.
    fn handle_frame(&self, frame: Frame) -> Result<(), SessionError> {
        let event = match &frame {
            Frame::Text(text) => self.adapter.decode_text(text)?,
            Frame::Binary(bytes) => self.adapter.decode_binary(bytes)?,
            Frame::Ping(_) | Frame::Pong(_) => return Ok(()),
            Frame::Close => return Err(TransportError::Closed.into()),
        };

        self.shared.ingest(&event);
        Ok(())
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LevelUpdate;
    use rust_decimal::Decimal;
    use types::numeric::DecimalText;
    use types::side::Side;

    fn eth() -> Symbol {
        Symbol::try_new("ETH", "USDT").unwrap()
    }

    fn level(side: Side, price: &str, qty: &str) -> LevelUpdate {
        LevelUpdate::new(
            side,
            DecimalText::parse(price).unwrap(),
            DecimalText::parse(qty).unwrap(),
        )
    }

    fn two_sided(bid: &str, ask: &str) -> BookEvent {
        BookEvent::Delta {
            updates: vec![level(Side::Bid, bid, "1"), level(Side::Ask, ask, "1")],
        }
    }

    #[test]
    fn test_initial_state() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(session.current_book().is_empty());
        assert_eq!(session.requested_symbol(), eth());
        assert!(!session.is_shutdown());
    }

    #[test]
    fn test_ingest_feeds_trend() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        assert!(session.ingest(&two_sided("99", "101")));

        let (metrics, depth) = session.current_metrics();
        assert_eq!(metrics.mid_price, Decimal::from(100));
        assert_eq!(metrics.trend.samples, 1);
        assert_eq!(metrics.trend.short_term_average, Decimal::from(100));
        assert_eq!(metrics.twap, Some(Decimal::from(100)));
        assert_eq!(depth.cumulative_bid, Decimal::ONE);
    }

    #[test]
    fn test_one_sided_book_does_not_feed_trend() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        session.ingest(&BookEvent::Delta {
            updates: vec![level(Side::Bid, "99", "1")],
        });
        assert_eq!(session.current_metrics().0.trend.samples, 0);
    }

    #[test]
    fn test_unrepresentable_mid_does_not_panic() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        let event = two_sided(
            "79228162514264337593543950334",
            "79228162514264337593543950335",
        );

        assert!(session.ingest(&event));
        assert_eq!(session.current_book().mid_price(), None);
        assert_eq!(session.current_book().spread(), Some(Decimal::ONE));

        let (metrics, depth) = session.current_metrics();
        assert_eq!(metrics, OrderBookMetrics::default());
        assert_eq!(depth.bid_curve.len(), 1);

        session.begin_cycle(&eth());
        session.ingest(&two_sided("99", "101"));
        assert_eq!(session.current_metrics().0.mid_price, Decimal::from(100));
    }

    #[test]
    fn test_ignore_is_counted() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        assert!(!session.ingest(&BookEvent::Ignore));
        assert_eq!(session.metrics().export()["events_ignored"], 1);
        assert_eq!(session.metrics().export()["events_applied"], 0);
    }

    #[test]
    fn test_symbol_change_request() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        assert_eq!(session.request_symbol_change("eth", "usdt"), Ok(false));
        assert_eq!(session.request_symbol_change("btc", "usdt"), Ok(true));
        assert_eq!(session.requested_symbol().concatenated(), "BTCUSDT");
        assert_eq!(
            session.request_symbol_change("", "usdt"),
            Err(SymbolError::EmptyBase)
        );
    }

    #[test]
    fn test_begin_cycle_same_symbol_keeps_trend() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        session.ingest(&two_sided("99", "101"));

        session.begin_cycle(&eth());

        assert!(session.current_book().is_empty());
        assert_eq!(session.current_metrics().0.trend.samples, 1);
    }

    #[test]
    fn test_begin_cycle_new_symbol_resets_everything() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        session.ingest(&two_sided("99", "101"));

        let btc = Symbol::try_new("BTC", "USDT").unwrap();
        session.begin_cycle(&btc);

        let book = session.current_book();
        assert!(book.is_empty());
        assert_eq!(book.symbol, btc);
        assert_eq!(session.current_metrics().0.trend.samples, 0);
    }

    #[test]
    fn test_status() {
        let session = OrderBookSession::new(Venue::Futures, eth());
        session.ingest(&two_sided("99", "101"));
        session.set_state(ConnectionState::Streaming);

        let status = session.status();
        assert_eq!(status.venue, Venue::Futures);
        assert_eq!(status.state, ConnectionState::Streaming);
        assert_eq!(status.update_count, 1);
        assert!(status.last_update.is_some());
        assert_eq!(status.counters["events_applied"], 1);
    }

    #[test]
    fn test_shutdown_flag() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        session.shutdown();
        assert!(session.is_shutdown());
    }

    #[test]
    fn test_state_watch_sees_transitions() {
        let session = OrderBookSession::new(Venue::Spot, eth());
        let mut rx = session.watch_state();
        session.set_state(ConnectionState::Connecting);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);

        session.set_state(ConnectionState::Connecting);
        assert!(!rx.has_changed().unwrap());
    }
}
