use crate::{
    books::sequencer::BookSequencer,
    connection::ConnectionState,
    error::DataError,
    event::{DataKind, MarketStreamEvent},
    exchange::hyperliquid::{
        BASE_URL_HYPERLIQUID, BASE_URL_HYPERLIQUID_TESTNET, HyperliquidChannel, SymbolMap,
        message::HyperliquidMessage, ping_frame, subscribe_frame,
    },
};
use chrono::Utc;
use fnv::FnvHashMap;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vela_instrument::{exchange::ExchangeId, pair::TradingPair};
use vela_integration::{
    channel::Tx,
    error::SocketError,
    reconnect::{BackoffPolicy, BackoffState},
    websocket::{self, WsSink, WsStream},
};

/// Configuration for the Hyperliquid data subscription.
#[derive(Debug, Clone)]
pub struct HyperliquidStreamConfig {
    /// Pairs to subscribe on the {mid-price, L2 book, trades} channels.
    pub pairs: Vec<TradingPair>,
    /// Use the venue testnet endpoint.
    pub testnet: bool,
    /// Keepalive ping cadence; a ping with no pong inside one interval is a
    /// transport failure.
    pub ping_interval: Duration,
    /// Reconnect delay policy.
    pub backoff: BackoffPolicy,
    /// Consecutive failed connection attempts tolerated before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for HyperliquidStreamConfig {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            testnet: false,
            ping_interval: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            max_reconnect_attempts: 10,
        }
    }
}

/// Persistent Hyperliquid market data subscriber.
///
/// Owns the per-symbol book state; on every (re)connection the books are
/// reset and all subscriptions replayed before the feed reports connected.
/// Normalised events flow out through the provided [`Tx`] sink; the
/// WebSocket receive loop never blocks on downstream handler work.
#[derive(Debug)]
pub struct HyperliquidDataStream {
    config: HyperliquidStreamConfig,
    exchange: ExchangeId,
    symbols: SymbolMap,
    state: ConnectionState,
    sequencers: FnvHashMap<TradingPair, BookSequencer>,
    parse_failures: u64,
}

enum DriveExit {
    Shutdown,
    Reconnect,
}

impl HyperliquidDataStream {
    pub fn new(config: HyperliquidStreamConfig) -> Self {
        let exchange = if config.testnet {
            ExchangeId::HyperliquidTestnet
        } else {
            ExchangeId::Hyperliquid
        };
        let symbols = SymbolMap::new(&config.pairs);
        let sequencers = config
            .pairs
            .iter()
            .map(|pair| (pair.clone(), BookSequencer::new()))
            .collect();

        Self {
            config,
            exchange,
            symbols,
            state: ConnectionState::Disconnected,
            sequencers,
            parse_failures: 0,
        }
    }

    /// Current connection lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Frames dropped due to parse failures since construction.
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures
    }

    fn url(&self) -> &'static str {
        if self.config.testnet {
            BASE_URL_HYPERLIQUID_TESTNET
        } else {
            BASE_URL_HYPERLIQUID
        }
    }

    /// Run the subscription until `shutdown` fires or reconnect attempts are
    /// exhausted.
    pub async fn run<TxSink>(
        mut self,
        tx: TxSink,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DataError>
    where
        TxSink: Tx<Item = MarketStreamEvent>,
    {
        let mut backoff = BackoffState::from(self.config.backoff.clone());
        let mut failed_attempts = 0u32;

        loop {
            if *shutdown.borrow() {
                self.state = ConnectionState::Disconnected;
                return Ok(());
            }

            self.state = ConnectionState::Connecting;
            let websocket = match websocket::connect(self.url()).await {
                Ok(websocket) => websocket,
                Err(error) => {
                    failed_attempts += 1;
                    warn!(
                        %error,
                        attempt = failed_attempts,
                        "failed to connect Hyperliquid data stream"
                    );
                    if failed_attempts >= self.config.max_reconnect_attempts {
                        self.state = ConnectionState::Disconnected;
                        return Err(DataError::ReconnectExhausted {
                            attempts: failed_attempts,
                        });
                    }
                    self.state = ConnectionState::Reconnecting;
                    tokio::time::sleep(backoff.next_delay()).await;
                    continue;
                }
            };

            failed_attempts = 0;
            backoff.reset();

            let (mut sink, mut stream) = websocket.split();

            // Book state is stale across connections; replay every
            // subscription before reporting connected.
            for sequencer in self.sequencers.values_mut() {
                sequencer.reset();
            }
            if let Err(error) = self.replay_subscriptions(&mut sink).await {
                warn!(%error, "failed to replay Hyperliquid subscriptions");
                self.state = ConnectionState::Reconnecting;
                tokio::time::sleep(backoff.next_delay()).await;
                continue;
            }

            self.state = ConnectionState::Connected;
            info!(exchange = %self.exchange, pairs = self.config.pairs.len(), "market data connected");
            if tx
                .send(MarketStreamEvent::Connected {
                    exchange: self.exchange,
                    pair: None,
                })
                .is_err()
            {
                return Ok(());
            }

            let exit = self.drive(&mut sink, &mut stream, &tx, &mut shutdown).await;

            let _send = tx.send(MarketStreamEvent::Disconnected {
                exchange: self.exchange,
                pair: None,
            });

            match exit {
                DriveExit::Shutdown => {
                    self.state = ConnectionState::Disconnecting;
                    let _close = sink.close().await;
                    self.state = ConnectionState::Disconnected;
                    return Ok(());
                }
                DriveExit::Reconnect => {
                    self.state = ConnectionState::Reconnecting;
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
        }
    }

    async fn replay_subscriptions(&self, sink: &mut WsSink) -> Result<(), SocketError> {
        sink.send(subscribe_frame(HyperliquidChannel::ALL_MIDS, None))
            .await?;
        for pair in &self.config.pairs {
            sink.send(subscribe_frame(
                HyperliquidChannel::ORDER_BOOK_L2,
                Some(pair.base()),
            ))
            .await?;
            sink.send(subscribe_frame(HyperliquidChannel::TRADES, Some(pair.base())))
                .await?;
        }
        Ok(())
    }

    async fn drive<TxSink>(
        &mut self,
        sink: &mut WsSink,
        stream: &mut WsStream,
        tx: &TxSink,
        shutdown: &mut watch::Receiver<bool>,
    ) -> DriveExit
    where
        TxSink: Tx<Item = MarketStreamEvent>,
    {
        let mut ping_timer = tokio::time::interval(self.config.ping_interval);
        ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The interval's first tick fires immediately and sends the opening ping.
        let mut pong_outstanding = false;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return DriveExit::Shutdown;
                    }
                }
                _ = ping_timer.tick() => {
                    if pong_outstanding {
                        warn!("Hyperliquid pong missing within ping interval");
                        return DriveExit::Reconnect;
                    }
                    if sink.send(ping_frame()).await.is_err() {
                        return DriveExit::Reconnect;
                    }
                    pong_outstanding = true;
                }
                message = stream.next() => {
                    let Some(message) = message else {
                        warn!("Hyperliquid data stream closed by remote");
                        return DriveExit::Reconnect;
                    };

                    match websocket::parse::<HyperliquidMessage>(message) {
                        None => {}
                        Some(Err(SocketError::Deserialise { error, payload })) => {
                            self.parse_failures += 1;
                            warn!(%error, payload, "skipping unparseable Hyperliquid frame");
                        }
                        Some(Err(error)) => {
                            warn!(%error, "Hyperliquid transport failure");
                            return DriveExit::Reconnect;
                        }
                        Some(Ok(frame)) => {
                            if matches!(frame, HyperliquidMessage::Pong) {
                                pong_outstanding = false;
                            }
                            if self.process_frame(frame, sink, tx).await.is_err() {
                                // Sink receiver dropped; nothing left to feed.
                                return DriveExit::Shutdown;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Normalise and forward one parsed frame. `Err` means the downstream
    /// receiver is gone.
    async fn process_frame<TxSink>(
        &mut self,
        frame: HyperliquidMessage,
        sink: &mut WsSink,
        tx: &TxSink,
    ) -> Result<(), vela_integration::channel::SendDropped>
    where
        TxSink: Tx<Item = MarketStreamEvent>,
    {
        let events = match frame.into_events(&self.symbols, self.exchange, Utc::now()) {
            Ok(events) => events,
            Err(error) => {
                self.parse_failures += 1;
                warn!(%error, "skipping malformed Hyperliquid frame");
                return Ok(());
            }
        };

        for event in events {
            match &event.kind {
                DataKind::Book(book_event) => {
                    let advanced = match self
                        .sequencers
                        .entry(event.pair.clone())
                        .or_default()
                        .process(book_event)
                    {
                        Ok(advanced) => advanced.is_some(),
                        Err(error) => {
                            warn!(
                                pair = %event.pair,
                                %error,
                                "book state invalid, resubscribing symbol"
                            );
                            self.recover_symbol(&event.pair, sink, tx).await?;
                            continue;
                        }
                    };

                    if advanced {
                        tx.send(MarketStreamEvent::Item(event))?;
                    } else {
                        debug!(pair = %event.pair, "dropped stale book event");
                    }
                }
                _ => tx.send(MarketStreamEvent::Item(event))?,
            }
        }

        Ok(())
    }

    /// Crossed book or sequence gap: reset the symbol's book, replay its L2
    /// subscription, and publish a disconnected/connected cycle for it.
    async fn recover_symbol<TxSink>(
        &mut self,
        pair: &TradingPair,
        sink: &mut WsSink,
        tx: &TxSink,
    ) -> Result<(), vela_integration::channel::SendDropped>
    where
        TxSink: Tx<Item = MarketStreamEvent>,
    {
        tx.send(MarketStreamEvent::Disconnected {
            exchange: self.exchange,
            pair: Some(pair.clone()),
        })?;

        if let Some(sequencer) = self.sequencers.get_mut(pair) {
            sequencer.reset();
        }
        let resubscribe = sink
            .send(subscribe_frame(
                HyperliquidChannel::ORDER_BOOK_L2,
                Some(pair.base()),
            ))
            .await;
        if let Err(error) = resubscribe {
            warn!(pair = %pair, %error, "failed to resubscribe symbol book");
        }

        tx.send(MarketStreamEvent::Connected {
            exchange: self.exchange,
            pair: Some(pair.clone()),
        })
    }
}

/// Convenience alias for the normalised event stream item.
pub type HyperliquidStreamEvent = MarketStreamEvent<DataKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_match_contract() {
        let config = HyperliquidStreamConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.backoff.backoff_ms_initial, 1_000);
        assert_eq!(config.backoff.backoff_ms_max, 30_000);
    }

    #[test]
    fn test_initial_state_disconnected() {
        let stream = HyperliquidDataStream::new(HyperliquidStreamConfig::default());
        assert_eq!(stream.state(), ConnectionState::Disconnected);
        assert_eq!(stream.parse_failures(), 0);
    }

    #[test]
    fn test_testnet_selects_testnet_exchange() {
        let stream = HyperliquidDataStream::new(HyperliquidStreamConfig {
            testnet: true,
            ..Default::default()
        });
        assert_eq!(stream.exchange, ExchangeId::HyperliquidTestnet);
        assert_eq!(stream.url(), BASE_URL_HYPERLIQUID_TESTNET);
    }
}
