use crate::{
    cache::{Cache, SharedCache},
    event::{Bus, Event, SystemBusRx, SystemBusTx},
    ledger::{Ledger, LedgerConfig},
    runtime::RuntimeEvent,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vela_data::event::{DataKind, MarketStreamEvent};
use vela_execution::ExecutionEvent;
use vela_integration::channel::UnboundedRx;

/// Default bus queue depth above which low-priority market data is shed.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16_384;

/// Bridges a venue data adapter's stream onto the bus, applying the
/// back-pressure policy: above the high-water mark, market data frames are
/// dropped lowest-priority first (trades and quotes, then deltas; snapshots
/// and order-related events are never dropped), a drop counter is kept, and
/// a degraded event is published once per shedding episode.
#[derive(Debug)]
pub struct MarketBridge {
    bus_tx: SystemBusTx,
    runtimes: Vec<mpsc::UnboundedSender<RuntimeEvent>>,
    ledger: Arc<Mutex<Ledger>>,
    high_water_mark: usize,
    dropped: u64,
    degraded: bool,
}

impl MarketBridge {
    pub fn new(
        bus_tx: SystemBusTx,
        runtimes: Vec<mpsc::UnboundedSender<RuntimeEvent>>,
        ledger: Arc<Mutex<Ledger>>,
        high_water_mark: usize,
    ) -> Self {
        Self {
            bus_tx,
            runtimes,
            ledger,
            high_water_mark,
            dropped: 0,
            degraded: false,
        }
    }

    /// Frames dropped under back-pressure so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Drain the adapter stream until it ends.
    pub async fn run(mut self, mut rx: UnboundedRx<MarketStreamEvent>) {
        while let Some(event) = rx.rx.recv().await {
            self.handle(event);
        }
        debug!("market bridge stream ended");
    }

    /// Route one adapter event.
    pub fn handle(&mut self, event: MarketStreamEvent) {
        match event {
            MarketStreamEvent::Item(market) => {
                if self.should_shed(&market.kind) {
                    self.dropped += 1;
                    if !self.degraded {
                        self.degraded = true;
                        warn!(dropped = self.dropped, "bus over high-water mark, shedding market data");
                        let _send = self.bus_tx.publish(
                            crate::event::topics::SYSTEM_DEGRADED,
                            Event::Degraded {
                                dropped: self.dropped,
                                time: Utc::now(),
                            },
                        );
                    }
                    return;
                }
                if self.degraded && self.bus_tx.depth() < self.high_water_mark / 2 {
                    self.degraded = false;
                }

                let ledger_events = self.ledger.lock().on_market(&market);
                for event in ledger_events {
                    let topic = event.topic();
                    let _send = self.bus_tx.publish(topic, event);
                }

                let event = Event::Market(market.clone());
                let _send = self.bus_tx.publish(event.topic(), event);

                for runtime in &self.runtimes {
                    let _send = runtime.send(RuntimeEvent::Market(market.clone()));
                }
            }
            MarketStreamEvent::Connected { exchange, pair } => {
                let event = Event::Connectivity {
                    exchange,
                    pair,
                    connected: true,
                    time: Utc::now(),
                };
                let _send = self.bus_tx.publish(event.topic(), event);
            }
            MarketStreamEvent::Disconnected { exchange, pair } => {
                let event = Event::Connectivity {
                    exchange,
                    pair,
                    connected: false,
                    time: Utc::now(),
                };
                let _send = self.bus_tx.publish(event.topic(), event);
            }
        }
    }

    fn should_shed(&self, kind: &DataKind) -> bool {
        let depth = self.bus_tx.depth();
        if depth <= self.high_water_mark {
            return false;
        }
        use vela_data::event::FramePriority::*;
        match kind.shed_priority() {
            Low => true,
            // Deltas shed only when the queue keeps growing past the mark.
            Medium => depth > self.high_water_mark + self.high_water_mark / 2,
            High => false,
        }
    }
}

/// Bridges a venue execution event stream (user stream or mock client) into
/// the ledger, the bus and the strategy runtimes. Order-related events are
/// never shed.
#[derive(Debug)]
pub struct ExecutionBridge {
    bus_tx: SystemBusTx,
    runtimes: Vec<mpsc::UnboundedSender<RuntimeEvent>>,
    ledger: Arc<Mutex<Ledger>>,
}

impl ExecutionBridge {
    pub fn new(
        bus_tx: SystemBusTx,
        runtimes: Vec<mpsc::UnboundedSender<RuntimeEvent>>,
        ledger: Arc<Mutex<Ledger>>,
    ) -> Self {
        Self {
            bus_tx,
            runtimes,
            ledger,
        }
    }

    pub async fn run(mut self, mut rx: UnboundedRx<ExecutionEvent>) {
        while let Some(event) = rx.rx.recv().await {
            self.handle(event);
        }
        debug!("execution bridge stream ended");
    }

    /// Route one execution event.
    pub fn handle(&mut self, event: ExecutionEvent) {
        // Submission is recorded by the emitting runtime; the user stream's
        // echo would be a duplicate transition.
        if matches!(event, ExecutionEvent::Submitted { .. }) {
            debug!("skipping user-stream submission echo");
            return;
        }

        match self.ledger.lock().on_execution_event(&event) {
            Ok(events) => {
                for event in events {
                    let topic = event.topic();
                    let _send = self.bus_tx.publish(topic, event);
                }
            }
            Err(error) => warn!(%error, "ledger refused execution event"),
        }

        for runtime in &self.runtimes {
            let _send = runtime.send(RuntimeEvent::Execution(event.clone()));
        }
    }
}

/// Spawn the bus thread: a task that owns the [`Bus`] (with the cache
/// attached) and drains the MPSC queue in push order.
pub fn spawn_bus_task(
    mut bus_rx: SystemBusRx,
) -> (SharedCache, tokio::task::JoinHandle<()>) {
    let cache: SharedCache = Arc::new(Mutex::new(Cache::default()));
    let mut bus = Bus::new();
    crate::cache::attach(Arc::clone(&cache), &mut bus);

    let handle = tokio::spawn(async move {
        while let Some(command) = bus_rx.recv().await {
            // Apply the awaited command, then opportunistically drain the
            // rest of the queue in push order.
            match command {
                vela_bus::BusCommand::Publish { topic, event } => bus.publish(&topic, &event),
                vela_bus::BusCommand::Subscribe { topic_or_pattern, handler } => {
                    let mut handler = handler;
                    bus.subscribe(&topic_or_pattern, move |event| handler(event));
                }
                vela_bus::BusCommand::Unsubscribe(id) => {
                    let _result = bus.unsubscribe(id);
                }
                vela_bus::BusCommand::Register { endpoint, handler } => {
                    let mut handler = handler;
                    bus.register(&endpoint, move |request| handler(request));
                }
            }
            bus_rx.drain_into(&mut bus);
        }
        info!("bus task exited");
    });

    (cache, handle)
}

/// Construct the shared ledger for a live or paper session.
pub fn shared_ledger(config: LedgerConfig) -> Arc<Mutex<Ledger>> {
    Arc::new(Mutex::new(Ledger::new(config, Utc::now())))
}
