#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Vela-Bus
//! In-process topic-routed publish-subscribe fabric that decouples every Vela
//! component from its producers. Delivery is synchronous and single-threaded:
//! the bus is owned by one thread, handlers fire in registration order, and
//! parallel producers cross into the bus by posting [`BusCommand`]s onto the
//! MPSC queue drained by the owning thread.
//!
//! Topics are dot-separated ASCII (eg/ `orderbook.ETH/USDC.delta`).
//! Subscription patterns support a trailing `*` wildcard only
//! (eg/ `market_data.*`).

use fnv::FnvHashMap;
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;
use tracing::{debug, error};

/// Topic name or subscription pattern.
pub type Topic = SmolStr;

/// Conventional topic used by [`EventBus::send`] for fire-and-forget commands.
pub const COMMAND_TOPIC: &str = "system.command";

/// Result type returned by subscription handlers. Errors are logged and
/// counted by the bus; they never abort a publish.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Boxed subscription handler stored by the bus.
pub type EventHandler<E> = Box<dyn FnMut(&E) -> HandlerResult + Send>;

/// Boxed request-reply handler stored by the bus.
pub type RequestHandler<Req, Rsp> = Box<dyn FnMut(Req) -> Result<Rsp, BusError> + Send>;

/// All errors surfaced by [`EventBus`] operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("no request handler registered for endpoint: {0}")]
    EndpointNotFound(Topic),

    #[error("request handler failed: {0}")]
    Handler(String),

    #[error("subscription not found: {0:?}")]
    SubscriptionNotFound(SubscriptionId),
}

/// Token identifying a single handler registration, returned by
/// [`EventBus::subscribe`] and consumed by [`EventBus::unsubscribe`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber<E> {
    id: SubscriptionId,
    /// Global registration sequence, used to order delivery across exact and
    /// wildcard matches for the same publish.
    registered: u64,
    handler: EventHandler<E>,
}

impl<E> std::fmt::Debug for Subscriber<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

/// Topic-routed publish-subscribe bus with request-reply endpoints.
///
/// Generic over the event type `E` and the request-reply payloads, so the
/// same fabric serves live trading and backtests.
pub struct EventBus<E, Req = E, Rsp = E> {
    exact: IndexMap<Topic, Vec<Subscriber<E>>>,
    /// `(prefix, subscriber)` pairs; `prefix` is the pattern minus its
    /// trailing `*`.
    wildcard: Vec<(Topic, Subscriber<E>)>,
    endpoints: FnvHashMap<Topic, RequestHandler<Req, Rsp>>,
    registration_sequence: u64,
    handler_errors: u64,
}

impl<E, Req, Rsp> std::fmt::Debug for EventBus<E, Req, Rsp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("exact_topics", &self.exact.len())
            .field("wildcard_subscriptions", &self.wildcard.len())
            .field("endpoints", &self.endpoints.len())
            .field("handler_errors", &self.handler_errors)
            .finish()
    }
}

impl<E, Req, Rsp> Default for EventBus<E, Req, Rsp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, Req, Rsp> EventBus<E, Req, Rsp> {
    pub fn new() -> Self {
        Self {
            exact: IndexMap::new(),
            wildcard: Vec::new(),
            endpoints: FnvHashMap::default(),
            registration_sequence: 0,
            handler_errors: 0,
        }
    }

    /// Register a handler for an exact topic, or for a trailing-`*` pattern.
    ///
    /// Registering the same handler logic twice yields two independent
    /// subscriptions, each invoked once per matching publish.
    pub fn subscribe<F>(&mut self, topic_or_pattern: &str, handler: F) -> SubscriptionId
    where
        F: FnMut(&E) -> HandlerResult + Send + 'static,
    {
        let registered = self.registration_sequence;
        self.registration_sequence += 1;

        let subscriber = Subscriber {
            id: SubscriptionId(registered),
            registered,
            handler: Box::new(handler),
        };
        let id = subscriber.id;

        match topic_or_pattern.strip_suffix('*') {
            Some(prefix) => self.wildcard.push((Topic::new(prefix), subscriber)),
            None => self
                .exact
                .entry(Topic::new(topic_or_pattern))
                .or_default()
                .push(subscriber),
        }

        id
    }

    /// Remove the single registration identified by `id`.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), BusError> {
        for subscribers in self.exact.values_mut() {
            if let Some(index) = subscribers.iter().position(|sub| sub.id == id) {
                subscribers.remove(index);
                return Ok(());
            }
        }

        if let Some(index) = self.wildcard.iter().position(|(_, sub)| sub.id == id) {
            self.wildcard.remove(index);
            return Ok(());
        }

        Err(BusError::SubscriptionNotFound(id))
    }

    /// Invoke every handler whose subscription matches `topic`, in
    /// registration order. Handler errors are logged and counted but never
    /// abort the publish.
    pub fn publish(&mut self, topic: &str, event: &E) {
        let mut matched: Vec<&mut Subscriber<E>> = Vec::new();

        if let Some(subscribers) = self.exact.get_mut(topic) {
            matched.extend(subscribers.iter_mut());
        }
        matched.extend(
            self.wildcard
                .iter_mut()
                .filter(|(prefix, _)| topic.starts_with(prefix.as_str()))
                .map(|(_, subscriber)| subscriber),
        );

        matched.sort_by_key(|subscriber| subscriber.registered);

        let mut errors = 0;
        for subscriber in matched {
            if let Err(err) = (subscriber.handler)(event) {
                errors += 1;
                error!(topic, subscription = ?subscriber.id, %err, "bus handler failed");
            }
        }
        self.handler_errors += errors;
    }

    /// Fire-and-forget command publish over the conventional command topic.
    pub fn send(&mut self, command: &E) {
        self.publish(COMMAND_TOPIC, command);
    }

    /// Register the request handler for an endpoint. Exactly one handler per
    /// endpoint; re-registration overwrites the previous handler.
    pub fn register<F>(&mut self, endpoint: &str, handler: F)
    where
        F: FnMut(Req) -> Result<Rsp, BusError> + Send + 'static,
    {
        if self
            .endpoints
            .insert(Topic::new(endpoint), Box::new(handler))
            .is_some()
        {
            debug!(endpoint, "re-registered request endpoint, previous handler replaced");
        }
    }

    /// Synchronously invoke the handler registered for `endpoint`.
    ///
    /// Fails with [`BusError::EndpointNotFound`] when unregistered; handler
    /// errors propagate to the caller.
    pub fn request(&mut self, endpoint: &str, request: Req) -> Result<Rsp, BusError> {
        let handler = self
            .endpoints
            .get_mut(endpoint)
            .ok_or_else(|| BusError::EndpointNotFound(Topic::new(endpoint)))?;

        handler(request)
    }

    /// Total handler errors swallowed since construction.
    pub fn handler_errors(&self) -> u64 {
        self.handler_errors
    }
}

/// Cross-thread command posted onto the bus queue by parallel producers
/// (venue adapter receive threads, execution response threads).
pub enum BusCommand<E, Req, Rsp> {
    Publish { topic: Topic, event: E },
    Subscribe { topic_or_pattern: Topic, handler: EventHandler<E> },
    Unsubscribe(SubscriptionId),
    Register { endpoint: Topic, handler: RequestHandler<Req, Rsp> },
}

impl<E, Req, Rsp> std::fmt::Debug for BusCommand<E, Req, Rsp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish { topic, .. } => f.debug_struct("Publish").field("topic", topic).finish_non_exhaustive(),
            Self::Subscribe { topic_or_pattern, .. } => f
                .debug_struct("Subscribe")
                .field("topic_or_pattern", topic_or_pattern)
                .finish_non_exhaustive(),
            Self::Unsubscribe(id) => f.debug_tuple("Unsubscribe").field(id).finish(),
            Self::Register { endpoint, .. } => {
                f.debug_struct("Register").field("endpoint", endpoint).finish_non_exhaustive()
            }
        }
    }
}

/// Producer half of the thread-safe bus queue. Cheap to clone; tracks queue
/// depth so producers can apply back-pressure policies.
#[derive(Debug)]
pub struct BusTx<E, Req = E, Rsp = E> {
    tx: tokio::sync::mpsc::UnboundedSender<BusCommand<E, Req, Rsp>>,
    depth: Arc<AtomicUsize>,
}

impl<E, Req, Rsp> Clone for BusTx<E, Req, Rsp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            depth: Arc::clone(&self.depth),
        }
    }
}

impl<E, Req, Rsp> BusTx<E, Req, Rsp> {
    /// Post a publish command onto the queue.
    pub fn publish(&self, topic: impl Into<Topic>, event: E) -> Result<(), vela_integration::channel::SendDropped> {
        self.command(BusCommand::Publish {
            topic: topic.into(),
            event,
        })
    }

    /// Post an arbitrary [`BusCommand`] onto the queue.
    pub fn command(
        &self,
        command: BusCommand<E, Req, Rsp>,
    ) -> Result<(), vela_integration::channel::SendDropped> {
        self.tx
            .send(command)
            .map_err(|_| vela_integration::channel::SendDropped)?;
        self.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Commands currently queued and not yet drained. Used by producers to
    /// detect the high-water mark and shed low-priority load.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

/// Consumer half of the thread-safe bus queue, drained by the bus thread.
#[derive(Debug)]
pub struct BusRx<E, Req = E, Rsp = E> {
    rx: tokio::sync::mpsc::UnboundedReceiver<BusCommand<E, Req, Rsp>>,
    depth: Arc<AtomicUsize>,
}

impl<E: 'static, Req: 'static, Rsp: 'static> BusRx<E, Req, Rsp> {
    /// Drain all queued commands into the bus, preserving push order.
    /// Returns the number of commands applied.
    pub fn drain_into(&mut self, bus: &mut EventBus<E, Req, Rsp>) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.rx.try_recv() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            applied += 1;
            match command {
                BusCommand::Publish { topic, event } => bus.publish(&topic, &event),
                BusCommand::Subscribe { topic_or_pattern, handler } => {
                    let mut handler = handler;
                    bus.subscribe(&topic_or_pattern, move |event| handler(event));
                }
                BusCommand::Unsubscribe(id) => {
                    if let Err(err) = bus.unsubscribe(id) {
                        debug!(%err, "unsubscribe command for unknown subscription");
                    }
                }
                BusCommand::Register { endpoint, handler } => {
                    let mut handler = handler;
                    bus.register(&endpoint, move |request| handler(request));
                }
            }
        }
        applied
    }

    /// Await the next queued command.
    pub async fn recv(&mut self) -> Option<BusCommand<E, Req, Rsp>> {
        let command = self.rx.recv().await;
        if command.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        command
    }
}

/// Construct the thread-safe queue pair feeding an [`EventBus`].
pub fn bus_queue<E, Req, Rsp>() -> (BusTx<E, Req, Rsp>, BusRx<E, Req, Rsp>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        BusTx {
            tx,
            depth: Arc::clone(&depth),
        },
        BusRx { rx, depth },
    )
}
