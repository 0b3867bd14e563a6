use crate::{
    cache::SharedCache,
    event::{Event, SystemBusTx},
    ledger::Ledger,
};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vela_data::event::{DataKind, MarketEvent};
use vela_execution::{
    ExecutionEvent, client::ExecutionClient, error::ExecutionError, order::OrderRequest,
};
use vela_instrument::pair::TradingPair;
use vela_risk::{RiskEngine, check::PortfolioView};
use vela_strategy::{
    OrderNotification, Strategy, StrategyCommand, StrategyContext, params::ParamSet,
    reload::ReloadEvent,
};

/// Unique identifier of a running strategy runtime.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RuntimeId(pub SmolStr);

impl RuntimeId {
    pub fn new<S: Into<SmolStr>>(id: S) -> Self {
        Self(id.into())
    }
}

/// Operator command delivered to a runtime.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RuntimeCommand {
    Pause,
    Resume,
    /// Kill-switch halt: shutdown callbacks fire, no further orders.
    Halt,
    /// Graceful stop; the task exits.
    Stop,
}

/// Lifecycle state of a runtime.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RuntimeState {
    Running,
    Paused,
    Halted,
    Stopped,
}

/// Input delivered to a runtime's dedicated task.
#[derive(Debug)]
pub enum RuntimeEvent {
    Market(MarketEvent<DataKind>),
    Execution(ExecutionEvent),
    Params(ReloadEvent),
    Command(RuntimeCommand),
}

/// Dedicated-task driver for one strategy.
///
/// All callbacks run serialized on this task, so strategies need no internal
/// locking. Order intents run through the synchronous risk check, then the
/// execution client; rejections come back through `on_order_event`. Staged
/// parameters apply at the next event boundary, never mid-callback.
pub struct StrategyRuntime<S> {
    id: RuntimeId,
    strategy: S,
    risk: RiskEngine,
    cache: SharedCache,
    ledger: Arc<Mutex<Ledger>>,
    execution: Arc<dyn ExecutionClient>,
    bus_tx: SystemBusTx,
    state: RuntimeState,
    staged_params: Option<ParamSet>,
    leverage: Decimal,
}

impl<S> std::fmt::Debug for StrategyRuntime<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRuntime")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: Strategy> StrategyRuntime<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: RuntimeId,
        strategy: S,
        risk: RiskEngine,
        cache: SharedCache,
        ledger: Arc<Mutex<Ledger>>,
        execution: Arc<dyn ExecutionClient>,
        bus_tx: SystemBusTx,
        leverage: Decimal,
    ) -> Self {
        Self {
            id,
            strategy,
            risk,
            cache,
            ledger,
            execution,
            bus_tx,
            state: RuntimeState::Running,
            staged_params: None,
            leverage,
        }
    }

    pub fn id(&self) -> &RuntimeId {
        &self.id
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// Initialise the strategy and drive it until stopped.
    pub async fn run(
        mut self,
        params: ParamSet,
        mut rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    ) -> Result<(), crate::VelaError> {
        self.strategy.init(&params)?;
        info!(id = ?self.id, "strategy runtime started");

        while let Some(event) = rx.recv().await {
            // Tick boundary: staged parameters apply before the next event.
            if let Some(staged) = self.staged_params.take() {
                info!(id = ?self.id, "applying hot-reloaded parameters");
                self.strategy.on_params_update(&staged);
            }

            match event {
                RuntimeEvent::Command(RuntimeCommand::Stop) => {
                    self.strategy.shutdown();
                    self.state = RuntimeState::Stopped;
                    break;
                }
                RuntimeEvent::Command(RuntimeCommand::Halt) => {
                    if self.state != RuntimeState::Halted {
                        self.strategy.shutdown();
                        self.state = RuntimeState::Halted;
                        warn!(id = ?self.id, "strategy runtime halted");
                    }
                }
                RuntimeEvent::Command(RuntimeCommand::Pause) => {
                    if self.state == RuntimeState::Running {
                        self.state = RuntimeState::Paused;
                    }
                }
                RuntimeEvent::Command(RuntimeCommand::Resume) => {
                    if self.state == RuntimeState::Paused {
                        self.state = RuntimeState::Running;
                    }
                }
                RuntimeEvent::Params(ReloadEvent::Staged(staged)) => {
                    self.staged_params = Some(staged);
                }
                RuntimeEvent::Params(ReloadEvent::Invalid { error }) => {
                    warn!(id = ?self.id, %error, "invalid parameter reload retained previous set");
                }
                RuntimeEvent::Market(event) => {
                    if self.state == RuntimeState::Running {
                        self.on_market(event).await;
                    }
                }
                RuntimeEvent::Execution(event) => {
                    if self.state != RuntimeState::Stopped {
                        self.on_execution(event).await;
                    }
                }
            }
        }

        info!(id = ?self.id, "strategy runtime exited");
        Ok(())
    }

    async fn on_market(&mut self, event: MarketEvent<DataKind>) {
        let commands = {
            let cache = self.cache.lock();
            let mut ctx = StrategyContext::new(event.time_exchange, &*cache);
            match &event.kind {
                DataKind::Trade(trade) => self.strategy.on_trade(&mut ctx, trade),
                DataKind::Candle(candle) => self.strategy.on_candle(&mut ctx, candle),
                DataKind::Quote(_) | DataKind::Book(_) => self.strategy.on_tick(&mut ctx),
            }
            ctx.take_commands()
        };
        self.process_commands(commands).await;
    }

    async fn on_execution(&mut self, event: ExecutionEvent) {
        let notification = match &event {
            ExecutionEvent::Accepted { client_id, .. } => Some(OrderNotification::Accepted {
                client_id: client_id.clone(),
            }),
            ExecutionEvent::Rejected { client_id, reason, .. } => {
                Some(OrderNotification::Rejected {
                    client_id: client_id.clone(),
                    reason: reason.clone(),
                })
            }
            ExecutionEvent::Cancelled { client_id, .. } => Some(OrderNotification::Cancelled {
                client_id: client_id.clone(),
            }),
            ExecutionEvent::Expired { client_id, .. } => Some(OrderNotification::Expired {
                client_id: client_id.clone(),
            }),
            ExecutionEvent::Submitted { .. } | ExecutionEvent::Fill(_) => None,
        };

        let commands = {
            let cache = self.cache.lock();
            let mut ctx = StrategyContext::new(event.time(), &*cache);
            match (&event, notification) {
                (ExecutionEvent::Fill(fill), _) => self.strategy.on_fill(&mut ctx, fill),
                (_, Some(notification)) => {
                    self.strategy.on_order_event(&mut ctx, &notification)
                }
                _ => {}
            }
            ctx.take_commands()
        };
        self.process_commands(commands).await;
    }

    async fn process_commands(&mut self, commands: Vec<StrategyCommand>) {
        for command in commands {
            if self.state != RuntimeState::Running {
                debug!(id = ?self.id, "dropping command from non-running runtime");
                continue;
            }
            match command {
                StrategyCommand::Submit(request) => self.submit(request).await,
                StrategyCommand::Cancel(client_id) => {
                    match self.execution.cancel(&client_id).await {
                        Ok(true) => {}
                        Ok(false) => debug!(%client_id, "cancel target unknown or terminal"),
                        Err(error) => warn!(%client_id, %error, "cancel failed"),
                    }
                }
            }
        }
    }

    async fn submit(&mut self, request: OrderRequest) {
        let now = Utc::now();
        let view = self.portfolio_view(&request.pair);
        let decision = self.risk.check_order(&request, &view, now);

        if !decision.passed {
            let reason = decision
                .reason
                .map(|reason| reason.to_string())
                .unwrap_or_else(|| "risk rejected".to_string());
            debug!(id = ?self.id, client_id = %request.client_id, %reason, "order intent refused");

            let events = {
                let mut ledger = self.ledger.lock();
                let pending = ledger.record_intent(request.clone(), now);
                let rejected = ledger.on_execution_event(&ExecutionEvent::Rejected {
                    client_id: request.client_id.clone(),
                    reason: reason.clone(),
                    time: now,
                });
                (pending, rejected)
            };
            self.publish(events.0);
            if let Ok(rejected_events) = events.1 {
                for event in rejected_events {
                    self.publish(event);
                }
            }

            let cache = self.cache.lock();
            let mut ctx = StrategyContext::new(now, &*cache);
            self.strategy.on_order_event(
                &mut ctx,
                &OrderNotification::Rejected {
                    client_id: request.client_id,
                    reason,
                },
            );
            return;
        }

        let pending = self.ledger.lock().record_intent(request.clone(), now);
        self.publish(pending);

        let submitted = self
            .ledger
            .lock()
            .on_execution_event(&ExecutionEvent::Submitted {
                client_id: request.client_id.clone(),
                time: now,
            });
        if let Ok(events) = submitted {
            for event in events {
                self.publish(event);
            }
        }

        // The only suspension point inside a tick: the venue submission.
        if let Err(error) = self.execution.submit(request.clone()).await {
            warn!(id = ?self.id, client_id = %request.client_id, %error, "submission failed");
            if matches!(error, ExecutionError::Timeout { .. }) {
                // The venue may still have seen the order; final status comes
                // from the user stream reconciliation, not from here.
                return;
            }
            let rejected = self
                .ledger
                .lock()
                .on_execution_event(&ExecutionEvent::Rejected {
                    client_id: request.client_id.clone(),
                    reason: error.to_string(),
                    time: Utc::now(),
                });
            if let Ok(events) = rejected {
                for event in events {
                    self.publish(event);
                }
            }
        }
    }

    fn portfolio_view(&self, pair: &TradingPair) -> PortfolioView {
        let cache = self.cache.lock();
        let account = cache.account().cloned();
        let position_size = cache
            .position(pair)
            .map(|position| position.size)
            .unwrap_or_default();
        let reference_price = cache
            .quote(pair)
            .map(|quote| quote.mid)
            .or_else(|| cache.book(pair).and_then(|book| book.mid_price()))
            .unwrap_or_default();
        drop(cache);

        let ledger = self.ledger.lock();
        let gross_exposure = ledger
            .positions()
            .map(|position| {
                position.size.abs() * position.mark_price.unwrap_or(position.entry_price)
            })
            .sum();
        let ledger_account = ledger.account().clone();
        drop(ledger);

        let account = account.unwrap_or(ledger_account);
        PortfolioView {
            position_size,
            gross_exposure,
            equity: account.equity,
            available_balance: account.available_balance,
            daily_start_equity: account.daily_start_equity,
            reference_price,
            leverage: self.leverage,
        }
    }

    fn publish(&self, event: Event) {
        let topic = event.topic();
        if self.bus_tx.publish(topic, event).is_err() {
            warn!(id = ?self.id, "bus queue dropped, event lost");
        }
    }
}
